//! Peer RPC wire format: newline-delimited JSON frames.
//!
//! The first frame on every connection is `hello`, which names the sender;
//! the transport attributes every later frame on that connection to it.

use pulsefs_core::command::{Command, Zxid};
use pulsefs_core::log::LogEntry;
use pulsefs_core::tree::Tree;
use serde::{Deserialize, Serialize};

use super::election::Vote;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// Connection preamble naming the dialing server.
    Hello { from: String },

    /// Election ballot: the sender currently endorses `vote`.
    Vote { vote: Vote },

    /// Leader -> followers: a new log entry to acknowledge.
    Propose { zxid: Zxid, command: Command },

    /// Follower -> leader: the entry is logged.
    Ack { zxid: Zxid },

    /// Leader -> followers: a quorum acknowledged, apply in order.
    Commit { zxid: Zxid },

    /// Follower -> leader: catch me up from this point.
    SyncReq { last_zxid: Zxid },

    /// Leader -> follower: committed log tail after the follower's zxid.
    SyncResp { entries: Vec<LogEntry>, last_zxid: Zxid },

    /// Leader -> follower: full state transfer when the tail is gone.
    Snapshot { tree: Tree, last_zxid: Zxid },

    /// Leader heartbeat; also how a newly elected leader announces itself.
    Ping { epoch: u32 },

    /// Follower -> leader: order this client write on my behalf.
    Forward { request_id: u64, command: Command },

    /// Leader -> follower: the forwarded write got this zxid (`None` when
    /// the receiver was not in a position to order it).
    ForwardResult { request_id: u64, zxid: Option<Zxid> },
}
