//! State-machine commands and their ordering identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 64-bit transaction identifier: `epoch << 32 | counter`.
///
/// The epoch strictly increases at each leadership change and the counter
/// strictly increases within an epoch, so numeric order on the packed value
/// is the cluster-wide total order of writes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Zxid(u64);

impl Zxid {
    pub const ZERO: Zxid = Zxid(0);

    pub fn new(epoch: u32, counter: u32) -> Self {
        Zxid((u64::from(epoch) << 32) | u64::from(counter))
    }

    pub fn epoch(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn counter(self) -> u32 {
        self.0 as u32
    }

    /// The next zxid within the same epoch.
    pub fn next(self) -> Self {
        Zxid(self.0 + 1)
    }
}

impl fmt::Display for Zxid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.epoch(), self.counter())
    }
}

/// A totally-ordered state-machine transition.
///
/// Client writes become one of the first four variants; the membership pair
/// is issued only by the replication engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateDir {
        path: String,
        recursive: bool,
        transient: bool,
        expected_version: Option<i64>,
    },
    PutFile {
        path: String,
        content: Vec<u8>,
        recursive: bool,
        transient: bool,
        expected_version: Option<i64>,
    },
    Delete {
        path: String,
        recursive: bool,
        expected_version: Option<i64>,
    },
    CreateSequential {
        parent: String,
        content: Vec<u8>,
    },
    RegisterMember {
        addr: String,
    },
    UnregisterMember {
        addr: String,
    },
}

impl Command {
    /// Whether this is an engine-issued membership command, which may write
    /// beneath `/pulsefs/servers`.
    pub fn is_membership(&self) -> bool {
        matches!(
            self,
            Command::RegisterMember { .. } | Command::UnregisterMember { .. }
        )
    }
}
