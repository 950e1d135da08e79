//! Leader election bookkeeping.
//!
//! A ballot endorses a candidate by its `(epoch, last_zxid, id)` credentials;
//! ballots compare lexicographically, so the cluster converges on the most
//! caught-up server with the highest id as the deterministic tie-break.

use std::collections::HashMap;

use pulsefs_core::command::Zxid;
use serde::{Deserialize, Serialize};

/// A candidate's credentials as carried in `vote` messages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vote {
    pub epoch: u32,
    pub zxid: Zxid,
    pub id: String,
}

/// One election round: the ballot we currently endorse plus every ballot we
/// have heard, keyed by voter.
#[derive(Debug)]
pub struct Election {
    self_id: String,
    current: Vote,
    ballots: HashMap<String, Vote>,
}

impl Election {
    pub fn new(self_id: String, own_credentials: Vote) -> Self {
        let mut ballots = HashMap::new();
        ballots.insert(self_id.clone(), own_credentials.clone());
        Election {
            self_id,
            current: own_credentials,
            ballots,
        }
    }

    pub fn current(&self) -> &Vote {
        &self.current
    }

    /// Record a ballot from `voter`; returns `true` if it beat our current
    /// endorsement and we switched (a switch must be re-broadcast).
    pub fn record(&mut self, voter: &str, vote: Vote) -> bool {
        let switched = vote > self.current;
        if switched {
            self.current = vote.clone();
            self.ballots
                .insert(self.self_id.clone(), self.current.clone());
        }
        self.ballots.insert(voter.to_string(), vote);
        switched
    }

    /// Number of voters currently endorsing our candidate.
    pub fn supporters(&self) -> usize {
        self.ballots
            .values()
            .filter(|v| v.id == self.current.id)
            .count()
    }

    /// Whether a strict majority of `cluster_size` endorses our candidate.
    pub fn has_majority(&self, cluster_size: usize) -> bool {
        self.supporters() > cluster_size / 2
    }

    /// Highest epoch seen in any ballot; the winner's new epoch must exceed
    /// every epoch that ever led.
    pub fn max_epoch(&self) -> u32 {
        self.ballots
            .values()
            .map(|v| v.epoch)
            .max()
            .unwrap_or(self.current.epoch)
    }
}
