//! The in-memory command log.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::command::{Command, Zxid};

/// One ordered entry of the replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub zxid: Zxid,
    pub command: Command,
}

/// Append-only sequence of proposed commands, ordered by zxid.
///
/// The log is memory-only: a restarting server rebuilds it from the leader
/// during synchronization. Appends with non-increasing zxids are rejected;
/// the replication engine treats that as a protocol bug upstream.
#[derive(Debug, Default)]
pub struct CommandLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns `false` (and drops the entry) if its zxid
    /// does not advance the log.
    pub fn append(&self, entry: LogEntry) -> bool {
        let mut entries = self.entries.lock();
        if let Some(last) = entries.last()
            && entry.zxid <= last.zxid
        {
            tracing::warn!(
                zxid = %entry.zxid,
                last = %last.zxid,
                "rejecting out-of-order log append"
            );
            return false;
        }
        entries.push(entry);
        true
    }

    /// The zxid of the newest entry, or `Zxid::ZERO` for an empty log.
    pub fn last_zxid(&self) -> Zxid {
        self.entries
            .lock()
            .last()
            .map(|e| e.zxid)
            .unwrap_or(Zxid::ZERO)
    }

    /// Entries strictly after `zxid`, oldest first. Used to catch up a
    /// synchronizing follower.
    pub fn tail_after(&self, zxid: Zxid) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.zxid > zxid)
            .cloned()
            .collect()
    }

    /// Whether the log still holds `zxid` (or the follower is at the very
    /// beginning); when it does not, a joining follower needs a snapshot
    /// instead of a tail.
    pub fn contains(&self, zxid: Zxid) -> bool {
        if zxid == Zxid::ZERO {
            return true;
        }
        self.entries.lock().iter().any(|e| e.zxid == zxid)
    }

    /// Drop every entry after `zxid`. Applied by followers that discover a
    /// divergent suffix during synchronization.
    pub fn truncate_after(&self, zxid: Zxid) {
        self.entries.lock().retain(|e| e.zxid <= zxid);
    }

    /// Replace the whole log, as part of installing a snapshot.
    pub fn reset(&self, entries: Vec<LogEntry>) {
        *self.entries.lock() = entries;
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(epoch: u32, counter: u32) -> LogEntry {
        LogEntry {
            zxid: Zxid::new(epoch, counter),
            command: Command::CreateDir {
                path: format!("/{epoch}-{counter}"),
                recursive: false,
                transient: false,
                expected_version: None,
            },
        }
    }

    #[test]
    fn test_append_monotonic() {
        let log = CommandLog::new();
        assert!(log.append(entry(1, 1)));
        assert!(log.append(entry(1, 2)));
        assert!(!log.append(entry(1, 2)));
        assert!(!log.append(entry(1, 1)));
        assert_eq!(log.len(), 2);
        assert_eq!(log.last_zxid(), Zxid::new(1, 2));
    }

    #[test]
    fn test_tail_after() {
        let log = CommandLog::new();
        for counter in 1..=4 {
            log.append(entry(1, counter));
        }
        let tail = log.tail_after(Zxid::new(1, 2));
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].zxid, Zxid::new(1, 3));
        assert_eq!(tail[1].zxid, Zxid::new(1, 4));

        assert_eq!(log.tail_after(Zxid::ZERO).len(), 4);
        assert!(log.tail_after(Zxid::new(1, 4)).is_empty());
    }

    #[test]
    fn test_truncate_after() {
        let log = CommandLog::new();
        for counter in 1..=4 {
            log.append(entry(1, counter));
        }
        log.truncate_after(Zxid::new(1, 2));
        assert_eq!(log.len(), 2);
        assert_eq!(log.last_zxid(), Zxid::new(1, 2));
    }

    #[test]
    fn test_contains() {
        let log = CommandLog::new();
        assert!(log.contains(Zxid::ZERO));
        log.append(entry(2, 1));
        assert!(log.contains(Zxid::new(2, 1)));
        assert!(!log.contains(Zxid::new(1, 5)));
    }
}
