//! # PulseFS Core
//!
//! The deterministic heart of PulseFS: a hierarchical node tree with
//! versions, checksums, transient directories and sequential creates, plus
//! the command/zxid vocabulary the replication layer totally orders.
//!
//! Everything here is driven through [`Tree::apply`]; feeding two trees the
//! same command prefix yields byte-identical state, which is the property
//! the cluster's consistency checks (root checksums) rest on.

pub mod command;
pub mod error;
pub mod log;
pub mod node;
pub mod path;
pub mod query;
pub mod tree;
pub mod watch;

pub use command::{Command, Zxid};
pub use error::StoreError;
pub use log::{CommandLog, LogEntry};
pub use node::{Node, NodeKind, NodeView};
pub use query::Query;
pub use tree::{Applied, Tree};
pub use watch::{WatchOutcome, WatchRegistry};
