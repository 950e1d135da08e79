use thiserror::Error;

/// Errors surfaced by the state machine.
///
/// The `Display` form of each variant is the exact reason string the HTTP
/// layer returns to clients, so the wording here is load-bearing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} does not exist")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("{0} is a directory")]
    IsADirectory(String),

    #[error("{0} is not empty")]
    NotEmpty(String),

    #[error("Version {expected} doesn't match node version {actual}")]
    VersionConflict { expected: i64, actual: u64 },

    #[error("Forbidden")]
    Forbidden,

    #[error("bad query parameter")]
    BadQuery,
}

pub type Result<T> = std::result::Result<T, StoreError>;
