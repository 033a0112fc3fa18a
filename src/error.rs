//! Error types for the text engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MimicError>;

#[derive(Debug, Error)]
pub enum MimicError {
    /// SQLite failure. Propagated as-is, never retried here.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("\"{0}\" not found in lexicon")]
    UnknownWord(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite stores integers as signed 64-bit values, so ids above `i64::MAX`
/// are rejected before they reach a query.
pub(crate) fn sql_id(id: u64, what: &str) -> Result<i64> {
    i64::try_from(id)
        .map_err(|_| MimicError::InvalidArgument(format!("{} id {} is out of range", what, id)))
}
