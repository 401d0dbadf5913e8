//! Index engine error types.

use thiserror::Error;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum FtsError {
    /// SQLite error, including FTS5 query syntax errors
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection mutex was poisoned by a panicking holder
    #[error("Index is locked: {0}")]
    Locked(String),
}
