//! Store error types.

use thiserror::Error;

/// Errors from store operations.
///
/// Anything surfacing from here means the durable state could not be read
/// or written; the daemon treats these as fatal.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A persisted value could not be interpreted.
    #[error("corrupt store state: {0}")]
    Corrupt(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
