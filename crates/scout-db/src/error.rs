//! Persistence errors.

use thiserror::Error;

/// Failure of a store, run-recorder or export operation.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The `SQLite` file or in-memory database could not be opened
    #[error("cannot open database: {0}")]
    Open(String),

    /// An embedded migration failed to apply
    #[error("schema migration failed: {0}")]
    Migration(String),

    /// A referenced run or job does not exist
    #[error("{0}")]
    NotFound(String),

    /// A stored column holds a value the domain types reject
    #[error("corrupt row: {0}")]
    Decode(String),

    /// Writing the CSV export failed
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Writing a JSON export failed
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Query failure
    #[error("query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Filesystem failure while creating the database or export files
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for persistence operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
