//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::ProcessingStatus;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error when creating the database directory.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Document not found: {0}")]
    NotFound(String),

    /// The document was not in the status the caller expected.
    #[error("Document {id} is {actual}, expected {expected}")]
    StatusConflict {
        id: String,
        expected: ProcessingStatus,
        actual: ProcessingStatus,
    },

    /// The requested status change is not an edge of the processing lifecycle.
    #[error("Document {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ProcessingStatus,
        to: ProcessingStatus,
    },

    /// A stored value could not be decoded.
    #[error("Corrupt value in column '{column}': {value}")]
    Corrupt { column: &'static str, value: String },
}
