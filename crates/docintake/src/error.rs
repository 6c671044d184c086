use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocIntakeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registration error: {0}")]
    Register(#[from] RegisterError),

    #[error("Review error: {0}")]
    Review(#[from] ReviewError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Extraction client error: {0}")]
    Extraction(#[from] crate::extraction::ExtractionError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Failed to resolve extraction key: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

/// Failures registering an upload as a `Pending` document.
#[derive(Error, Debug)]
pub enum RegisterError {
    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Unsupported file type '{extension}' for {filename}")]
    UnsupportedFormat { filename: String, extension: String },

    #[error("{filename} is {size} bytes, limit is {limit}")]
    TooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },

    #[error("{0} is empty")]
    Empty(String),

    #[error("Directory scan failed: {0}")]
    Scan(#[from] WorkerError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document {id} is {status}, not awaiting review")]
    NotAwaitingReview {
        id: String,
        status: crate::model::ProcessingStatus,
    },

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("'{value}' is not a valid {field}")]
    InvalidValue { field: String, value: String },

    #[error("A rejection needs a reason")]
    MissingReason,

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type Result<T> = std::result::Result<T, DocIntakeError>;
