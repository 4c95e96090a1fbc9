use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Environment variable {var} has an invalid value: {reason}")]
    Env { var: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API responded with status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed API response: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single raw record was rejected. Never carries the offending value,
/// only the field, so it is safe to log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field {field} has the wrong type, expected {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("Field {field} has an invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("Field {field} is out of range: {reason}")]
    OutOfRange { field: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnonymizeError {
    #[error("Anonymization salt must not be empty")]
    EmptySalt,

    #[error("Cannot anonymize record, missing {0}")]
    MissingField(&'static str),

    #[error("Cannot anonymize record, {field} is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Database {0} does not exist, run the process stage first")]
    StoreMissing(PathBuf),

    #[error("Failed to read the store: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal errors of the process stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Anonymize(#[from] AnonymizeError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
