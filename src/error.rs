//! Error types for the discrete logger

use thiserror::Error;

/// Errors that can occur while correlating, storing or backing up events
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to resolve {name} in {directory}: {reason}")]
    Resolution {
        name: String,
        directory: String,
        reason: String,
    },

    #[error("Stream unavailable for {0}")]
    StreamUnavailable(String),

    #[error("Background worker is no longer accepting tasks")]
    WorkerStopped,

    #[error("Preference store error: {0}")]
    Preferences(String),

    #[error("Date parse error: {0}")]
    InvalidDate(String),

    #[error("Malformed record: {0}")]
    RecordParse(String),
}
