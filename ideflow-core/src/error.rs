//! Error types for ideflow-core

use thiserror::Error;

/// Main error type for the ideflow-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Identifier cache database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A single archive could not be opened or scanned
    #[error("archive error in {path}: {message}")]
    Archive { path: String, message: String },

    /// The archive root itself is unreadable; aborts the whole run
    #[error("input root unavailable: {0}")]
    InputRoot(String),
}

impl Error {
    /// Build an [`Error::Archive`] for the given relative archive path.
    pub fn archive(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Archive {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for ideflow-core
pub type Result<T> = std::result::Result<T, Error>;
