//! Error types for clinicnote-core

use thiserror::Error;

/// Result type alias using clinicnote-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in clinicnote-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local document store unavailable or corrupt; fatal to the call
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Document not found
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
