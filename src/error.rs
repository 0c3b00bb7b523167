//! Error types for the intake gateway

use thiserror::Error;

/// Result type alias for intake operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the intake gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Messaging channel error (WhatsApp Cloud API)
    #[error("channel error: {0}")]
    Channel(String),

    /// Remote file storage error (Google Drive)
    #[error("drive error: {0}")]
    Drive(String),

    /// Media download error
    #[error("media error: {0}")]
    Media(String),

    /// Authentication/authorization error
    #[error("auth error: {0}")]
    Auth(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
