//! Error Module
//!
//! Defines error types and result types used throughout the vault proxy.

use thiserror::Error;

/// Main error type for the vault proxy
#[derive(Error, Debug, Clone)]
pub enum VaultError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Error decrypting file {path}: {reason}")]
    Decrypt { path: String, reason: String },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("System error: {0}")]
    SystemError(String),
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::IoError(err.to_string())
    }
}

impl From<hyper::Error> for VaultError {
    fn from(err: hyper::Error) -> Self {
        VaultError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for VaultError {
    fn from(err: serde_yaml::Error) -> Self {
        VaultError::SerializationError(err.to_string())
    }
}

/// Result type alias for the vault proxy
pub type Result<T> = std::result::Result<T, VaultError>;
