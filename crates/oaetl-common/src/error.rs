//! Error types shared across OAETL crates

use thiserror::Error;

/// Result type alias for common OAETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Base error type for OAETL
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
