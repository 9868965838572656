//! Error types for the ingestion pipeline

use crate::entity::EntityKind;
use oaetl_common::EtlError;
use std::path::PathBuf;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Error types for OpenAlex ingestion
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] EtlError),

    #[error("Remote storage error: {0}")]
    Remote(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Failed to fetch {key} after {attempts} attempts: {message}")]
    FetchExhausted {
        key: String,
        attempts: u32,
        message: String,
    },

    #[error("Too many bad records in {path}: {errors} errors (limit {limit})")]
    RecordLimit {
        path: PathBuf,
        errors: usize,
        limit: usize,
    },

    #[error("Flush for {entity} failed: {message}")]
    Flush { entity: EntityKind, message: String },

    #[error("Normalize error: {0}")]
    Normalize(String),

    #[error("Unknown entity type: {0}")]
    UnknownEntity(String),
}

impl IngestError {
    pub fn remote(err: impl std::fmt::Display) -> Self {
        IngestError::Remote(err.to_string())
    }
}
