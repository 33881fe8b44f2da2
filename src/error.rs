//! Error types for FitBank points ingestion

use thiserror::Error;

pub use crate::schema::ValidationError;

/// Errors that can occur while ingesting a batch
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed JSON payload: {0}")]
    MalformedPayload(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid pipeline configuration: {0}")]
    Config(String),
}

/// Errors reported by a record store collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Write rejected for user {username}: {reason}")]
    Rejected { username: String, reason: String },

    #[error("Invalid store snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Errors reported by a settings store collaborator
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid settings document: {0}")]
    Invalid(#[from] serde_json::Error),
}
