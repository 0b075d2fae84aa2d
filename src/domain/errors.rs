//! Domain errors for the autocheck system.

use thiserror::Error;

use super::models::{HandleId, OwnerId};

/// Domain-level errors that can occur while checking handles.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Owner not found: {0}")]
    OwnerNotFound(OwnerId),

    #[error("Handle not found: {0}")]
    HandleNotFound(HandleId),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Backend failed: {0}")]
    BackendFailed(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("I/O error: {0}")]
    Io(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
