//! Transport port for delivering messages to an owner's chat.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::OwnerId;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Worth retrying: network errors, rate limits, server errors.
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Retrying will not help: bad chat id, blocked bot, unreadable file.
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

impl TransportError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send_text(&self, owner_id: OwnerId, text: &str) -> Result<(), TransportError>;

    async fn send_image(&self, owner_id: OwnerId, image_path: &Path, caption: &str) -> Result<(), TransportError>;
}
