//! Transport that only logs, used when no chat bot is configured.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::domain::models::OwnerId;
use crate::domain::ports::{NotificationTransport, TransportError};

#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send_text(&self, owner_id: OwnerId, text: &str) -> Result<(), TransportError> {
        info!(owner_id, text, "Notification");
        Ok(())
    }

    async fn send_image(&self, owner_id: OwnerId, image_path: &Path, caption: &str) -> Result<(), TransportError> {
        info!(owner_id, caption, artifact = %image_path.display(), "Notification with artifact");
        Ok(())
    }
}
