//! Telegram Bot API transport for owner notifications.
//!
//! Owners are addressed by their chat id, which is the owner id.

use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{NotificationsConfig, OwnerId};
use crate::domain::ports::{NotificationTransport, TransportError};

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub api_base: String,
    pub messages_per_second: u32,
    pub timeout: Duration,
}

impl TelegramConfig {
    /// `None` when no bot token is configured.
    pub fn from_notifications(config: &NotificationsConfig) -> Option<Self> {
        let bot_token = config.bot_token.clone().filter(|t| !t.trim().is_empty())?;
        Some(Self {
            bot_token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            messages_per_second: config.messages_per_second,
            timeout: Duration::from_secs(30),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramTransport {
    client: Client,
    config: TelegramConfig,
    limiter: DefaultDirectRateLimiter,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("failed to build HTTP client: {e}")))?;
        let rate = NonZeroU32::new(config.messages_per_second).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            client,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            config,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.config.api_base, self.config.bot_token)
    }

    async fn finish(response: Result<Response, reqwest::Error>) -> Result<(), TransportError> {
        // The request URL carries the bot token.
        let response =
            response.map_err(|e| TransportError::Transient(format!("request failed: {}", e.without_url())))?;
        let status = response.status();
        let reply = response.json::<ApiReply>().await.ok();
        let description = reply
            .as_ref()
            .and_then(|r| r.description.clone())
            .unwrap_or_else(|| status.to_string());

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(TransportError::Transient(description));
        }
        if !status.is_success() {
            return Err(TransportError::Permanent(description));
        }
        match reply {
            Some(reply) if reply.ok => Ok(()),
            _ => Err(TransportError::Permanent(description)),
        }
    }
}

#[async_trait]
impl NotificationTransport for TelegramTransport {
    async fn send_text(&self, owner_id: OwnerId, text: &str) -> Result<(), TransportError> {
        self.limiter.until_ready().await;
        debug!(owner_id, "Sending message");
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&serde_json::json!({ "chat_id": owner_id, "text": text }))
            .send()
            .await;
        Self::finish(response).await
    }

    async fn send_image(&self, owner_id: OwnerId, image_path: &Path, caption: &str) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| TransportError::Permanent(format!("cannot read {}: {e}", image_path.display())))?;
        let file_name = image_path
            .file_name()
            .map_or_else(|| "artifact.png".to_string(), |n| n.to_string_lossy().into_owned());
        let form = Form::new()
            .text("chat_id", owner_id.to_string())
            .text("caption", caption.to_string())
            .part("photo", Part::bytes(bytes).file_name(file_name));

        self.limiter.until_ready().await;
        debug!(owner_id, path = %image_path.display(), "Sending photo");
        let response = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .send()
            .await;
        Self::finish(response).await
    }
}
