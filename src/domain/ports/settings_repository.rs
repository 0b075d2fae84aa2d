//! Repository port for process-wide settings.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Key overriding the scheduler interval at runtime.
pub const AUTO_CHECK_INTERVAL_KEY: &str = "auto_check_interval_minutes";

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(&self, key: &str) -> DomainResult<Option<String>>;

    async fn set_setting(&self, key: &str, value: &str) -> DomainResult<()>;
}
