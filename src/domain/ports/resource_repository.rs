//! Repository port for owner resources and their usage counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{OwnerId, OwnerResources, ResourceId};

/// Cooldown applied when a failure brings a proxy's streak to `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyPenalty {
    pub threshold: u32,
    pub until: DateTime<Utc>,
}

#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// All credentials, sessions and proxies stored for an owner.
    async fn owner_resources(&self, owner_id: OwnerId) -> DomainResult<OwnerResources>;

    /// Count one request against a credential's daily quota, restarting the
    /// counter when `at` falls on a new UTC day.
    async fn record_credential_use(&self, credential_id: ResourceId, at: DateTime<Utc>) -> DomainResult<()>;

    async fn set_credential_working(&self, credential_id: ResourceId, working: bool) -> DomainResult<()>;

    /// Update proxy health. Success clears the streak and any cooldown.
    async fn record_proxy_result(
        &self,
        proxy_id: ResourceId,
        success: bool,
        penalty: Option<ProxyPenalty>,
    ) -> DomainResult<()>;

    async fn touch_session(&self, session_id: ResourceId, at: DateTime<Utc>) -> DomainResult<()>;
}
