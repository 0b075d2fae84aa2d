//! Repository port for owners and their handles.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Handle, HandleId, Owner, OwnerId};

#[async_trait]
pub trait OwnerRepository: Send + Sync {
    /// Get an owner by ID.
    async fn get_owner(&self, owner_id: OwnerId) -> DomainResult<Option<Owner>>;

    /// Owners with auto-check enabled and at least one pending handle.
    async fn list_eligible_owners(&self) -> DomainResult<Vec<Owner>>;

    /// Pending handles of one owner, oldest first.
    async fn pending_handles(&self, owner_id: OwnerId) -> DomainResult<Vec<Handle>>;

    /// Mark a handle done. Returns `false` if it was already done.
    async fn mark_activated(&self, handle_id: HandleId, at: DateTime<Utc>) -> DomainResult<bool>;
}
