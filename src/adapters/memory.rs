//! In-memory store implementing the repository ports.
//!
//! Used by tests and one-shot runs that do not need a database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ApiCredential, Handle, HandleId, InteractiveSession, Owner, OwnerId, OwnerResources,
    ProxyEndpoint, ResourceId,
};
use crate::domain::ports::{
    OwnerRepository, ProxyPenalty, ResourceRepository, SettingsRepository,
};

#[derive(Default)]
struct StoreState {
    owners: BTreeMap<OwnerId, Owner>,
    handles: BTreeMap<HandleId, Handle>,
    credentials: BTreeMap<ResourceId, ApiCredential>,
    sessions: BTreeMap<ResourceId, InteractiveSession>,
    proxies: BTreeMap<ResourceId, ProxyEndpoint>,
    settings: HashMap<String, String>,
    next_id: i64,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_owner(&self, owner: Owner) {
        self.state.write().await.owners.insert(owner.id, owner);
    }

    /// Store a handle verbatim; the worker normalizes on read.
    pub async fn add_handle(&self, owner_id: OwnerId, text: &str) -> Handle {
        let mut state = self.state.write().await;
        let id = state.next_id();
        let handle = Handle::new(id, owner_id, text);
        state.handles.insert(id, handle.clone());
        handle
    }

    pub async fn handle(&self, handle_id: HandleId) -> Option<Handle> {
        self.state.read().await.handles.get(&handle_id).cloned()
    }

    pub async fn insert_credential(&self, mut credential: ApiCredential) -> ResourceId {
        let mut state = self.state.write().await;
        credential.id = state.next_id();
        let id = credential.id;
        state.credentials.insert(id, credential);
        id
    }

    pub async fn insert_session(&self, mut session: InteractiveSession) -> ResourceId {
        let mut state = self.state.write().await;
        session.id = state.next_id();
        let id = session.id;
        state.sessions.insert(id, session);
        id
    }

    pub async fn insert_proxy(&self, mut proxy: ProxyEndpoint) -> ResourceId {
        let mut state = self.state.write().await;
        proxy.id = state.next_id();
        let id = proxy.id;
        state.proxies.insert(id, proxy);
        id
    }
}

#[async_trait]
impl OwnerRepository for InMemoryStore {
    async fn get_owner(&self, owner_id: OwnerId) -> DomainResult<Option<Owner>> {
        Ok(self.state.read().await.owners.get(&owner_id).cloned())
    }

    async fn list_eligible_owners(&self) -> DomainResult<Vec<Owner>> {
        let state = self.state.read().await;
        Ok(state
            .owners
            .values()
            .filter(|owner| owner.auto_check_enabled)
            .filter(|owner| {
                state
                    .handles
                    .values()
                    .any(|h| h.owner_id == owner.id && h.is_pending())
            })
            .cloned()
            .collect())
    }

    async fn pending_handles(&self, owner_id: OwnerId) -> DomainResult<Vec<Handle>> {
        let state = self.state.read().await;
        let mut handles: Vec<Handle> = state
            .handles
            .values()
            .filter(|h| h.owner_id == owner_id && h.is_pending())
            .cloned()
            .collect();
        handles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(handles)
    }

    async fn mark_activated(&self, handle_id: HandleId, at: DateTime<Utc>) -> DomainResult<bool> {
        let mut state = self.state.write().await;
        let handle = state
            .handles
            .get_mut(&handle_id)
            .ok_or(DomainError::HandleNotFound(handle_id))?;
        if handle.done {
            return Ok(false);
        }
        handle.done = true;
        handle.activated_at = Some(at);
        Ok(true)
    }
}

#[async_trait]
impl ResourceRepository for InMemoryStore {
    async fn owner_resources(&self, owner_id: OwnerId) -> DomainResult<OwnerResources> {
        let state = self.state.read().await;
        Ok(OwnerResources {
            api_credentials: state
                .credentials
                .values()
                .filter(|c| c.owner_id == owner_id)
                .cloned()
                .collect(),
            sessions: state
                .sessions
                .values()
                .filter(|s| s.owner_id == owner_id)
                .cloned()
                .collect(),
            proxies: state
                .proxies
                .values()
                .filter(|p| p.owner_id == owner_id)
                .cloned()
                .collect(),
        })
    }

    async fn record_credential_use(&self, credential_id: ResourceId, at: DateTime<Utc>) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let credential = state
            .credentials
            .get_mut(&credential_id)
            .ok_or_else(|| DomainError::ValidationFailed(format!("credential {credential_id} not found")))?;
        credential.request_count = credential.requests_today(at) + 1;
        credential.rotated_at = Some(at);
        Ok(())
    }

    async fn set_credential_working(&self, credential_id: ResourceId, working: bool) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let credential = state
            .credentials
            .get_mut(&credential_id)
            .ok_or_else(|| DomainError::ValidationFailed(format!("credential {credential_id} not found")))?;
        credential.working = working;
        Ok(())
    }

    async fn record_proxy_result(
        &self,
        proxy_id: ResourceId,
        success: bool,
        penalty: Option<ProxyPenalty>,
    ) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let proxy = state
            .proxies
            .get_mut(&proxy_id)
            .ok_or_else(|| DomainError::ValidationFailed(format!("proxy {proxy_id} not found")))?;
        proxy.used_count += 1;
        if success {
            proxy.success_count += 1;
            proxy.fail_streak = 0;
            proxy.cooldown_until = None;
        } else {
            proxy.fail_streak += 1;
            if let Some(penalty) = penalty.filter(|p| proxy.fail_streak >= p.threshold) {
                proxy.cooldown_until = Some(penalty.until);
            }
        }
        Ok(())
    }

    async fn touch_session(&self, session_id: ResourceId, at: DateTime<Utc>) -> DomainResult<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| DomainError::ValidationFailed(format!("session {session_id} not found")))?;
        session.last_used_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for InMemoryStore {
    async fn get_setting(&self, key: &str) -> DomainResult<Option<String>> {
        Ok(self.state.read().await.settings.get(key).cloned())
    }

    async fn set_setting(&self, key: &str, value: &str) -> DomainResult<()> {
        self.state
            .write()
            .await
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_eligibility_tracks_pending_handles() {
        let store = InMemoryStore::new();
        store.insert_owner(Owner::new(1)).await;
        store.insert_owner(Owner::new(2).with_auto_check(false)).await;
        let handle = store.add_handle(1, "target").await;
        store.add_handle(2, "other").await;

        let eligible = store.list_eligible_owners().await.unwrap();
        assert_eq!(eligible.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1]);

        assert!(store.mark_activated(handle.id, Utc::now()).await.unwrap());
        assert!(!store.mark_activated(handle.id, Utc::now()).await.unwrap());
        assert!(store.list_eligible_owners().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_handles_in_insertion_order() {
        let store = InMemoryStore::new();
        store.insert_owner(Owner::new(1)).await;
        let a = store.add_handle(1, "a").await;
        let b = store.add_handle(1, "b").await;
        let ids: Vec<_> = store.pending_handles(1).await.unwrap().iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }
}
