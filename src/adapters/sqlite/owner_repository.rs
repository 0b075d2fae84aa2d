//! SQLite adapter for OwnerRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::warn;

use crate::adapters::sqlite::{format_datetime, parse_datetime, parse_optional_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    clamp_interval_minutes, normalize_handle, CheckMode, Handle, HandleId, Owner, OwnerId,
};
use crate::domain::ports::OwnerRepository;

#[derive(Clone)]
pub struct SqliteOwnerRepository {
    pool: SqlitePool,
}

impl SqliteOwnerRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace an owner's settings.
    pub async fn upsert_owner(&self, owner: &Owner) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO owners (id, username, auto_check_enabled, auto_check_interval_minutes, preferred_mode, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                auto_check_enabled = excluded.auto_check_enabled,
                auto_check_interval_minutes = excluded.auto_check_interval_minutes,
                preferred_mode = excluded.preferred_mode",
        )
        .bind(owner.id)
        .bind(&owner.username)
        .bind(owner.auto_check_enabled)
        .bind(i64::from(owner.auto_check_interval_minutes))
        .bind(owner.preferred_mode.map(CheckMode::as_str))
        .bind(format_datetime(owner.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Add a handle in canonical form. Adding an existing handle returns it
    /// unchanged.
    pub async fn add_handle(&self, owner_id: OwnerId, raw: &str) -> DomainResult<Handle> {
        let text = normalize_handle(raw)
            .ok_or_else(|| DomainError::ValidationFailed(format!("invalid handle: {raw:?}")))?;
        sqlx::query(
            "INSERT INTO handles (owner_id, handle, done, created_at) VALUES (?1, ?2, 0, ?3)
             ON CONFLICT(owner_id, handle) DO NOTHING",
        )
        .bind(owner_id)
        .bind(&text)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await?;

        let row: HandleRow = sqlx::query_as("SELECT * FROM handles WHERE owner_id = ? AND handle = ?")
            .bind(owner_id)
            .bind(&text)
            .fetch_one(&self.pool)
            .await?;
        row_to_handle(row)
    }

    pub async fn get_handle(&self, handle_id: HandleId) -> DomainResult<Option<Handle>> {
        let row: Option<HandleRow> = sqlx::query_as("SELECT * FROM handles WHERE id = ?")
            .bind(handle_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_handle).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct OwnerRow {
    id: i64,
    username: Option<String>,
    auto_check_enabled: bool,
    auto_check_interval_minutes: i64,
    preferred_mode: Option<String>,
    created_at: String,
}

fn row_to_owner(row: OwnerRow) -> DomainResult<Owner> {
    let preferred_mode = row.preferred_mode.as_deref().and_then(|raw| {
        raw.parse::<CheckMode>()
            .map_err(|e| warn!(owner_id = row.id, error = %e, "Ignoring unknown check mode"))
            .ok()
    });
    Ok(Owner {
        id: row.id,
        username: row.username,
        auto_check_enabled: row.auto_check_enabled,
        auto_check_interval_minutes: clamp_interval_minutes(row.auto_check_interval_minutes),
        preferred_mode,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[derive(sqlx::FromRow)]
struct HandleRow {
    id: i64,
    owner_id: i64,
    handle: String,
    done: bool,
    activated_at: Option<String>,
    created_at: String,
}

fn row_to_handle(row: HandleRow) -> DomainResult<Handle> {
    Ok(Handle {
        id: row.id,
        owner_id: row.owner_id,
        text: row.handle,
        done: row.done,
        activated_at: parse_optional_datetime(row.activated_at)?,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[async_trait]
impl OwnerRepository for SqliteOwnerRepository {
    async fn get_owner(&self, owner_id: OwnerId) -> DomainResult<Option<Owner>> {
        let row: Option<OwnerRow> = sqlx::query_as("SELECT * FROM owners WHERE id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_owner).transpose()
    }

    async fn list_eligible_owners(&self) -> DomainResult<Vec<Owner>> {
        let rows: Vec<OwnerRow> = sqlx::query_as(
            "SELECT o.* FROM owners o
             WHERE o.auto_check_enabled = 1
               AND EXISTS (SELECT 1 FROM handles h WHERE h.owner_id = o.id AND h.done = 0)
             ORDER BY o.id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_owner).collect()
    }

    async fn pending_handles(&self, owner_id: OwnerId) -> DomainResult<Vec<Handle>> {
        let rows: Vec<HandleRow> = sqlx::query_as(
            "SELECT * FROM handles WHERE owner_id = ? AND done = 0 ORDER BY created_at, id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_handle).collect()
    }

    async fn mark_activated(&self, handle_id: HandleId, at: DateTime<Utc>) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE handles SET done = 1, activated_at = ? WHERE id = ? AND done = 0")
            .bind(format_datetime(at))
            .bind(handle_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM handles WHERE id = ?")
                .bind(handle_id)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Err(DomainError::HandleNotFound(handle_id));
            }
            return Ok(false);
        }
        Ok(true)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteOwnerRepository {
        let pool = create_migrated_test_pool().await.expect("test pool");
        SqliteOwnerRepository::new(pool)
    }

    #[tokio::test]
    async fn test_owner_round_trip() {
        let repo = setup().await;
        let owner = Owner::new(42).with_mode(CheckMode::ApiProxy).with_interval_minutes(15);
        repo.upsert_owner(&owner).await.unwrap();

        let loaded = repo.get_owner(42).await.unwrap().unwrap();
        assert_eq!(loaded.id, 42);
        assert_eq!(loaded.preferred_mode, Some(CheckMode::ApiProxy));
        assert_eq!(loaded.auto_check_interval_minutes, 15);
        assert!(loaded.auto_check_enabled);
        assert!(repo.get_owner(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_handle_stores_canonical_form() {
        let repo = setup().await;
        repo.upsert_owner(&Owner::new(1)).await.unwrap();

        let handle = repo.add_handle(1, "  @Some.User_ ").await.unwrap();
        assert_eq!(handle.text, "some.user");
        assert!(handle.is_pending());

        let again = repo.add_handle(1, "some.user").await.unwrap();
        assert_eq!(again.id, handle.id);
        assert!(repo.add_handle(1, "@__").await.is_err());
    }

    #[tokio::test]
    async fn test_eligible_owners_need_auto_check_and_pending_handles() {
        let repo = setup().await;
        repo.upsert_owner(&Owner::new(1)).await.unwrap();
        repo.upsert_owner(&Owner::new(2)).await.unwrap();
        repo.upsert_owner(&Owner::new(3).with_auto_check(false)).await.unwrap();

        repo.add_handle(1, "alpha").await.unwrap();
        repo.add_handle(3, "gamma").await.unwrap();
        let done = repo.add_handle(2, "beta").await.unwrap();
        repo.mark_activated(done.id, Utc::now()).await.unwrap();

        let eligible: Vec<OwnerId> = repo
            .list_eligible_owners()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(eligible, vec![1]);
    }

    #[tokio::test]
    async fn test_pending_handles_oldest_first() {
        let repo = setup().await;
        repo.upsert_owner(&Owner::new(1)).await.unwrap();
        let first = repo.add_handle(1, "first").await.unwrap();
        let second = repo.add_handle(1, "second").await.unwrap();

        let pending = repo.pending_handles(1).await.unwrap();
        assert_eq!(
            pending.iter().map(|h| h.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );
    }

    #[tokio::test]
    async fn test_mark_activated_is_idempotent() {
        let repo = setup().await;
        repo.upsert_owner(&Owner::new(1)).await.unwrap();
        let handle = repo.add_handle(1, "target").await.unwrap();
        let at = Utc::now();

        assert!(repo.mark_activated(handle.id, at).await.unwrap());
        assert!(!repo.mark_activated(handle.id, at).await.unwrap());

        let stored = repo.get_handle(handle.id).await.unwrap().unwrap();
        assert!(stored.done);
        assert!(stored.activated_at.is_some());
        assert!(repo.pending_handles(1).await.unwrap().is_empty());

        assert!(matches!(
            repo.mark_activated(9999, at).await,
            Err(DomainError::HandleNotFound(9999))
        ));
    }
}
