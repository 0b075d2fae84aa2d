//! SQLite adapter for ResourceRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::adapters::sqlite::{format_datetime, parse_count, parse_datetime, parse_optional_datetime};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ApiCredential, InteractiveSession, OwnerId, OwnerResources, ProxyEndpoint, ProxyScheme, ResourceId,
};
use crate::domain::ports::{ProxyPenalty, ResourceRepository};

#[derive(Clone)]
pub struct SqliteResourceRepository {
    pool: SqlitePool,
}

impl SqliteResourceRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a credential. The `id` field is ignored; the new id is returned.
    pub async fn insert_credential(&self, credential: &ApiCredential) -> DomainResult<ResourceId> {
        let result = sqlx::query(
            "INSERT INTO api_credentials (owner_id, encrypted_key, working, request_count, rotated_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(credential.owner_id)
        .bind(&credential.encrypted_key)
        .bind(credential.working)
        .bind(i64::from(credential.request_count))
        .bind(credential.rotated_at.map(format_datetime))
        .bind(format_datetime(credential.created_at))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert_session(&self, session: &InteractiveSession) -> DomainResult<ResourceId> {
        let result = sqlx::query(
            "INSERT INTO sessions (owner_id, account_handle, encrypted_cookies, encrypted_password,
                                   active, expires_at, last_used_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.owner_id)
        .bind(&session.account_handle)
        .bind(&session.encrypted_cookies)
        .bind(&session.encrypted_password)
        .bind(session.active)
        .bind(session.expires_at.map(format_datetime))
        .bind(session.last_used_at.map(format_datetime))
        .bind(format_datetime(session.created_at))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn insert_proxy(&self, proxy: &ProxyEndpoint) -> DomainResult<ResourceId> {
        let result = sqlx::query(
            "INSERT INTO proxies (owner_id, scheme, host, username, encrypted_password, priority, active,
                                  used_count, success_count, fail_streak, cooldown_until, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(proxy.owner_id)
        .bind(proxy.scheme.as_str())
        .bind(&proxy.host)
        .bind(&proxy.username)
        .bind(&proxy.encrypted_password)
        .bind(i64::from(proxy.priority))
        .bind(proxy.active)
        .bind(i64::from(proxy.used_count))
        .bind(i64::from(proxy.success_count))
        .bind(i64::from(proxy.fail_streak))
        .bind(proxy.cooldown_until.map(format_datetime))
        .bind(format_datetime(proxy.created_at))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    owner_id: i64,
    encrypted_key: String,
    working: bool,
    request_count: i64,
    rotated_at: Option<String>,
    created_at: String,
}

fn row_to_credential(row: CredentialRow) -> DomainResult<ApiCredential> {
    Ok(ApiCredential {
        id: row.id,
        owner_id: row.owner_id,
        encrypted_key: row.encrypted_key,
        working: row.working,
        request_count: parse_count(row.request_count, "request_count")?,
        rotated_at: parse_optional_datetime(row.rotated_at)?,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    owner_id: i64,
    account_handle: String,
    encrypted_cookies: String,
    encrypted_password: Option<String>,
    active: bool,
    expires_at: Option<String>,
    last_used_at: Option<String>,
    created_at: String,
}

fn row_to_session(row: SessionRow) -> DomainResult<InteractiveSession> {
    Ok(InteractiveSession {
        id: row.id,
        owner_id: row.owner_id,
        account_handle: row.account_handle,
        encrypted_cookies: row.encrypted_cookies,
        encrypted_password: row.encrypted_password,
        active: row.active,
        expires_at: parse_optional_datetime(row.expires_at)?,
        last_used_at: parse_optional_datetime(row.last_used_at)?,
        created_at: parse_datetime(&row.created_at)?,
    })
}

#[derive(sqlx::FromRow)]
struct ProxyRow {
    id: i64,
    owner_id: i64,
    scheme: String,
    host: String,
    username: Option<String>,
    encrypted_password: Option<String>,
    priority: i64,
    active: bool,
    used_count: i64,
    success_count: i64,
    fail_streak: i64,
    cooldown_until: Option<String>,
    created_at: String,
}

fn row_to_proxy(row: ProxyRow) -> DomainResult<ProxyEndpoint> {
    let scheme: ProxyScheme = row.scheme.parse().map_err(DomainError::SerializationError)?;
    let priority = u8::try_from(row.priority)
        .map_err(|_| DomainError::SerializationError(format!("priority out of range: {}", row.priority)))?;
    Ok(ProxyEndpoint {
        id: row.id,
        owner_id: row.owner_id,
        scheme,
        host: row.host,
        username: row.username,
        encrypted_password: row.encrypted_password,
        priority,
        active: row.active,
        used_count: parse_count(row.used_count, "used_count")?,
        success_count: parse_count(row.success_count, "success_count")?,
        fail_streak: parse_count(row.fail_streak, "fail_streak")?,
        cooldown_until: parse_optional_datetime(row.cooldown_until)?,
        created_at: parse_datetime(&row.created_at)?,
    })
}

fn ensure_updated(rows_affected: u64, what: &str, id: ResourceId) -> DomainResult<()> {
    if rows_affected == 0 {
        return Err(DomainError::ValidationFailed(format!("{what} {id} not found")));
    }
    Ok(())
}

#[async_trait]
impl ResourceRepository for SqliteResourceRepository {
    async fn owner_resources(&self, owner_id: OwnerId) -> DomainResult<OwnerResources> {
        let credentials: Vec<CredentialRow> =
            sqlx::query_as("SELECT * FROM api_credentials WHERE owner_id = ? ORDER BY created_at, id")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;
        let sessions: Vec<SessionRow> =
            sqlx::query_as("SELECT * FROM sessions WHERE owner_id = ? ORDER BY created_at, id")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;
        let proxies: Vec<ProxyRow> =
            sqlx::query_as("SELECT * FROM proxies WHERE owner_id = ? ORDER BY created_at, id")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(OwnerResources {
            api_credentials: credentials.into_iter().map(row_to_credential).collect::<DomainResult<_>>()?,
            sessions: sessions.into_iter().map(row_to_session).collect::<DomainResult<_>>()?,
            proxies: proxies.into_iter().map(row_to_proxy).collect::<DomainResult<_>>()?,
        })
    }

    async fn record_credential_use(&self, credential_id: ResourceId, at: DateTime<Utc>) -> DomainResult<()> {
        // Stored timestamps start with the UTC date.
        let day = at.format("%Y-%m-%d").to_string();
        let result = sqlx::query(
            "UPDATE api_credentials
             SET request_count = CASE WHEN substr(rotated_at, 1, 10) = ?1 THEN request_count + 1 ELSE 1 END,
                 rotated_at = ?2
             WHERE id = ?3",
        )
        .bind(day)
        .bind(format_datetime(at))
        .bind(credential_id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "credential", credential_id)
    }

    async fn set_credential_working(&self, credential_id: ResourceId, working: bool) -> DomainResult<()> {
        let result = sqlx::query("UPDATE api_credentials SET working = ? WHERE id = ?")
            .bind(working)
            .bind(credential_id)
            .execute(&self.pool)
            .await?;
        ensure_updated(result.rows_affected(), "credential", credential_id)
    }

    async fn record_proxy_result(
        &self,
        proxy_id: ResourceId,
        success: bool,
        penalty: Option<ProxyPenalty>,
    ) -> DomainResult<()> {
        let result = sqlx::query(
            "UPDATE proxies
             SET used_count = used_count + 1,
                 success_count = success_count + ?1,
                 fail_streak = CASE WHEN ?1 THEN 0 ELSE fail_streak + 1 END,
                 cooldown_until = CASE
                     WHEN ?1 THEN NULL
                     WHEN ?2 IS NOT NULL AND fail_streak + 1 >= ?2 THEN ?3
                     ELSE cooldown_until
                 END
             WHERE id = ?4",
        )
        .bind(success)
        .bind(penalty.map(|p| i64::from(p.threshold)))
        .bind(penalty.map(|p| format_datetime(p.until)))
        .bind(proxy_id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), "proxy", proxy_id)
    }

    async fn touch_session(&self, session_id: ResourceId, at: DateTime<Utc>) -> DomainResult<()> {
        let result = sqlx::query("UPDATE sessions SET last_used_at = ? WHERE id = ?")
            .bind(format_datetime(at))
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        ensure_updated(result.rows_affected(), "session", session_id)
    }
}
