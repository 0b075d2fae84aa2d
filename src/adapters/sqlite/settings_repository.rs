//! SQLite adapter for SettingsRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::adapters::sqlite::format_datetime;
use crate::domain::errors::DomainResult;
use crate::domain::ports::SettingsRepository;

#[derive(Clone)]
pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    async fn get_setting(&self, key: &str) -> DomainResult<Option<String>> {
        let value: Option<(String,)> = sqlx::query_as("SELECT value FROM system_settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.map(|(v,)| v))
    }

    async fn set_setting(&self, key: &str, value: &str) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO system_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::ports::AUTO_CHECK_INTERVAL_KEY;

    #[tokio::test]
    async fn test_setting_upsert() {
        let repo = SqliteSettingsRepository::new(create_migrated_test_pool().await.unwrap());
        assert_eq!(repo.get_setting(AUTO_CHECK_INTERVAL_KEY).await.unwrap(), None);

        repo.set_setting(AUTO_CHECK_INTERVAL_KEY, "10").await.unwrap();
        repo.set_setting(AUTO_CHECK_INTERVAL_KEY, "20").await.unwrap();
        assert_eq!(
            repo.get_setting(AUTO_CHECK_INTERVAL_KEY).await.unwrap().as_deref(),
            Some("20")
        );
    }
}
