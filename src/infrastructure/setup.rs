//! Project initialization: default config file, data directory, database.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig};
use crate::domain::models::Config;
use crate::infrastructure::config::loader::CONFIG_FILE;

/// Default configuration template content
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Autocheck configuration
# Override settings by editing this file, adding autocheck.local.yaml, or
# setting environment variables with the AUTOCHECK_ prefix, e.g.
#   export AUTOCHECK_SCHEDULER__INTERVAL_MINUTES=10
#   export AUTOCHECK_NOTIFICATIONS__BOT_TOKEN=123456:ABC

scheduler:
  # Minutes between ticks (1-1440). The auto_check_interval_minutes
  # system setting overrides this at runtime.
  interval_minutes: 5
  run_immediately: true
  global_concurrency_cap: 64
  attempt_deadline_seconds: 60
  shutdown_grace_seconds: 30
  max_attempts_per_handle: 3

learning:
  history_path: "./data/strategy_history.json"
  history_cap: 1000
  exploration_epsilon: 0.1
  softmax_temperature: 2.0
  min_history_for_learning: 20
  weight_window: 100
  recompute_every: 10
  strategies: [api_direct, browser_advanced, browser_mobile, proxy_hybrid, browser_stealth]

resources:
  api_daily_limit: 950
  proxy_cooldown_seconds: 300
  proxy_failure_threshold: 3

notifications:
  max_retries: 3
  initial_backoff_ms: 1000
  # bot_token: "123456:ABC"
  api_base: "https://api.telegram.org"
  messages_per_second: 25

backends:
  artifact_dir: "./data/artifacts"
  http_probes:
    - strategy: proxy_hybrid
      url_template: "https://www.instagram.com/{handle}/"

database:
  path: "./data/autocheck.db"
  max_connections: 10

logging:
  level: "info"
  format: "pretty"
  rotation: "daily"

supervisor:
  max_quick_restarts: 5
  quick_restart_window_seconds: 60
  cooldown_seconds: 60
  restart_delay_seconds: 5
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub config_file: PathBuf,
    pub config_written: bool,
    pub database_file: PathBuf,
    pub artifact_dir: PathBuf,
}

/// Write the default config file into `root` unless one exists.
pub fn create_config_file(root: &Path, force: bool) -> Result<(PathBuf, bool)> {
    let path = root.join(CONFIG_FILE);
    if path.exists() && !force {
        return Ok((path, false));
    }
    fs::write(&path, DEFAULT_CONFIG_TEMPLATE).context("Failed to write config file")?;
    Ok((path, true))
}

/// Create the config file, the artifact directory and a migrated database.
pub async fn initialize_project(root: &Path, config: &Config, force: bool) -> Result<InitReport> {
    let (config_file, config_written) = create_config_file(root, force)?;

    let artifact_dir = root.join(&config.backends.artifact_dir);
    fs::create_dir_all(&artifact_dir).context("Failed to create artifact directory")?;

    let database_file = root.join(&config.database.path);
    let pool = initialize_database(
        &database_url(&database_file.to_string_lossy()),
        Some(PoolConfig::from(&config.database)),
    )
    .await
    .context("Failed to initialize database")?;
    pool.close().await;

    Ok(InitReport {
        config_file,
        config_written,
        database_file,
        artifact_dir,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::ConfigLoader;

    #[test]
    fn test_template_is_valid_config() {
        let config: Config = serde_yaml::from_str(DEFAULT_CONFIG_TEMPLATE).expect("template should parse");
        ConfigLoader::validate(&config).expect("template should validate");
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn test_initialize_project() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();

        let report = initialize_project(dir.path(), &config, false).await.unwrap();
        assert!(report.config_written);
        assert!(report.config_file.exists());
        assert!(report.database_file.exists());
        assert!(report.artifact_dir.is_dir());

        let again = initialize_project(dir.path(), &config, false).await.unwrap();
        assert!(!again.config_written);
    }
}
