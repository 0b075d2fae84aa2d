use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::{Config, MAX_CHECK_INTERVAL_MINUTES, MIN_CHECK_INTERVAL_MINUTES};

pub const CONFIG_FILE: &str = "autocheck.yaml";
pub const LOCAL_CONFIG_FILE: &str = "autocheck.local.yaml";
pub const ENV_PREFIX: &str = "AUTOCHECK_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid interval_minutes: {0}. Must be between 1 and 1440")]
    InvalidInterval(u32),

    #[error("Invalid global_concurrency_cap: {0}. Must be at least 1")]
    InvalidConcurrencyCap(usize),

    #[error("Invalid exploration_epsilon: {0}. Must be within [0, 1]")]
    InvalidEpsilon(f64),

    #[error("Invalid softmax_temperature: {0}. Must be positive")]
    InvalidTemperature(f64),

    #[error("Invalid history_cap: {0}. Must be at least 1")]
    InvalidHistoryCap(usize),

    #[error("Strategy list must not be empty")]
    NoStrategies,

    #[error("Strategy listed twice: {0}")]
    DuplicateStrategy(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. autocheck.yaml
    /// 3. autocheck.local.yaml (optional overrides)
    /// 4. Environment variables (AUTOCHECK_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(CONFIG_FILE))
            .merge(Yaml::file(LOCAL_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment overrides still apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let scheduler = &config.scheduler;
        if !(MIN_CHECK_INTERVAL_MINUTES..=MAX_CHECK_INTERVAL_MINUTES).contains(&scheduler.interval_minutes) {
            return Err(ConfigError::InvalidInterval(scheduler.interval_minutes));
        }
        if scheduler.global_concurrency_cap == 0 {
            return Err(ConfigError::InvalidConcurrencyCap(scheduler.global_concurrency_cap));
        }
        if scheduler.attempt_deadline_seconds == 0 {
            return Err(ConfigError::ValidationFailed(
                "attempt_deadline_seconds must be at least 1".to_string(),
            ));
        }
        if scheduler.max_attempts_per_handle == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts_per_handle must be at least 1".to_string(),
            ));
        }

        let learning = &config.learning;
        if !(0.0..=1.0).contains(&learning.exploration_epsilon) {
            return Err(ConfigError::InvalidEpsilon(learning.exploration_epsilon));
        }
        if learning.softmax_temperature.is_nan() || learning.softmax_temperature <= 0.0 {
            return Err(ConfigError::InvalidTemperature(learning.softmax_temperature));
        }
        if learning.history_cap == 0 {
            return Err(ConfigError::InvalidHistoryCap(learning.history_cap));
        }
        if learning.weight_window == 0 || learning.recompute_every == 0 {
            return Err(ConfigError::ValidationFailed(
                "weight_window and recompute_every must be at least 1".to_string(),
            ));
        }
        if learning.strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }
        let mut seen = HashSet::new();
        for strategy in &learning.strategies {
            if !seen.insert(*strategy) {
                return Err(ConfigError::DuplicateStrategy(strategy.to_string()));
            }
        }

        for probe in &config.backends.http_probes {
            if !probe.url_template.contains("{handle}") {
                return Err(ConfigError::ValidationFailed(format!(
                    "http probe for {} must contain {{handle}} in url_template",
                    probe.strategy
                )));
            }
        }

        if config.notifications.messages_per_second == 0 {
            return Err(ConfigError::ValidationFailed(
                "messages_per_second must be at least 1".to_string(),
            ));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.supervisor.max_quick_restarts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_quick_restarts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
