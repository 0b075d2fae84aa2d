use serde::{Deserialize, Serialize};

use super::owner::DEFAULT_CHECK_INTERVAL_MINUTES;
use super::strategy::Strategy;

/// Main configuration structure for autocheck
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub resources: ResourcesConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// Fleet scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerConfig {
    /// Minutes between ticks (1-1440). The `auto_check_interval_minutes`
    /// system setting overrides this at runtime.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,

    /// Fire one tick before arming the timer
    #[serde(default = "default_true")]
    pub run_immediately: bool,

    /// Maximum workers running at once across all owners
    #[serde(default = "default_concurrency_cap")]
    pub global_concurrency_cap: usize,

    #[serde(default = "default_attempt_deadline_seconds")]
    pub attempt_deadline_seconds: u64,

    /// How long shutdown waits for workers before abandoning them
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,

    /// Strategies tried per handle, including fallbacks
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_handle: usize,
}

const fn default_interval_minutes() -> u32 {
    DEFAULT_CHECK_INTERVAL_MINUTES
}

const fn default_true() -> bool {
    true
}

const fn default_concurrency_cap() -> usize {
    64
}

const fn default_attempt_deadline_seconds() -> u64 {
    60
}

const fn default_shutdown_grace_seconds() -> u64 {
    30
}

const fn default_max_attempts() -> usize {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            run_immediately: default_true(),
            global_concurrency_cap: default_concurrency_cap(),
            attempt_deadline_seconds: default_attempt_deadline_seconds(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            max_attempts_per_handle: default_max_attempts(),
        }
    }
}

/// Strategy history and selector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LearningConfig {
    #[serde(default = "default_history_path")]
    pub history_path: String,

    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    #[serde(default = "default_epsilon")]
    pub exploration_epsilon: f64,

    #[serde(default = "default_temperature")]
    pub softmax_temperature: f64,

    #[serde(default = "default_min_history")]
    pub min_history_for_learning: usize,

    /// Records considered when deriving weights
    #[serde(default = "default_weight_window")]
    pub weight_window: usize,

    /// Weights are re-derived and history flushed every this many appends
    #[serde(default = "default_recompute_every")]
    pub recompute_every: usize,

    #[serde(default = "default_strategies")]
    pub strategies: Vec<Strategy>,
}

fn default_history_path() -> String {
    "./data/strategy_history.json".to_string()
}

const fn default_history_cap() -> usize {
    1000
}

const fn default_epsilon() -> f64 {
    0.1
}

const fn default_temperature() -> f64 {
    2.0
}

const fn default_min_history() -> usize {
    20
}

const fn default_weight_window() -> usize {
    100
}

const fn default_recompute_every() -> usize {
    10
}

fn default_strategies() -> Vec<Strategy> {
    Strategy::ALL.to_vec()
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            history_path: default_history_path(),
            history_cap: default_history_cap(),
            exploration_epsilon: default_epsilon(),
            softmax_temperature: default_temperature(),
            min_history_for_learning: default_min_history(),
            weight_window: default_weight_window(),
            recompute_every: default_recompute_every(),
            strategies: default_strategies(),
        }
    }
}

/// Resource rotation and health settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourcesConfig {
    /// Requests per API credential per UTC day
    #[serde(default = "default_api_daily_limit")]
    pub api_daily_limit: u32,

    #[serde(default = "default_proxy_cooldown_seconds")]
    pub proxy_cooldown_seconds: u64,

    /// Consecutive transport failures before a proxy cools down
    #[serde(default = "default_proxy_failure_threshold")]
    pub proxy_failure_threshold: u32,
}

const fn default_api_daily_limit() -> u32 {
    950
}

const fn default_proxy_cooldown_seconds() -> u64 {
    300
}

const fn default_proxy_failure_threshold() -> u32 {
    3
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            api_daily_limit: default_api_daily_limit(),
            proxy_cooldown_seconds: default_proxy_cooldown_seconds(),
            proxy_failure_threshold: default_proxy_failure_threshold(),
        }
    }
}

/// Notification delivery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotificationsConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Chat bot token; falls back to the `BOT_TOKEN` environment variable
    #[serde(default)]
    pub bot_token: Option<String>,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Outbound messages per second across all owners
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: u32,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

const fn default_messages_per_second() -> u32 {
    25
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            bot_token: None,
            api_base: default_api_base(),
            messages_per_second: default_messages_per_second(),
        }
    }
}

/// HTTP probe backends and artifact storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackendsConfig {
    /// Directory backends write screenshots into
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    #[serde(default = "default_http_probes")]
    pub http_probes: Vec<HttpProbeConfig>,
}

fn default_artifact_dir() -> String {
    "./data/artifacts".to_string()
}

fn default_http_probes() -> Vec<HttpProbeConfig> {
    vec![HttpProbeConfig {
        strategy: Strategy::ProxyHybrid,
        url_template: "https://www.instagram.com/{handle}/".to_string(),
        api_key_header: None,
        user_agent: None,
    }]
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            http_probes: default_http_probes(),
        }
    }
}

/// A profile-page probe registered for one strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpProbeConfig {
    pub strategy: Strategy,

    /// URL with a `{handle}` placeholder
    pub url_template: String,

    /// Header that carries the bundle's API key, if any
    #[serde(default)]
    pub api_key_header: Option<String>,

    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    "./data/autocheck.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json or pretty)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// File rotation (daily, hourly, never)
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Restart policy for `autocheck supervise`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    #[serde(default = "default_max_quick_restarts")]
    pub max_quick_restarts: u32,

    #[serde(default = "default_quick_restart_window_seconds")]
    pub quick_restart_window_seconds: u64,

    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Pause before relaunching a crashed child
    #[serde(default = "default_restart_delay_seconds")]
    pub restart_delay_seconds: u64,
}

const fn default_max_quick_restarts() -> u32 {
    5
}

const fn default_quick_restart_window_seconds() -> u64 {
    60
}

const fn default_cooldown_seconds() -> u64 {
    60
}

const fn default_restart_delay_seconds() -> u64 {
    5
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_quick_restarts: default_max_quick_restarts(),
            quick_restart_window_seconds: default_quick_restart_window_seconds(),
            cooldown_seconds: default_cooldown_seconds(),
            restart_delay_seconds: default_restart_delay_seconds(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.interval_minutes, 5);
        assert!(config.scheduler.run_immediately);
        assert_eq!(config.scheduler.global_concurrency_cap, 64);
        assert_eq!(config.scheduler.attempt_deadline_seconds, 60);
        assert_eq!(config.learning.history_cap, 1000);
        assert!((config.learning.exploration_epsilon - 0.1).abs() < f64::EPSILON);
        assert!((config.learning.softmax_temperature - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.learning.min_history_for_learning, 20);
        assert_eq!(config.learning.strategies.len(), 5);
        assert_eq!(config.resources.api_daily_limit, 950);
        assert_eq!(config.notifications.max_retries, 3);
        assert_eq!(config.supervisor.max_quick_restarts, 5);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "scheduler:\n  interval_minutes: 15\nlearning:\n  strategies: [api_direct, proxy_hybrid]\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.scheduler.interval_minutes, 15);
        assert_eq!(config.scheduler.global_concurrency_cap, 64);
        assert_eq!(
            config.learning.strategies,
            vec![Strategy::ApiDirect, Strategy::ProxyHybrid]
        );
        assert_eq!(config.learning.history_cap, 1000);
    }
}
