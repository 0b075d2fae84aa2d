//! Wires configuration, storage, backends and services into a runnable checker.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::adapters::backends::HttpProbeBackend;
use crate::adapters::sqlite::{
    database_url, initialize_database, PoolConfig, SqliteOwnerRepository, SqliteResourceRepository,
    SqliteSettingsRepository,
};
use crate::adapters::{LogTransport, TelegramConfig, TelegramTransport};
use crate::domain::models::{BackendsConfig, Config, LearningConfig, NotificationsConfig, Strategy};
use crate::domain::ports::{BackendRegistry, NotificationTransport, PlaintextCipher};
use crate::services::{
    AdaptiveSelector, FleetConfig, FleetScheduler, HistoryConfig, NotificationSink, OwnerWorker,
    ResolverConfig, SelectorConfig, SinkConfig, StoreResourceResolver, StrategyHistory, WorkerConfig,
};

/// Backends built from the `backends` config section.
pub fn build_backends(config: &BackendsConfig) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    for probe in &config.http_probes {
        if registry.contains(probe.strategy) {
            warn!(strategy = %probe.strategy, "Duplicate backend for strategy, keeping the first");
            continue;
        }
        registry.register(Arc::new(HttpProbeBackend::new(probe.clone())));
    }
    registry
}

/// Configured strategies that have a backend, in fixed strategy order.
pub fn enabled_strategies(config: &LearningConfig, registry: &BackendRegistry) -> Vec<Strategy> {
    Strategy::ALL
        .into_iter()
        .filter(|s| config.strategies.contains(s) && registry.contains(*s))
        .collect()
}

pub fn build_transport(config: &NotificationsConfig) -> Result<Arc<dyn NotificationTransport>> {
    match TelegramConfig::from_notifications(config) {
        Some(telegram) => {
            let transport = TelegramTransport::new(telegram).context("Failed to create Telegram transport")?;
            Ok(Arc::new(transport))
        }
        None => {
            warn!("No bot token configured, notifications will only be logged");
            Ok(Arc::new(LogTransport))
        }
    }
}

/// Selector over the persisted history, for commands that only inspect it.
pub fn open_selector(config: &LearningConfig, strategies: Vec<Strategy>) -> AdaptiveSelector {
    let history = Arc::new(StrategyHistory::open(HistoryConfig::from(config)));
    AdaptiveSelector::new(SelectorConfig::from(config).with_strategies(strategies), history)
}

pub struct Runtime {
    pub config: Config,
    pub pool: SqlitePool,
    pub owners: Arc<SqliteOwnerRepository>,
    pub settings: Arc<SqliteSettingsRepository>,
    pub selector: Arc<AdaptiveSelector>,
    pub sink: Arc<NotificationSink>,
    pub scheduler: Arc<FleetScheduler>,
}

impl Runtime {
    pub async fn build(config: Config) -> Result<Self> {
        let pool = initialize_database(
            &database_url(&config.database.path),
            Some(PoolConfig::from(&config.database)),
        )
        .await
        .context("Failed to initialize database")?;
        std::fs::create_dir_all(&config.backends.artifact_dir).context("Failed to create artifact directory")?;

        let backends = Arc::new(build_backends(&config.backends));
        let strategies = enabled_strategies(&config.learning, &backends);
        if strategies.is_empty() {
            anyhow::bail!("No configured strategy has a backend");
        }

        let owners = Arc::new(SqliteOwnerRepository::new(pool.clone()));
        let resources = Arc::new(SqliteResourceRepository::new(pool.clone()));
        let settings = Arc::new(SqliteSettingsRepository::new(pool.clone()));

        let selector = Arc::new(open_selector(&config.learning, strategies.clone()));
        let sink = Arc::new(NotificationSink::new(
            build_transport(&config.notifications)?,
            SinkConfig::from(&config.notifications),
        ));
        let resolver = Arc::new(StoreResourceResolver::new(
            resources,
            Arc::new(PlaintextCipher),
            ResolverConfig::from(&config.resources),
        ));
        let worker = Arc::new(OwnerWorker::new(
            owners.clone(),
            resolver,
            backends,
            selector.clone(),
            sink.clone(),
            WorkerConfig::from(&config.scheduler),
        ));
        let scheduler = Arc::new(FleetScheduler::new(
            owners.clone(),
            settings.clone(),
            worker,
            selector.clone(),
            sink.clone(),
            FleetConfig::from(&config.scheduler),
        ));

        info!(
            strategies = ?strategies,
            interval_minutes = config.scheduler.interval_minutes,
            concurrency_cap = config.scheduler.global_concurrency_cap,
            "Runtime ready"
        );

        Ok(Self {
            config,
            pool,
            owners,
            settings,
            selector,
            sink,
            scheduler,
        })
    }
}
