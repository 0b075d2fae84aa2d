//! Common test utilities for integration tests
//!
//! Fixtures for owners and resources, an in-memory engine wired the same way
//! the runtime wires the SQLite one, and a transport that records what it
//! was asked to send.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;

use autocheck::adapters::backends::ScriptedBackend;
use autocheck::adapters::InMemoryStore;
use autocheck::domain::models::{
    ApiCredential, InteractiveSession, OwnerId, ProxyEndpoint, ProxyScheme, Strategy,
};
use autocheck::domain::ports::{
    BackendRegistry, NotificationTransport, OwnerRepository, PlaintextCipher, TransportError,
    VerificationBackend,
};
use autocheck::services::{
    AdaptiveSelector, FleetConfig, FleetScheduler, NotificationSink, OwnerWorker, ResolverConfig,
    SelectorConfig, SinkConfig, StoreResourceResolver, StrategyHistory, WorkerConfig,
};

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn credential(owner_id: OwnerId) -> ApiCredential {
    ApiCredential {
        id: 0,
        owner_id,
        encrypted_key: format!("key-{owner_id}"),
        working: true,
        request_count: 0,
        rotated_at: None,
        created_at: Utc::now(),
    }
}

pub fn session(owner_id: OwnerId) -> InteractiveSession {
    InteractiveSession {
        id: 0,
        owner_id,
        account_handle: format!("watcher{owner_id}"),
        encrypted_cookies: "sessionid=abc".to_string(),
        encrypted_password: None,
        active: true,
        expires_at: None,
        last_used_at: None,
        created_at: Utc::now(),
    }
}

pub fn proxy(owner_id: OwnerId, priority: u8) -> ProxyEndpoint {
    ProxyEndpoint {
        id: 0,
        owner_id,
        scheme: ProxyScheme::Http,
        host: format!("10.0.0.{priority}:8080"),
        username: None,
        encrypted_password: None,
        priority,
        active: true,
        used_count: 0,
        success_count: 0,
        fail_streak: 0,
        cooldown_until: None,
        created_at: Utc::now(),
    }
}

/// Records delivered messages. Deliveries for `failing_owner` panic.
#[derive(Default)]
pub struct RecordingTransport {
    pub failing_owner: Option<OwnerId>,
    sent: Mutex<Vec<(OwnerId, String)>>,
    images: Mutex<Vec<(OwnerId, PathBuf)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(owner_id: OwnerId) -> Self {
        Self {
            failing_owner: Some(owner_id),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(OwnerId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, owner_id: OwnerId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == owner_id)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn images(&self) -> Vec<(OwnerId, PathBuf)> {
        self.images.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send_text(&self, owner_id: OwnerId, text: &str) -> Result<(), TransportError> {
        if self.failing_owner == Some(owner_id) {
            panic!("transport exploded for owner {owner_id}");
        }
        self.sent.lock().unwrap().push((owner_id, text.to_string()));
        Ok(())
    }

    async fn send_image(&self, owner_id: OwnerId, image_path: &Path, caption: &str) -> Result<(), TransportError> {
        self.send_text(owner_id, caption).await?;
        self.images.lock().unwrap().push((owner_id, image_path.to_path_buf()));
        Ok(())
    }
}

pub fn fast_sink(transport: Arc<dyn NotificationTransport>) -> Arc<NotificationSink> {
    Arc::new(NotificationSink::new(
        transport,
        SinkConfig {
            max_retries: 0,
            initial_backoff: Duration::from_millis(1),
        },
    ))
}

pub fn selector(strategies: &[Strategy], history: Arc<StrategyHistory>) -> Arc<AdaptiveSelector> {
    let config = SelectorConfig::default()
        .with_strategies(strategies.iter().copied())
        .with_epsilon(0.0);
    Arc::new(AdaptiveSelector::with_seed(config, history, 42))
}

/// A worker over `store`'s resources; `owners` may wrap the same store.
pub fn owner_worker(
    owners: Arc<dyn OwnerRepository>,
    store: Arc<InMemoryStore>,
    registry: BackendRegistry,
    selector: Arc<AdaptiveSelector>,
    sink: Arc<NotificationSink>,
) -> Arc<OwnerWorker> {
    let resolver = Arc::new(StoreResourceResolver::new(
        store,
        Arc::new(PlaintextCipher),
        ResolverConfig::default(),
    ));
    Arc::new(OwnerWorker::new(
        owners,
        resolver,
        Arc::new(registry),
        selector,
        sink,
        WorkerConfig {
            attempt_deadline: Duration::from_secs(5),
            max_attempts: 3,
        },
    ))
}

/// Everything a worker or scheduler needs, backed by the in-memory store.
pub struct Engine {
    pub store: Arc<InMemoryStore>,
    pub backends: Vec<Arc<ScriptedBackend>>,
    pub selector: Arc<AdaptiveSelector>,
    pub transport: Arc<RecordingTransport>,
    pub sink: Arc<NotificationSink>,
    pub worker: Arc<OwnerWorker>,
}

impl Engine {
    pub fn new(backends: Vec<ScriptedBackend>, transport: RecordingTransport) -> Self {
        Self::with_history(backends, transport, Arc::new(StrategyHistory::in_memory(1000)))
    }

    pub fn with_history(
        backends: Vec<ScriptedBackend>,
        transport: RecordingTransport,
        history: Arc<StrategyHistory>,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let backends: Vec<Arc<ScriptedBackend>> = backends.into_iter().map(Arc::new).collect();

        let mut registry = BackendRegistry::new();
        for backend in &backends {
            registry.register(backend.clone());
        }
        let strategies = registry.strategies();

        let selector = selector(&strategies, history);
        let transport = Arc::new(transport);
        let sink = fast_sink(transport.clone());
        let worker = owner_worker(store.clone(), store.clone(), registry, selector.clone(), sink.clone());

        Self {
            store,
            backends,
            selector,
            transport,
            sink,
            worker,
        }
    }

    pub fn backend(&self, strategy: Strategy) -> &Arc<ScriptedBackend> {
        self.backends
            .iter()
            .find(|b| b.strategy() == strategy)
            .expect("no backend for strategy")
    }

    pub fn scheduler(&self, concurrency_cap: usize) -> Arc<FleetScheduler> {
        Arc::new(FleetScheduler::new(
            self.store.clone(),
            self.store.clone(),
            self.worker.clone(),
            self.selector.clone(),
            self.sink.clone(),
            FleetConfig {
                default_interval_minutes: 5,
                run_immediately: true,
                concurrency_cap,
                shutdown_grace: Duration::from_secs(2),
            },
        ))
    }
}

/// Poll `predicate` every 10ms until it holds or `timeout_ms` passes.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
