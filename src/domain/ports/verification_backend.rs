//! Backend port: one verification method producing a `CheckOutcome`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CheckOutcome, ResourceBundle, Strategy};

/// A verification method.
///
/// Implementations must not mutate the bundle. They may write an artifact
/// file and report its path in the outcome. `Err` is treated as an internal
/// failure (`unknown`).
#[async_trait]
pub trait VerificationBackend: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn check(&self, handle: &str, bundle: &ResourceBundle, deadline: Instant) -> DomainResult<CheckOutcome>;
}

/// Backends keyed by the strategy they implement.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<Strategy, Arc<dyn VerificationBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one for its strategy.
    pub fn register(&mut self, backend: Arc<dyn VerificationBackend>) {
        self.backends.insert(backend.strategy(), backend);
    }

    #[must_use]
    pub fn with(mut self, backend: Arc<dyn VerificationBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn get(&self, strategy: Strategy) -> Option<Arc<dyn VerificationBackend>> {
        self.backends.get(&strategy).cloned()
    }

    pub fn contains(&self, strategy: Strategy) -> bool {
        self.backends.contains_key(&strategy)
    }

    /// Registered strategies in the fixed strategy order.
    pub fn strategies(&self) -> Vec<Strategy> {
        Strategy::ALL
            .into_iter()
            .filter(|s| self.backends.contains_key(s))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("strategies", &self.strategies())
            .finish()
    }
}
