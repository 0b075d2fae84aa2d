//! Adapter running a synchronous check on the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CheckOutcome, ErrorTag, ResourceBundle, Strategy};
use crate::domain::ports::VerificationBackend;

type CheckFn = dyn Fn(&str, &ResourceBundle) -> DomainResult<CheckOutcome> + Send + Sync;

/// Wraps a blocking check (browser automation, native client) so it does
/// not stall the async workers.
///
/// A blocking thread cannot be interrupted. When the deadline passes the
/// outcome is reported as a timeout and the thread is left to finish.
pub struct BlockingBackend {
    strategy: Strategy,
    check: Arc<CheckFn>,
}

impl BlockingBackend {
    pub fn new<F>(strategy: Strategy, check: F) -> Self
    where
        F: Fn(&str, &ResourceBundle) -> DomainResult<CheckOutcome> + Send + Sync + 'static,
    {
        Self {
            strategy,
            check: Arc::new(check),
        }
    }
}

#[async_trait]
impl VerificationBackend for BlockingBackend {
    fn strategy(&self) -> Strategy {
        self.strategy
    }

    async fn check(&self, handle: &str, bundle: &ResourceBundle, deadline: Instant) -> DomainResult<CheckOutcome> {
        let check = Arc::clone(&self.check);
        let handle = handle.to_string();
        let bundle = bundle.clone();
        let task = tokio::task::spawn_blocking(move || check(&handle, &bundle));

        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(DomainError::BackendFailed(format!("blocking check aborted: {e}"))),
            Err(_) => {
                warn!(strategy = %self.strategy, "Blocking check outlived its deadline");
                Ok(CheckOutcome::unknown(self.strategy, ErrorTag::NetTimeout))
            }
        }
    }
}
