//! Scripted backend for tests and dry runs.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CheckOutcome, ErrorTag, Existence, ResourceBundle, Strategy};
use crate::domain::ports::VerificationBackend;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Scripted {
    Found,
    NotFound,
    /// Reply with an artifact file attached. `Unknown` carries `captcha_required`.
    Artifact(Existence, PathBuf),
    Unknown(ErrorTag),
    Fail(String),
    Panic,
    /// Never returns; only a deadline or cancellation ends the call.
    Hang,
}

#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub handle: String,
    pub bundle: ResourceBundle,
}

/// Replies from a queue, then repeats the fallback reply.
pub struct ScriptedBackend {
    strategy: Strategy,
    queue: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    delay: Duration,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedBackend {
    pub fn new(strategy: Strategy, fallback: Scripted) -> Self {
        Self {
            strategy,
            queue: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn then(self, reply: Scripted) -> Self {
        lock(&self.queue).push_back(reply);
        self
    }

    /// Simulated latency before every reply.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl VerificationBackend for ScriptedBackend {
    fn strategy(&self) -> Strategy {
        self.strategy
    }

    async fn check(&self, handle: &str, bundle: &ResourceBundle, _deadline: Instant) -> DomainResult<CheckOutcome> {
        lock(&self.calls).push(ScriptedCall {
            handle: handle.to_string(),
            bundle: bundle.clone(),
        });
        let reply = lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match reply {
            Scripted::Found => Ok(CheckOutcome::found(self.strategy)),
            Scripted::NotFound => Ok(CheckOutcome::not_found(self.strategy)),
            Scripted::Artifact(exists, path) => {
                let outcome = match exists {
                    Existence::Exists => CheckOutcome::found(self.strategy),
                    Existence::NotFound => CheckOutcome::not_found(self.strategy),
                    Existence::Unknown => CheckOutcome::unknown(self.strategy, ErrorTag::CaptchaRequired),
                };
                Ok(outcome.with_artifact(path))
            }
            Scripted::Unknown(tag) => Ok(CheckOutcome::unknown(self.strategy, tag)),
            Scripted::Fail(message) => Err(DomainError::BackendFailed(message)),
            Scripted::Panic => panic!("scripted backend panic"),
            Scripted::Hang => std::future::pending().await,
        }
    }
}
