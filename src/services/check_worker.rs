//! Per-owner worker: checks an owner's pending handles one at a time.
//!
//! For each handle the worker picks a primary strategy (the owner's pinned
//! mode, else the selector), resolves resources, runs the backend under a
//! per-attempt deadline and falls back to another strategy while the
//! outcome is inconclusive. Every completed attempt is recorded for
//! learning; the final result is published to the notification sink and a
//! found handle is marked done.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::models::{
    normalize_handle, AttemptRecord, CheckOutcome, ErrorTag, Existence, Handle, HandleId,
    Notification, Owner, OwnerId, ResourceBundle, ResourceClass, SchedulerConfig, Strategy,
};
use crate::domain::ports::{
    BackendRegistry, OwnerRepository, Resolution, ResourceResolver, VerificationBackend,
};
use crate::services::notification_sink::NotificationSink;
use crate::services::strategy_selector::AdaptiveSelector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub attempt_deadline: Duration,
    pub max_attempts: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for WorkerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            attempt_deadline: Duration::from_secs(config.attempt_deadline_seconds),
            max_attempts: config.max_attempts_per_handle.max(1),
        }
    }
}

/// Final state of one handle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
    Activated,
    NotFound,
    Failed(ErrorTag),
    Skipped { class: ResourceClass, reason: ErrorTag },
    Invalid,
}

/// One step of the attempt loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptStep {
    pub strategy: Strategy,
    /// `None` when the step never reached a backend.
    pub exists: Option<Existence>,
    pub error: Option<ErrorTag>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandleCheck {
    pub handle_id: HandleId,
    pub handle: String,
    pub result: HandleResult,
    pub steps: Vec<AttemptStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub owner_id: OwnerId,
    pub checked: u32,
    pub found: u32,
    pub not_found: u32,
    pub failed: u32,
    pub skipped: u32,
    pub invalid: u32,
    pub canceled: bool,
    pub deadline_reached: bool,
    pub duration_ms: u64,
}

impl WorkerReport {
    fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            ..Default::default()
        }
    }

    fn tally(&mut self, result: HandleResult) {
        self.checked += 1;
        match result {
            HandleResult::Activated => self.found += 1,
            HandleResult::NotFound => self.not_found += 1,
            HandleResult::Failed(_) => self.failed += 1,
            HandleResult::Skipped { .. } => self.skipped += 1,
            HandleResult::Invalid => self.invalid += 1,
        }
    }
}

enum AttemptRun {
    Completed(CheckOutcome),
    Stopped,
}

pub struct OwnerWorker {
    owners: Arc<dyn OwnerRepository>,
    resolver: Arc<dyn ResourceResolver>,
    backends: Arc<BackendRegistry>,
    selector: Arc<AdaptiveSelector>,
    sink: Arc<NotificationSink>,
    config: WorkerConfig,
}

impl OwnerWorker {
    pub fn new(
        owners: Arc<dyn OwnerRepository>,
        resolver: Arc<dyn ResourceResolver>,
        backends: Arc<BackendRegistry>,
        selector: Arc<AdaptiveSelector>,
        sink: Arc<NotificationSink>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            owners,
            resolver,
            backends,
            selector,
            sink,
            config,
        }
    }

    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Check the owner's pending handles, oldest first, until done, canceled
    /// or past `deadline`. Handles not reached stay pending.
    pub async fn run(&self, owner: &Owner, deadline: Instant, cancel: &CancellationToken) -> WorkerReport {
        let started = Instant::now();
        let mut report = WorkerReport::new(owner.id);

        let handles = match self.owners.pending_handles(owner.id).await {
            Ok(handles) => handles,
            Err(e) => {
                error!(owner_id = owner.id, error = %e, "Failed to load pending handles");
                return report;
            }
        };
        debug!(owner_id = owner.id, pending = handles.len(), "Worker started");

        for handle in &handles {
            if cancel.is_cancelled() {
                report.canceled = true;
                break;
            }
            if Instant::now() >= deadline {
                report.deadline_reached = true;
                break;
            }
            match self.check_handle(owner, handle, deadline, cancel).await {
                Some(check) => report.tally(check.result),
                None => {
                    report.canceled = cancel.is_cancelled();
                    report.deadline_reached = !report.canceled;
                    break;
                }
            }
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if report.deadline_reached {
            info!(owner_id = owner.id, "Worker deadline reached, remaining handles left for next tick");
        }
        report
    }

    /// Check a single handle. Returns `None` if stopped mid-check, in which
    /// case nothing was recorded, published or marked for the in-flight attempt.
    pub async fn check_handle(
        &self,
        owner: &Owner,
        handle: &Handle,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Option<HandleCheck> {
        let Some(normalized) = normalize_handle(&handle.text) else {
            warn!(owner_id = owner.id, handle_id = handle.id, raw = %handle.text, "Invalid handle");
            self.sink.publish(
                owner.id,
                Notification::CheckFailed {
                    handle: handle.text.clone(),
                    error_tag: ErrorTag::InvalidHandle,
                },
            );
            return Some(HandleCheck {
                handle_id: handle.id,
                handle: handle.text.clone(),
                result: HandleResult::Invalid,
                steps: Vec::new(),
            });
        };

        let mut steps = Vec::new();
        let mut tried = HashSet::new();
        let mut current = owner
            .preferred_mode
            .map(|mode| mode.primary_strategy())
            .or_else(|| self.selector.select(&tried));
        let mut accepted: Option<(CheckOutcome, DateTime<Utc>)> = None;
        let mut last_error: Option<ErrorTag> = None;
        let mut first_missing: Option<(ResourceClass, ErrorTag)> = None;

        for _ in 0..self.config.max_attempts {
            let Some(strategy) = current else {
                break;
            };
            tried.insert(strategy);

            let bundle = match self.resolver.resolve(owner.id, strategy).await {
                Ok(Resolution::Ready(bundle)) => bundle,
                Ok(Resolution::Missing { class, reason }) => {
                    debug!(owner_id = owner.id, handle = %normalized, %strategy, %class, "skip_missing_resource");
                    steps.push(AttemptStep {
                        strategy,
                        exists: None,
                        error: Some(ErrorTag::SkipMissingResource),
                    });
                    if steps.len() == 1 {
                        first_missing = Some((class, reason));
                    }
                    break;
                }
                Err(e) => {
                    error!(owner_id = owner.id, %strategy, error = %e, "Resource resolution failed");
                    last_error = Some(ErrorTag::Unknown);
                    break;
                }
            };

            let outcome = match self.backends.get(strategy) {
                Some(backend) => {
                    match self
                        .run_attempt(backend, &normalized, &bundle, deadline, cancel)
                        .await
                    {
                        AttemptRun::Completed(outcome) => outcome,
                        AttemptRun::Stopped => {
                            info!(owner_id = owner.id, handle = %normalized, %strategy, "Check interrupted, attempt discarded");
                            return None;
                        }
                    }
                }
                None => {
                    warn!(%strategy, "No backend registered for strategy");
                    CheckOutcome::unknown(strategy, ErrorTag::NoBackend)
                }
            };

            if outcome.error_tag != Some(ErrorTag::NoBackend) {
                self.record(owner.id, &normalized, strategy, &bundle, &outcome).await;
            }

            steps.push(AttemptStep {
                strategy,
                exists: Some(outcome.exists),
                error: outcome.effective_error(),
            });

            if outcome.is_conclusive() {
                accepted = Some((outcome, Utc::now()));
                break;
            }

            discard_artifact(&outcome).await;
            let tag = outcome.effective_error().unwrap_or(ErrorTag::Unknown);
            last_error = Some(tag);
            if !tag.allows_fallback() {
                break;
            }
            current = self.selector.select(&tried);
        }

        let result = self
            .finish(owner.id, handle.id, &normalized, accepted, last_error, first_missing)
            .await;
        Some(HandleCheck {
            handle_id: handle.id,
            handle: normalized,
            result,
            steps,
        })
    }

    async fn run_attempt(
        &self,
        backend: Arc<dyn VerificationBackend>,
        handle: &str,
        bundle: &ResourceBundle,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> AttemptRun {
        let strategy = backend.strategy();
        let attempt_deadline = Instant::now() + self.config.attempt_deadline;
        let started = Instant::now();

        let task = {
            let handle = handle.to_string();
            let bundle = bundle.clone();
            tokio::spawn(async move { backend.check(&handle, &bundle, attempt_deadline).await })
        };
        let abort = task.abort_handle();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                abort.abort();
                return AttemptRun::Stopped;
            }
            () = tokio::time::sleep_until(deadline) => {
                abort.abort();
                return AttemptRun::Stopped;
            }
            joined = tokio::time::timeout_at(attempt_deadline, task) => match joined {
                Err(_) => {
                    abort.abort();
                    debug!(%strategy, handle, "Attempt deadline exceeded");
                    CheckOutcome::unknown(strategy, ErrorTag::NetTimeout)
                }
                Ok(Err(join_error)) => {
                    error!(%strategy, handle, error = %join_error, panicked = join_error.is_panic(), "Backend task failed");
                    CheckOutcome::unknown(strategy, ErrorTag::Unknown)
                }
                Ok(Ok(Err(e))) => {
                    error!(%strategy, handle, error = ?e, "Backend returned an error");
                    CheckOutcome::unknown(strategy, ErrorTag::Unknown)
                }
                Ok(Ok(Ok(mut outcome))) => {
                    outcome.checked_via = strategy;
                    outcome
                }
            }
        };

        let latency = started.elapsed().as_secs_f64();
        AttemptRun::Completed(if outcome.latency_seconds.is_some() {
            outcome
        } else {
            outcome.with_latency(latency)
        })
    }

    async fn record(
        &self,
        owner_id: OwnerId,
        handle: &str,
        strategy: Strategy,
        bundle: &ResourceBundle,
        outcome: &CheckOutcome,
    ) {
        let latency = outcome.latency_seconds.unwrap_or_default();
        let mut record = AttemptRecord::new(strategy, outcome.is_success(), latency)
            .for_handle(owner_id, handle)
            .with_proxy(bundle.uses_proxy());
        if let Some(tag) = outcome.effective_error() {
            record = record.with_error(tag.as_str());
        }
        info!(
            owner_id,
            handle,
            %strategy,
            exists = ?outcome.exists,
            error = ?outcome.error_tag,
            latency_ms = (latency * 1000.0) as u64,
            "Attempt finished"
        );
        self.selector.record(record).await;

        if let Err(e) = self.resolver.report_usage(bundle, outcome).await {
            warn!(owner_id, %strategy, error = %e, "Failed to update resource usage");
        }
    }

    async fn finish(
        &self,
        owner_id: OwnerId,
        handle_id: HandleId,
        handle: &str,
        accepted: Option<(CheckOutcome, DateTime<Utc>)>,
        last_error: Option<ErrorTag>,
        first_missing: Option<(ResourceClass, ErrorTag)>,
    ) -> HandleResult {
        match accepted {
            Some((outcome, at)) if outcome.exists == Existence::Exists => {
                self.sink.publish(
                    owner_id,
                    Notification::ActiveFound {
                        handle: handle.to_string(),
                        artifact: outcome.artifact_path,
                    },
                );
                match self.owners.mark_activated(handle_id, at).await {
                    Ok(true) => info!(owner_id, handle, "Handle activated"),
                    Ok(false) => debug!(owner_id, handle, "Handle was already active"),
                    Err(e) => error!(owner_id, handle, error = %e, "Failed to mark handle activated"),
                }
                HandleResult::Activated
            }
            Some((outcome, _)) => {
                discard_artifact(&outcome).await;
                self.sink.publish(
                    owner_id,
                    Notification::NotFound {
                        handle: handle.to_string(),
                    },
                );
                HandleResult::NotFound
            }
            None => match (last_error, first_missing) {
                (None, Some((class, reason))) => {
                    self.sink.publish(
                        owner_id,
                        Notification::SkippedMissingResource {
                            handle: handle.to_string(),
                            class,
                        },
                    );
                    HandleResult::Skipped { class, reason }
                }
                (tag, _) => {
                    let tag = tag.unwrap_or(ErrorTag::NoBackend);
                    self.sink.publish(
                        owner_id,
                        Notification::CheckFailed {
                            handle: handle.to_string(),
                            error_tag: tag,
                        },
                    );
                    HandleResult::Failed(tag)
                }
            },
        }
    }
}

/// Only an `ActiveFound` notification takes ownership of an artifact.
async fn discard_artifact(outcome: &CheckOutcome) {
    let Some(path) = &outcome.artifact_path else {
        return;
    };
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove unused artifact");
    }
}

impl std::fmt::Debug for OwnerWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerWorker")
            .field("config", &self.config)
            .field("backends", &self.backends)
            .finish_non_exhaustive()
    }
}
