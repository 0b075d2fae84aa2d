//! Fleet scheduler: periodically launches one worker per eligible owner.
//!
//! Lifecycle is `Stopped -> Running -> Stopping -> Stopped`. Each tick
//! re-reads the interval from the settings store, skips owners whose
//! previous worker is still running, and defers owners beyond the global
//! concurrency cap to the next tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{clamp_interval_minutes, OwnerId, SchedulerConfig};
use crate::domain::ports::{OwnerRepository, SettingsRepository, AUTO_CHECK_INTERVAL_KEY};
use crate::services::check_worker::{OwnerWorker, WorkerReport};
use crate::services::notification_sink::NotificationSink;
use crate::services::strategy_selector::AdaptiveSelector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetConfig {
    /// Used when the settings store has no interval.
    pub default_interval_minutes: u32,
    pub run_immediately: bool,
    pub concurrency_cap: usize,
    pub shutdown_grace: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for FleetConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            default_interval_minutes: config.interval_minutes,
            run_immediately: config.run_immediately,
            concurrency_cap: config.global_concurrency_cap.max(1),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_seconds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
    Stopping,
}

impl SchedulerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub eligible: usize,
    pub launched: Vec<OwnerId>,
    /// Owners whose previous worker was still running.
    pub skipped_busy: Vec<OwnerId>,
    /// Owners left for the next tick because the cap was reached.
    pub deferred: Vec<OwnerId>,
    pub interval_minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub finished: usize,
    pub abandoned: usize,
}

/// Held by the one scheduler allowed to run in this process.
static PROCESS_LEASE: AtomicBool = AtomicBool::new(false);

struct ActiveWorker {
    handle: JoinHandle<WorkerReport>,
    cancel: CancellationToken,
}

pub struct FleetScheduler {
    owners: Arc<dyn OwnerRepository>,
    settings: Arc<dyn SettingsRepository>,
    worker: Arc<OwnerWorker>,
    selector: Arc<AdaptiveSelector>,
    sink: Arc<NotificationSink>,
    config: FleetConfig,
    state: Mutex<SchedulerState>,
    active: Mutex<HashMap<OwnerId, ActiveWorker>>,
    slots: Arc<Semaphore>,
    root: Mutex<CancellationToken>,
    timer: Mutex<Option<JoinHandle<()>>>,
    ticks: std::sync::atomic::AtomicU64,
}

impl FleetScheduler {
    pub fn new(
        owners: Arc<dyn OwnerRepository>,
        settings: Arc<dyn SettingsRepository>,
        worker: Arc<OwnerWorker>,
        selector: Arc<AdaptiveSelector>,
        sink: Arc<NotificationSink>,
        config: FleetConfig,
    ) -> Self {
        Self {
            owners,
            settings,
            worker,
            selector,
            sink,
            slots: Arc::new(Semaphore::new(config.concurrency_cap)),
            config,
            state: Mutex::new(SchedulerState::Stopped),
            active: Mutex::new(HashMap::new()),
            root: Mutex::new(CancellationToken::new()),
            timer: Mutex::new(None),
            ticks: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn transition(&self, from: SchedulerState, to: SchedulerState) -> DomainResult<()> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state != from {
            return Err(DomainError::InvalidStateTransition {
                from: state.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        *state = to;
        Ok(())
    }

    /// Interval for the next tick: the stored setting if present and
    /// numeric, clamped to 1..=1440, otherwise the configured default.
    pub async fn current_interval_minutes(&self) -> u32 {
        match self.settings.get_setting(AUTO_CHECK_INTERVAL_KEY).await {
            Ok(Some(raw)) => match raw.trim().parse::<i64>() {
                Ok(minutes) => clamp_interval_minutes(minutes),
                Err(_) => {
                    warn!(value = %raw, "Ignoring non-numeric interval setting");
                    self.config.default_interval_minutes
                }
            },
            Ok(None) => self.config.default_interval_minutes,
            Err(e) => {
                warn!(error = %e, "Failed to read interval setting, using default");
                self.config.default_interval_minutes
            }
        }
    }

    /// Launch workers for eligible owners. Does not wait for them.
    pub async fn tick(&self) -> DomainResult<TickReport> {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let interval_minutes = self.current_interval_minutes().await;
        let worker_deadline = Instant::now() + Duration::from_secs(u64::from(interval_minutes) * 60);

        self.reap_finished().await;
        let owners = self.owners.list_eligible_owners().await?;
        let root = self.root_token();

        let mut report = TickReport {
            tick,
            eligible: owners.len(),
            interval_minutes,
            ..Default::default()
        };

        let mut active = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for owner in owners {
            if active.contains_key(&owner.id) {
                report.skipped_busy.push(owner.id);
                continue;
            }
            let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() else {
                report.deferred.push(owner.id);
                continue;
            };

            let cancel = root.child_token();
            let worker = Arc::clone(&self.worker);
            let token = cancel.clone();
            let span = info_span!("owner_worker", owner_id = owner.id, tick);
            let owner_id = owner.id;
            let handle = tokio::spawn(
                async move {
                    let _permit = permit;
                    worker.run(&owner, worker_deadline, &token).await
                }
                .instrument(span),
            );
            active.insert(owner_id, ActiveWorker { handle, cancel });
            report.launched.push(owner_id);
        }
        drop(active);

        info!(
            tick,
            eligible = report.eligible,
            launched = report.launched.len(),
            skipped_busy = report.skipped_busy.len(),
            deferred = report.deferred.len(),
            "Tick dispatched"
        );
        Ok(report)
    }

    /// Collect reports of workers that have finished.
    pub async fn reap_finished(&self) -> Vec<WorkerReport> {
        let finished: Vec<(OwnerId, ActiveWorker)> = {
            let mut active = self
                .active
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let done: Vec<OwnerId> = active
                .iter()
                .filter(|(_, w)| w.handle.is_finished())
                .map(|(id, _)| *id)
                .collect();
            done.into_iter()
                .filter_map(|id| active.remove(&id).map(|w| (id, w)))
                .collect()
        };

        let mut reports = Vec::with_capacity(finished.len());
        for (owner_id, worker) in finished {
            if let Some(report) = join_worker(owner_id, worker.handle).await {
                reports.push(report);
            }
        }
        reports
    }

    /// Wait for every running worker and return their reports.
    pub async fn wait_idle(&self) -> Vec<WorkerReport> {
        let workers: Vec<(OwnerId, ActiveWorker)> = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain()
            .collect();
        let mut reports = Vec::with_capacity(workers.len());
        for (owner_id, worker) in workers {
            if let Some(report) = join_worker(owner_id, worker.handle).await {
                reports.push(report);
            }
        }
        reports
    }

    pub fn active_owners(&self) -> Vec<OwnerId> {
        let mut ids: Vec<OwnerId> = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Start ticking. With `run_immediately`, one tick is dispatched before
    /// the timer is armed. Fails if this or any other scheduler in the
    /// process is already running.
    pub async fn start(self: &Arc<Self>) -> DomainResult<()> {
        self.transition(SchedulerState::Stopped, SchedulerState::Running)?;
        if PROCESS_LEASE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.transition(SchedulerState::Running, SchedulerState::Stopped)?;
            return Err(DomainError::ValidationFailed(
                "another scheduler is already running in this process".to_string(),
            ));
        }
        let root = CancellationToken::new();
        *self
            .root
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = root.clone();

        if self.config.run_immediately {
            if let Err(e) = self.tick().await {
                error!(error = %e, "Initial tick failed");
            }
        }

        let scheduler = Arc::clone(self);
        let timer_token = root.clone();
        let timer = tokio::spawn(async move {
            loop {
                let minutes = scheduler.current_interval_minutes().await;
                let period = Duration::from_secs(u64::from(minutes) * 60);
                debug!(interval_minutes = minutes, "Next tick armed");
                tokio::select! {
                    () = timer_token.cancelled() => break,
                    () = tokio::time::sleep(period) => {}
                }
                if let Err(e) = scheduler.tick().await {
                    error!(error = %e, "Tick failed");
                }
            }
        });
        *self
            .timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(timer);

        info!(
            cap = self.config.concurrency_cap,
            run_immediately = self.config.run_immediately,
            "Fleet scheduler running"
        );
        Ok(())
    }

    /// Cancel all workers, wait up to the grace period, abandon the rest,
    /// flush history and drain notifications.
    pub async fn shutdown(&self) -> DomainResult<ShutdownReport> {
        self.transition(SchedulerState::Running, SchedulerState::Stopping)?;
        info!("Fleet scheduler stopping");

        self.root_token().cancel();
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                warn!(error = %e, "Timer task ended abnormally");
            }
        }

        let workers: Vec<(OwnerId, ActiveWorker)> = self
            .active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain()
            .collect();

        let deadline = Instant::now() + self.config.shutdown_grace;
        let mut report = ShutdownReport::default();
        for (owner_id, mut worker) in workers {
            worker.cancel.cancel();
            match tokio::time::timeout_at(deadline, &mut worker.handle).await {
                Ok(Ok(worker_report)) => {
                    debug!(owner_id, report = ?worker_report, "Worker stopped");
                    report.finished += 1;
                }
                Ok(Err(e)) => {
                    error!(owner_id, error = %e, "Worker task failed during shutdown");
                    report.finished += 1;
                }
                Err(_) => {
                    warn!(owner_id, "Worker did not stop within grace period, abandoning");
                    worker.handle.abort();
                    report.abandoned += 1;
                }
            }
        }

        self.selector.flush().await;
        self.sink.shutdown(self.config.shutdown_grace).await;

        self.transition(SchedulerState::Stopping, SchedulerState::Stopped)?;
        PROCESS_LEASE.store(false, Ordering::Release);
        info!(finished = report.finished, abandoned = report.abandoned, "Fleet scheduler stopped");
        Ok(report)
    }

    fn root_token(&self) -> CancellationToken {
        self.root
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl std::fmt::Debug for FleetScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetScheduler")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("active", &self.active_owners())
            .finish_non_exhaustive()
    }
}

async fn join_worker(owner_id: OwnerId, handle: JoinHandle<WorkerReport>) -> Option<WorkerReport> {
    match handle.await {
        Ok(report) => {
            info!(
                owner_id,
                checked = report.checked,
                found = report.found,
                not_found = report.not_found,
                failed = report.failed,
                skipped = report.skipped,
                canceled = report.canceled,
                duration_ms = report.duration_ms,
                "Worker finished"
            );
            Some(report)
        }
        Err(e) => {
            error!(owner_id, error = %e, "Worker task failed");
            None
        }
    }
}
