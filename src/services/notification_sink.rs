//! Asynchronous, per-owner ordered delivery of check notifications.
//!
//! Each owner gets a lane: an unbounded queue drained by its own task, so
//! one owner's slow or failing chat never delays another's. Transient
//! transport failures are retried with exponential backoff (1s, 2s, 4s by
//! default). An artifact file is removed once its message is delivered and
//! kept otherwise.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::models::{Notification, NotificationKind, NotificationsConfig, OwnerId};
use crate::domain::ports::NotificationTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Retries after the first failed send.
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::from(&NotificationsConfig::default())
    }
}

impl From<&NotificationsConfig> for SinkConfig {
    fn from(config: &NotificationsConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }
}

impl SinkConfig {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub delivered: u64,
    pub failed: u64,
    pub suppressed: u64,
}

struct Shared {
    transport: Arc<dyn NotificationTransport>,
    config: SinkConfig,
    delivered: AtomicU64,
    failed: AtomicU64,
    suppressed: AtomicU64,
    pending: AtomicUsize,
    idle: Notify,
    last_reported: Mutex<HashMap<(OwnerId, String), NotificationKind>>,
}

impl Shared {
    /// Forget an undelivered status so the next identical one is sent.
    fn forget(&self, owner_id: OwnerId, notification: &Notification) {
        let mut last = self
            .last_reported
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let key = (owner_id, notification.handle().to_string());
        if last.get(&key) == Some(&notification.kind()) {
            last.remove(&key);
        }
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

struct Lane {
    tx: mpsc::UnboundedSender<Notification>,
    task: JoinHandle<()>,
}

pub struct NotificationSink {
    shared: Arc<Shared>,
    lanes: Mutex<HashMap<OwnerId, Lane>>,
    closed: AtomicBool,
}

impl NotificationSink {
    pub fn new(transport: Arc<dyn NotificationTransport>, config: SinkConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                delivered: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                suppressed: AtomicU64::new(0),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                last_reported: Mutex::new(HashMap::new()),
            }),
            lanes: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue a notification on the owner's lane. Must be called from within
    /// a Tokio runtime.
    pub fn notify(&self, owner_id: OwnerId, notification: Notification) {
        if self.closed.load(Ordering::Acquire) {
            warn!(owner_id, handle = notification.handle(), "Sink closed, dropping notification");
            return;
        }

        let mut lanes = self
            .lanes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.shared.pending.fetch_add(1, Ordering::AcqRel);

        let notification = match lanes.get(&owner_id) {
            Some(lane) => match lane.tx.send(notification) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => returned,
            },
            None => notification,
        };

        let lane = spawn_lane(Arc::clone(&self.shared), owner_id);
        if let Err(mpsc::error::SendError(dropped)) = lane.tx.send(notification) {
            error!(owner_id, handle = dropped.handle(), "Fresh notification lane rejected message");
            self.shared.finish_one();
        }
        lanes.insert(owner_id, lane);
    }

    /// Queue a notification unless it repeats the last status reported for
    /// the same handle. Returns whether it was queued. A status whose
    /// delivery fails is forgotten, so the next tick reports it again.
    pub fn publish(&self, owner_id: OwnerId, notification: Notification) -> bool {
        let kind = notification.kind();
        let key = (owner_id, notification.handle().to_string());
        {
            let mut last = self
                .shared
                .last_reported
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if kind == NotificationKind::ActiveFound {
                last.remove(&key);
            } else if last.get(&key) == Some(&kind) {
                self.shared.suppressed.fetch_add(1, Ordering::Relaxed);
                debug!(owner_id, handle = %key.1, ?kind, "Suppressing repeated notification");
                return false;
            } else {
                last.insert(key, kind);
            }
        }
        self.notify(owner_id, notification);
        true
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            suppressed: self.shared.suppressed.load(Ordering::Relaxed),
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Wait until every queued notification has been delivered or dropped.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Close all lanes and wait up to `grace` for queued messages to drain.
    /// Lanes still busy after that are aborted.
    pub async fn shutdown(&self, grace: Duration) {
        self.closed.store(true, Ordering::Release);
        let lanes: Vec<(OwnerId, Lane)> = self
            .lanes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain()
            .collect();
        if lanes.is_empty() {
            return;
        }

        let mut tasks = Vec::with_capacity(lanes.len());
        for (owner_id, lane) in lanes {
            drop(lane.tx);
            tasks.push((owner_id, lane.task));
        }

        let deadline = tokio::time::Instant::now() + grace;
        let mut abandoned = 0usize;
        for (owner_id, mut task) in tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                warn!(owner_id, "Notification lane still busy at shutdown, aborting");
                task.abort();
                abandoned += 1;
            }
        }
        info!(stats = ?self.stats(), abandoned, "Notification sink stopped");
    }
}

impl std::fmt::Debug for NotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSink")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

fn spawn_lane(shared: Arc<Shared>, owner_id: OwnerId) -> Lane {
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let task = tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            let delivery = deliver(
                shared.transport.as_ref(),
                &shared.config,
                owner_id,
                &notification,
            );
            match AssertUnwindSafe(delivery).catch_unwind().await {
                Ok(DeliveryStatus::Delivered { .. }) => {
                    shared.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Ok(DeliveryStatus::Failed { .. }) => {
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    shared.forget(owner_id, &notification);
                }
                Err(_) => {
                    error!(owner_id, handle = notification.handle(), "Notification transport panicked");
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                    shared.forget(owner_id, &notification);
                }
            }
            shared.finish_one();
        }
    });
    Lane { tx, task }
}

/// Deliver one notification with retries, removing its artifact on success.
pub async fn deliver(
    transport: &dyn NotificationTransport,
    config: &SinkConfig,
    owner_id: OwnerId,
    notification: &Notification,
) -> DeliveryStatus {
    let text = notification.render_text();
    let artifact = notification.artifact().filter(|path| path.exists());
    let mut backoff = config.backoff();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let result = match artifact {
            Some(path) => transport.send_image(owner_id, path, &text).await,
            None => transport.send_text(owner_id, &text).await,
        };

        match result {
            Ok(()) => {
                if let Some(path) = artifact {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        warn!(owner_id, path = %path.display(), error = %e, "Failed to remove delivered artifact");
                    }
                }
                debug!(owner_id, handle = notification.handle(), attempts, "Notification delivered");
                return DeliveryStatus::Delivered { attempts };
            }
            Err(e) if e.is_transient() && attempts <= config.max_retries => {
                let delay = backoff.next_backoff().unwrap_or(config.initial_backoff);
                warn!(
                    owner_id,
                    handle = notification.handle(),
                    attempt = attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Notification delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!(owner_id, handle = notification.handle(), attempts, error = %e, "Dropping notification");
                return DeliveryStatus::Failed {
                    attempts,
                    error: e.to_string(),
                };
            }
        }
    }
}
