//! # Offline Queue
//!
//! Cash commits made without a network connection wait here and are replayed
//! in FIFO order once the device is back online.
//!
//! ## Drain Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         drain() (holds the commit lane)                │
//! │                                                                         │
//! │   head ──► replay commit under the entry's original record id          │
//! │              │                                                          │
//! │              ├─ written ............... remove entry, next head        │
//! │              ├─ CommitConflict ........ record already exists: discard │
//! │              ├─ retryable failure ..... retry_count += 1, STOP         │
//! │              │                          (park once over max_attempts)  │
//! │              └─ anything else ......... park for an operator           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`QueueDrainer`] task runs `drain()` whenever connectivity comes back,
//! and keeps retrying with exponential backoff while the device stays online
//! and entries remain.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use villagelink_core::{Clock, CommitPayload, Connectivity, QueuedAction};
use villagelink_db::OfflineQueueRepository;

use crate::commit::CommitEngine;
use crate::error::{BookingError, BookingResult};

/// Lane shared by foreground commits and queue drains. Holding it means no
/// other write can overtake the queue.
pub type CommitLane = Arc<Mutex<()>>;

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Entries written and removed.
    pub replayed: usize,
    /// Entries whose record already existed; discarded.
    pub conflicts: usize,
    /// Entries moved out of the FIFO.
    pub parked: usize,
    /// The retryable error the pass stopped on, if it stopped early.
    pub stopped_on: Option<String>,
    /// Unparked entries still waiting.
    pub remaining: i64,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.stopped_on.is_none()
    }
}

/// Queue depth as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: i64,
    pub parked: i64,
    pub connectivity: Connectivity,
}

// =============================================================================
// Offline Queue
// =============================================================================

/// The durable queue plus its replay logic.
pub struct OfflineQueue {
    repo: OfflineQueueRepository,
    engine: Arc<CommitEngine>,
    lane: CommitLane,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl OfflineQueue {
    pub fn new(
        repo: OfflineQueueRepository,
        engine: Arc<CommitEngine>,
        clock: Arc<dyn Clock>,
        max_attempts: u32,
    ) -> Self {
        OfflineQueue {
            repo,
            engine,
            lane: Arc::new(Mutex::new(())),
            clock,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The commit lane. Foreground commits take it before writing.
    pub fn lane(&self) -> CommitLane {
        Arc::clone(&self.lane)
    }

    /// Appends a frozen payload. Enqueuing the same attempt twice keeps one
    /// entry.
    pub async fn enqueue(&self, payload: &CommitPayload) -> BookingResult<QueuedAction> {
        let json = serde_json::to_string(payload)?;
        let action = self
            .repo
            .enqueue(
                payload.kind.as_str(),
                &payload.record_id.to_string(),
                &json,
                self.clock.now(),
            )
            .await?;
        Ok(action)
    }

    /// Replays queued commits, taking the commit lane for the whole pass.
    pub async fn drain(&self) -> BookingResult<DrainReport> {
        let _lane = self.lane.lock().await;
        self.drain_locked().await
    }

    /// Replays queued commits. The caller must hold the commit lane.
    pub(crate) async fn drain_locked(&self) -> BookingResult<DrainReport> {
        let mut report = DrainReport::default();

        while let Some(action) = self.repo.head().await? {
            let now = self.clock.now();

            let payload = match action.commit_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    error!(?e, entry = %action.id, "Queued payload is unreadable, parking");
                    self.repo.mark_failed(&action.id, &e.to_string(), now).await?;
                    self.repo.park(&action.id, now).await?;
                    report.parked += 1;
                    continue;
                }
            };

            match self.engine.commit_cash(payload).await {
                Ok(record) => {
                    self.repo.remove(&action.id).await?;
                    info!(record_id = %record.id, code = %record.code, "Replayed queued commit");
                    report.replayed += 1;
                }
                Err(BookingError::CommitConflict { record_id }) => {
                    if self.engine.store().find_by_id(&record_id).await?.is_some() {
                        warn!(
                            record_id = %record_id,
                            "Replay rejected as duplicate, discarding queue entry"
                        );
                        self.repo.remove(&action.id).await?;
                        report.conflicts += 1;
                    } else {
                        error!(record_id = %record_id, "Replay collided with another record's code, parking");
                        self.repo.mark_failed(&action.id, "code collision", now).await?;
                        self.repo.park(&action.id, now).await?;
                        report.parked += 1;
                    }
                }
                Err(e) if e.is_retryable() => {
                    let attempts = self.repo.mark_failed(&action.id, &e.to_string(), now).await?;
                    if attempts >= i64::from(self.max_attempts) {
                        warn!(
                            entry = %action.id,
                            attempts,
                            "Queued commit exceeded its retry budget, parking"
                        );
                        self.repo.park(&action.id, now).await?;
                        report.parked += 1;
                        continue;
                    }
                    debug!(?e, entry = %action.id, attempts, "Replay failed, will retry");
                    report.stopped_on = Some(e.to_string());
                    break;
                }
                Err(e) => {
                    error!(?e, entry = %action.id, "Replay failed permanently, parking");
                    self.repo.mark_failed(&action.id, &e.to_string(), now).await?;
                    self.repo.park(&action.id, now).await?;
                    report.parked += 1;
                }
            }
        }

        report.remaining = self.repo.count_pending().await?;
        Ok(report)
    }

    /// Replays whatever is queued before a new commit is written, so the new
    /// commit cannot overtake it. The caller must hold the commit lane.
    ///
    /// ## Errors
    /// `QueueBacklog` when the pass stops with entries still waiting.
    pub(crate) async fn catch_up_locked(&self) -> BookingResult<()> {
        if self.repo.count_pending().await? == 0 {
            return Ok(());
        }

        let report = self.drain_locked().await?;
        match report.stopped_on {
            None => Ok(()),
            Some(reason) => {
                warn!(remaining = report.remaining, %reason, "Queue still blocked, holding new commit");
                Err(BookingError::QueueBacklog {
                    pending: report.remaining,
                    reason,
                })
            }
        }
    }

    pub async fn pending_count(&self) -> BookingResult<i64> {
        Ok(self.repo.count_pending().await?)
    }

    pub async fn status(&self, connectivity: Connectivity) -> BookingResult<QueueStatus> {
        Ok(QueueStatus {
            pending: self.repo.count_pending().await?,
            parked: self.repo.count_parked().await?,
            connectivity,
        })
    }

    /// Entries set aside for an operator.
    pub async fn parked(&self) -> BookingResult<Vec<QueuedAction>> {
        Ok(self.repo.parked().await?)
    }

    /// Puts a parked entry back into the FIFO with a fresh retry budget.
    pub async fn requeue(&self, entry_id: &str) -> BookingResult<()> {
        self.repo.unpark(entry_id).await?;
        info!(entry = %entry_id, "Parked entry requeued");
        Ok(())
    }
}

// =============================================================================
// Background Drainer
// =============================================================================

/// Handle for stopping a running [`QueueDrainer`].
#[derive(Debug, Clone)]
pub struct QueueDrainerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl QueueDrainerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Drains the queue whenever the device comes back online.
pub struct QueueDrainer {
    queue: Arc<OfflineQueue>,
    connectivity: watch::Receiver<Connectivity>,
    backoff: ExponentialBackoff,
    shutdown_rx: mpsc::Receiver<()>,
}

impl QueueDrainer {
    pub fn new(
        queue: Arc<OfflineQueue>,
        connectivity: watch::Receiver<Connectivity>,
        initial_backoff: Duration,
        max_backoff: Duration,
    ) -> (Self, QueueDrainerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let mut backoff = ExponentialBackoff {
            initial_interval: initial_backoff,
            max_interval: max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();

        let drainer = QueueDrainer {
            queue,
            connectivity,
            backoff,
            shutdown_rx,
        };
        (drainer, QueueDrainerHandle { shutdown_tx })
    }

    /// Runs the drainer loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("Queue drainer starting");

        let mut retry_at = None;
        if self.connectivity.borrow_and_update().is_online() {
            retry_at = self.drain_once().await;
        }

        loop {
            let online = self.connectivity.borrow().is_online();
            let wake_at = retry_at.unwrap_or_else(Instant::now);

            tokio::select! {
                changed = self.connectivity.changed() => {
                    if changed.is_err() {
                        info!("Connectivity source closed");
                        break;
                    }
                    if self.connectivity.borrow_and_update().is_online() {
                        self.backoff.reset();
                        retry_at = self.drain_once().await;
                    } else {
                        retry_at = None;
                    }
                }

                _ = sleep_until(wake_at), if online && retry_at.is_some() => {
                    retry_at = self.drain_once().await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Queue drainer shutting down");
                    break;
                }
            }
        }

        info!("Queue drainer stopped");
    }

    /// One drain pass. Returns when to try again, if at all.
    async fn drain_once(&mut self) -> Option<Instant> {
        match self.queue.drain().await {
            Ok(report) if report.is_complete() => {
                if report.replayed + report.conflicts + report.parked > 0 {
                    info!(
                        replayed = report.replayed,
                        conflicts = report.conflicts,
                        parked = report.parked,
                        "Offline queue drained"
                    );
                }
                self.backoff.reset();
                None
            }
            Ok(report) => {
                let delay = self.backoff.next_backoff()?;
                warn!(
                    remaining = report.remaining,
                    error = report.stopped_on.as_deref().unwrap_or_default(),
                    ?delay,
                    "Queue drain stopped early, retrying"
                );
                Some(Instant::now() + delay)
            }
            Err(e) => {
                let delay = self.backoff.next_backoff()?;
                error!(?e, ?delay, "Queue drain failed, retrying");
                Some(Instant::now() + delay)
            }
        }
    }
}
