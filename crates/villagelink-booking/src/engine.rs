//! # Booking Engine
//!
//! The facade a passenger or conductor session talks to. It owns the draft,
//! routes commits to the right strategy and keeps the background tasks
//! (queue drainer, read-model poller, credential refreshers) tied to its own
//! lifetime.
//!
//! ## Commit Path
//! ```text
//! commit()
//!   │
//!   ├─ in-flight guard ──────────── second caller: CommitInFlight
//!   ├─ freeze draft → CommitPayload  draft-side errors keep the draft
//!   ├─ select_strategy(method, connectivity, queueable)
//!   │
//!   ├─ ONLINE ──────► CommitEngine::commit_online   (cancellable wait)
//!   └─ CASH / WALLET / QUEUE
//!         │
//!         ├─ take the commit lane (waits behind a running drain)
//!         ├─ online? replay anything still queued first
//!         └─ CommitEngine::commit_* / OfflineQueue::enqueue
//!
//! success or an attempt-ending error ─► draft reset (fresh attempt id)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use villagelink_core::validation::validate_place_name;
use villagelink_core::{
    select_strategy, BookingDraft, Clock, CommitPayload, CommittedRecord, Connectivity,
    CoreError, Credential, DraftPatch, DraftStore, ExecutionStrategy, Presentation, PriceQuote,
    QueuedAction, RecordKind, ResolvedRoute, ValidationOutcome,
};
use villagelink_db::Database;

use crate::commit::CommitEngine;
use crate::config::BookingConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::credential::CredentialService;
use crate::error::{BookingError, BookingResult};
use crate::gateway::ValidationGateway;
use crate::poller::{ReadModel, ReadModelPoller, ReadModelPollerHandle, SharedReadModel};
use crate::queue::{
    CommitLane, DrainReport, OfflineQueue, QueueDrainer, QueueDrainerHandle, QueueStatus,
};
use crate::reservation::ReservationBook;
use crate::services::{ChargeOutcome, Collaborators};
use crate::store::RecordStore;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What `commit()` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The record exists.
    Committed(CommittedRecord),
    /// Offline: the record will be written when the queue drains.
    Queued(QueuedAction),
}

impl CommitOutcome {
    pub fn record(&self) -> Option<&CommittedRecord> {
        match self {
            CommitOutcome::Committed(record) => Some(record),
            CommitOutcome::Queued(_) => None,
        }
    }
}

/// Clears the in-flight flag when the commit finishes, however it finishes.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> BookingResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BookingError::CommitInFlight)?;
        Ok(InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct Background {
    drainer: Option<(QueueDrainerHandle, JoinHandle<()>)>,
    poller: Option<(ReadModelPollerHandle, JoinHandle<()>)>,
}

/// One acting user's booking session.
pub struct BookingEngine {
    config: Arc<BookingConfig>,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
    store: Arc<dyn RecordStore>,
    drafts: Mutex<DraftStore>,
    commit: Arc<CommitEngine>,
    queue: Arc<OfflineQueue>,
    lane: CommitLane,
    credentials: Arc<CredentialService>,
    gateway: ValidationGateway,
    connectivity: ConnectivityMonitor,
    in_flight: AtomicBool,
    pending_cancel: Mutex<Option<oneshot::Sender<()>>>,
    read_model: SharedReadModel,
    background: Mutex<Background>,
}

impl BookingEngine {
    /// Builds an engine over `db`. Background tasks start with
    /// [`start_background`](Self::start_background).
    pub fn new(
        config: BookingConfig,
        db: &Database,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> BookingResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let store: Arc<dyn RecordStore> = Arc::new(db.records());

        let reservations = Arc::new(ReservationBook::new(
            config.reservation_ttl(),
            Arc::clone(&clock),
        ));
        let commit = Arc::new(
            CommitEngine::new(
                Arc::clone(&store),
                &collaborators,
                reservations,
                Arc::clone(&clock),
            )
            .with_reward_rate(config.reward_rate())
            .with_gateway_timeout(config.gateway_timeout()),
        );
        let queue = Arc::new(OfflineQueue::new(
            db.offline_queue(),
            Arc::clone(&commit),
            Arc::clone(&clock),
            config.queue.max_attempts,
        ));
        let credentials = Arc::new(CredentialService::new(
            Arc::clone(&collaborators.issuer),
            Arc::clone(&clock),
            config.credential_window(),
        ));
        let gateway = ValidationGateway::new(
            Arc::clone(&store),
            Arc::clone(&collaborators.issuer),
            Arc::clone(&collaborators.earnings),
            Arc::clone(&clock),
        )
        .with_platform_fee(config.platform_fee())
        .with_manual_entry(config.validation.allow_manual_entry);
        let drafts = DraftStore::new(
            config.subsidy_policy(),
            config.fares.add_on_fees,
            Arc::clone(&clock),
        );

        info!(device_id = %config.device.id, "Booking engine ready");

        Ok(BookingEngine {
            lane: queue.lane(),
            config,
            clock,
            collaborators,
            store,
            drafts: Mutex::new(drafts),
            commit,
            queue,
            credentials,
            gateway,
            connectivity: ConnectivityMonitor::new(Connectivity::Online),
            in_flight: AtomicBool::new(false),
            pending_cancel: Mutex::new(None),
            read_model: SharedReadModel::default(),
            background: Mutex::new(Background::default()),
        })
    }

    pub fn config(&self) -> &BookingConfig {
        &self.config
    }

    // =========================================================================
    // Background Tasks
    // =========================================================================

    /// Starts the queue drainer. Calling it again does nothing.
    pub fn start_background(&self) {
        let mut background = lock(&self.background);
        if background.drainer.is_some() {
            return;
        }
        let (drainer, handle) = QueueDrainer::new(
            Arc::clone(&self.queue),
            self.connectivity.subscribe(),
            self.config.initial_backoff(),
            self.config.max_backoff(),
        );
        background.drainer = Some((handle, tokio::spawn(drainer.run())));
    }

    /// Starts polling the read side for `owner_id`, replacing any previous
    /// owner's poller.
    pub fn watch_owner(&self, owner_id: &str) {
        let (poller, handle) = ReadModelPoller::new(
            owner_id,
            Arc::clone(&self.store),
            Arc::clone(&self.collaborators.wallet),
            Arc::clone(&self.credentials),
            Arc::clone(&self.read_model),
            Arc::clone(&self.clock),
            self.config.poll_interval(),
        );
        let task = tokio::spawn(poller.run());
        if let Some((_, previous)) = lock(&self.background).poller.replace((handle, task)) {
            previous.abort();
        }
    }

    /// The last polled read model.
    pub async fn read_model(&self) -> ReadModel {
        self.read_model.read().await.clone()
    }

    // =========================================================================
    // Draft
    // =========================================================================

    fn drafts(&self) -> MutexGuard<'_, DraftStore> {
        lock(&self.drafts)
    }

    /// Starts a fresh draft for `owner_id`.
    pub fn create_draft(&self, owner_id: &str, kind: RecordKind) -> BookingResult<BookingDraft> {
        let mut drafts = self.drafts();
        let draft = drafts.create_draft(owner_id, kind)?.clone();
        debug!(owner_id = %draft.owner_id, %kind, attempt_id = %draft.attempt_id, "Draft created");
        Ok(draft)
    }

    pub fn draft(&self) -> Option<BookingDraft> {
        self.drafts().draft().cloned()
    }

    /// Applies a batch of edits. Route changes are looked up first; the
    /// whole patch then applies atomically.
    ///
    /// Returns the new quote once route, fare and passengers are known.
    pub async fn update_draft(&self, patch: DraftPatch) -> BookingResult<Option<PriceQuote>> {
        let resolved = if patch.changes_route() {
            Some(self.resolve_route(&patch).await?)
        } else {
            None
        };

        let mut drafts = self.drafts();
        drafts.apply_patch(&patch, resolved)?;
        let quote = drafts.last_quote().cloned();
        if let Some(q) = &quote {
            debug!(total = %q.total_fare(), "Quote recomputed");
        }
        Ok(quote)
    }

    async fn resolve_route(&self, patch: &DraftPatch) -> BookingResult<ResolvedRoute> {
        let (origin, destination) = {
            let drafts = self.drafts();
            let draft = drafts.draft().ok_or(CoreError::NoActiveDraft)?;
            (
                patch.origin.clone().or_else(|| draft.origin.clone()),
                patch.destination.clone().or_else(|| draft.destination.clone()),
            )
        };
        let origin = origin.ok_or_else(|| CoreError::missing("origin"))?;
        let destination = destination.ok_or_else(|| CoreError::missing("destination"))?;
        validate_place_name("origin", &origin)?;
        validate_place_name("destination", &destination)?;

        let route = self
            .collaborators
            .routes
            .compute_route(origin.trim(), destination.trim())
            .await?;
        let fare = self
            .collaborators
            .fares
            .base_fare(route.distance_m, self.clock.now())
            .await?;
        debug!(distance_m = route.distance_m, base = %fare.base, "Route resolved");

        Ok(ResolvedRoute {
            origin,
            destination,
            route,
            fare,
        })
    }

    /// The current quote, recomputed now.
    pub fn quote(&self) -> BookingResult<PriceQuote> {
        Ok(self.drafts().quote()?)
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commits the current draft.
    ///
    /// ## Errors
    /// - `CommitInFlight` while another commit runs
    /// - draft-side errors (`Precondition`, `Validation`) with the draft kept
    /// - `Connectivity` for a live-only method while offline
    /// - any `CommitEngine` error; see [`BookingError::ends_attempt`] for
    ///   which of them reset the draft
    pub async fn commit(&self) -> BookingResult<CommitOutcome> {
        let _in_flight = InFlight::acquire(&self.in_flight)?;

        let payload = self.drafts().commit_payload()?;
        let connectivity = self.connectivity.current();
        let strategy = select_strategy(
            &payload,
            connectivity,
            self.config.is_queueable(payload.kind),
        )?;
        debug!(record_id = %payload.record_id, ?strategy, "Commit strategy selected");

        let outcome = match strategy {
            ExecutionStrategy::Online { .. } => self.commit_online(payload).await,
            ExecutionStrategy::QueueOffline => {
                let _lane = self.lane.lock().await;
                self.queue
                    .enqueue(&payload)
                    .await
                    .map(CommitOutcome::Queued)
            }
            ExecutionStrategy::Cash => {
                let _lane = self.lane.lock().await;
                match self.catch_up_queue().await {
                    Ok(()) => self
                        .commit
                        .commit_cash(payload)
                        .await
                        .map(CommitOutcome::Committed),
                    Err(e) => Err(e),
                }
            }
            ExecutionStrategy::WalletCoin => {
                let _lane = self.lane.lock().await;
                match self.catch_up_queue().await {
                    Ok(()) => self
                        .commit
                        .commit_wallet(payload)
                        .await
                        .map(CommitOutcome::Committed),
                    Err(e) => Err(e),
                }
            }
        };

        match &outcome {
            Ok(_) => self.drafts().reset(),
            Err(e) if e.ends_attempt() => {
                info!(?e, "Booking attempt ended");
                self.drafts().reset();
            }
            Err(e) => debug!(?e, "Commit failed, draft kept"),
        }
        outcome
    }

    async fn commit_online(
        &self,
        payload: CommitPayload,
    ) -> BookingResult<CommitOutcome> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        *lock(&self.pending_cancel) = Some(cancel_tx);
        let result = self.commit.commit_online(payload, cancel_rx).await;
        lock(&self.pending_cancel).take();
        result.map(CommitOutcome::Committed)
    }

    /// Replays queued commits before a new one so it cannot overtake them.
    /// The caller holds the commit lane.
    async fn catch_up_queue(&self) -> BookingResult<()> {
        if !self.connectivity.current().is_online() {
            return Ok(());
        }
        self.queue.catch_up_locked().await
    }

    /// Leaves the booking flow: cancels a pending gateway wait, releases the
    /// reservation and resets the draft.
    pub fn abandon(&self) {
        let cancelled = lock(&self.pending_cancel)
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false);

        let mut drafts = self.drafts();
        if let Some(draft) = drafts.draft() {
            self.commit.reservations().release(draft.attempt_id);
        }
        drafts.reset();
        info!(cancelled, "Booking flow abandoned");
    }

    /// Applies a late result from the payment gateway.
    pub async fn handle_gateway_callback(
        &self,
        order_id: Uuid,
        outcome: ChargeOutcome,
    ) -> BookingResult<CommittedRecord> {
        self.commit.handle_gateway_callback(order_id, outcome).await
    }

    pub async fn record(&self, record_id: &str) -> BookingResult<Option<CommittedRecord>> {
        self.store.find_by_id(record_id).await
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    async fn live_record(&self, record_id: &str) -> BookingResult<CommittedRecord> {
        let record = self.store.find_by_id(record_id).await?.ok_or_else(|| {
            BookingError::InvalidCredential(format!("no record {record_id}"))
        })?;
        if record.is_terminal() {
            self.credentials.retire(record_id);
        }
        Ok(record)
    }

    /// The live credential for a committed record.
    pub async fn get_credential(&self, record_id: &str) -> BookingResult<Credential> {
        let record = self.live_record(record_id).await?;
        self.credentials.get(&record).await
    }

    /// Renews the credential now, issuing one if none is tracked yet.
    pub async fn refresh_credential(&self, record_id: &str) -> BookingResult<Credential> {
        let record = self.live_record(record_id).await?;
        if self.credentials.current(record_id).is_some() && !record.is_terminal() {
            self.credentials.refresh(record_id).await
        } else {
            self.credentials.get(&record).await
        }
    }

    /// What the display layer may show for the record right now.
    pub fn present_credential(&self, record_id: &str) -> Option<Presentation> {
        self.credentials.present(record_id)
    }

    /// Stops refreshing because the credential view closed.
    pub fn dismiss_credential(&self, record_id: &str) -> bool {
        self.credentials.dismiss(record_id)
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validates a scanned or typed identifier as `actor_id`.
    pub async fn validate(&self, raw: &str, actor_id: &str) -> BookingResult<ValidationOutcome> {
        let outcome = self.gateway.validate(raw, actor_id).await?;
        // A validated credential can never validate again.
        self.credentials.retire(&outcome.record_id);
        Ok(outcome)
    }

    // =========================================================================
    // Connectivity & Queue
    // =========================================================================

    /// Records a connectivity report from the platform.
    pub fn set_connectivity(&self, connectivity: Connectivity) -> bool {
        self.connectivity.set(connectivity)
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.current()
    }

    pub async fn queue_status(&self) -> BookingResult<QueueStatus> {
        self.queue.status(self.connectivity.current()).await
    }

    /// Drains the queue now, in the foreground.
    pub async fn drain_queue(&self) -> BookingResult<DrainReport> {
        if !self.connectivity.current().is_online() {
            return Err(BookingError::Connectivity(
                "cannot replay queued bookings while offline".into(),
            ));
        }
        self.queue.drain().await
    }

    pub async fn parked_entries(&self) -> BookingResult<Vec<QueuedAction>> {
        self.queue.parked().await
    }

    pub async fn requeue(&self, entry_id: &str) -> BookingResult<()> {
        self.queue.requeue(entry_id).await
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stops every background task this engine started.
    pub async fn shutdown(&self) {
        info!("Shutting down booking engine");

        let pending = lock(&self.pending_cancel).take();
        if let Some(tx) = pending {
            let _ = tx.send(());
        }

        let (drainer, poller) = {
            let mut background = lock(&self.background);
            (background.drainer.take(), background.poller.take())
        };
        if let Some((handle, task)) = drainer {
            handle.shutdown().await;
            let _ = task.await;
        }
        if let Some((handle, task)) = poller {
            handle.shutdown().await;
            let _ = task.await;
        }

        self.credentials.shutdown();
        info!("Booking engine stopped");
    }
}
