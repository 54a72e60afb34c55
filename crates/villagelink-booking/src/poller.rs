//! # Read-Model Poller
//!
//! Periodically refreshes what the passenger's home screen shows: active
//! bookings and the wallet balance. It only ever overwrites a cache, so a
//! lost or duplicated poll is harmless. It never writes records.
//!
//! Records that went terminal since the last poll (completed elsewhere,
//! cancelled by the operator) have their credentials retired here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use villagelink_core::{Clock, CommittedRecord, Money};

use crate::credential::CredentialService;
use crate::error::BookingResult;
use crate::services::WalletService;
use crate::store::RecordStore;

/// Cached read side for one owner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadModel {
    pub active: Vec<CommittedRecord>,
    /// `None` until the wallet has answered at least once.
    pub wallet_balance: Option<Money>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Shared handle to the cached read model.
pub type SharedReadModel = Arc<RwLock<ReadModel>>;

/// Handle for stopping a running [`ReadModelPoller`].
#[derive(Debug, Clone)]
pub struct ReadModelPollerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ReadModelPollerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Polls the store and the wallet for one owner.
pub struct ReadModelPoller {
    owner_id: String,
    store: Arc<dyn RecordStore>,
    wallet: Arc<dyn WalletService>,
    credentials: Arc<CredentialService>,
    cache: SharedReadModel,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ReadModelPoller {
    pub fn new(
        owner_id: impl Into<String>,
        store: Arc<dyn RecordStore>,
        wallet: Arc<dyn WalletService>,
        credentials: Arc<CredentialService>,
        cache: SharedReadModel,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> (Self, ReadModelPollerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let poller = ReadModelPoller {
            owner_id: owner_id.into(),
            store,
            wallet,
            credentials,
            cache,
            clock,
            interval,
            shutdown_rx,
        };
        (poller, ReadModelPollerHandle { shutdown_tx })
    }

    /// Runs the polling loop.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(owner_id = %self.owner_id, "Read-model poller starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(?e, "Failed to refresh read model");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Read-model poller shutting down");
                    break;
                }
            }
        }

        info!("Read-model poller stopped");
    }

    /// One refresh. Safe to call any number of times.
    pub async fn poll_once(&self) -> BookingResult<ReadModel> {
        let active = self.store.list_active_for_owner(&self.owner_id).await?;

        let wallet_balance = match self.wallet.balance(&self.owner_id).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!(?e, owner_id = %self.owner_id, "Wallet balance unavailable");
                self.cache.read().await.wallet_balance
            }
        };

        self.retire_finished(&active).await?;

        let model = ReadModel {
            active,
            wallet_balance,
            refreshed_at: Some(self.clock.now()),
        };
        *self.cache.write().await = model.clone();

        debug!(active = model.active.len(), "Read model refreshed");
        Ok(model)
    }

    /// Retires credentials of tracked records that are no longer active.
    async fn retire_finished(&self, active: &[CommittedRecord]) -> BookingResult<()> {
        let live: HashSet<&str> = active.iter().map(|r| r.id.as_str()).collect();

        for record_id in self.credentials.tracked_ids() {
            if live.contains(record_id.as_str()) {
                continue;
            }
            // Tracked records may belong to another owner; only a terminal
            // status retires them.
            if let Some(record) = self.store.find_by_id(&record_id).await? {
                if record.is_terminal() {
                    self.credentials.retire(&record_id);
                }
            }
        }
        Ok(())
    }
}
