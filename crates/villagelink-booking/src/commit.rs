//! # Commit Engine
//!
//! The only code path that writes committed records.
//!
//! ## Order of Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CASH         insert PENDING                                           │
//! │                                                                         │
//! │  WALLET_COIN  wallet.debit ──► insert PAID ──► reward coins            │
//! │                    │              │                                     │
//! │                    │              └─ insert failed: refund the debit    │
//! │                    └─ InsufficientFunds: stop, nothing written          │
//! │                                                                         │
//! │  ONLINE       reserve(order_id) ──► gateway.charge ──► claim ──► insert │
//! │                    │                    │                  PAID         │
//! │                    │                    ├─ declined: release            │
//! │                    │                    ├─ timed out: PaymentPending,   │
//! │                    │                    │  callback may still claim     │
//! │                    │                    └─ cancelled: release           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every record is written under the id its payload was frozen with. The
//! store rejects a second write of the same id, so a replay or a retry can
//! never produce two records for one attempt.
//!
//! An online order is refused before charging when its code is already
//! taken, and a retry of an order still awaiting the gateway is answered with
//! `PaymentPending` instead of a second charge. A captured charge whose record
//! still cannot be written is refunded to the payer's wallet.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use villagelink_core::{Bps, Clock, CommitPayload, CommittedRecord, RecordStatus};

use crate::error::{BookingError, BookingResult};
use crate::reservation::ReservationBook;
use crate::services::{ChargeOutcome, Collaborators, PayloadSigner, PaymentGateway, WalletService};
use crate::store::RecordStore;

/// Hex characters of the record signature kept in a settlement reference.
const SIGNATURE_PREFIX_LEN: usize = 12;

const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Turns frozen payloads into committed records.
pub struct CommitEngine {
    store: Arc<dyn RecordStore>,
    wallet: Arc<dyn WalletService>,
    gateway: Arc<dyn PaymentGateway>,
    signer: Arc<dyn PayloadSigner>,
    reservations: Arc<ReservationBook>,
    clock: Arc<dyn Clock>,
    reward_rate: Bps,
    gateway_timeout: Duration,
}

impl CommitEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        collaborators: &Collaborators,
        reservations: Arc<ReservationBook>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CommitEngine {
            store,
            wallet: Arc::clone(&collaborators.wallet),
            gateway: Arc::clone(&collaborators.gateway),
            signer: Arc::clone(&collaborators.signer),
            reservations,
            clock,
            reward_rate: Bps::zero(),
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Share of each paid booking returned to the owner as reward coins.
    pub fn with_reward_rate(mut self, rate: Bps) -> Self {
        self.reward_rate = rate;
        self
    }

    /// How long a foreground commit waits for the gateway.
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn reservations(&self) -> &ReservationBook {
        &self.reservations
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // =========================================================================
    // Cash
    // =========================================================================

    /// Commits a cash booking as `Pending`. Also used for offline replay.
    pub async fn commit_cash(&self, payload: CommitPayload) -> BookingResult<CommittedRecord> {
        let record = payload.into_record(RecordStatus::Pending, None, self.clock.now());
        self.store.insert(&record).await?;

        info!(
            record_id = %record.id,
            code = %record.code,
            total = %record.total_price(),
            "Committed cash booking"
        );
        Ok(record)
    }

    // =========================================================================
    // Wallet
    // =========================================================================

    /// Debits the wallet, then commits `Paid`.
    ///
    /// ## Errors
    /// `InsufficientFunds` before anything is written. If the write fails
    /// after the debit, the debit is refunded and the write error returned.
    pub async fn commit_wallet(&self, payload: CommitPayload) -> BookingResult<CommittedRecord> {
        let owner_id = payload.owner_id.clone();
        let amount = payload.total_price;

        let receipt = self
            .wallet
            .debit(&owner_id, amount, &format!("booking {}", payload.code))
            .await?;
        debug!(
            owner_id = %owner_id,
            txn = %receipt.transaction_id,
            balance = %receipt.new_balance,
            "Wallet debited"
        );

        let record = self.settle(payload, &receipt.transaction_id);
        if let Err(e) = self.store.insert(&record).await {
            error!(?e, record_id = %record.id, "Commit failed after wallet debit, refunding");
            if let Err(refund) = self
                .wallet
                .credit(&owner_id, amount, &format!("refund {}", record.code))
                .await
            {
                error!(?refund, owner_id = %owner_id, %amount, "Wallet refund failed");
            }
            return Err(e);
        }

        info!(
            record_id = %record.id,
            code = %record.code,
            total = %record.total_price(),
            "Committed wallet booking"
        );
        self.issue_reward(&record);
        Ok(record)
    }

    // =========================================================================
    // Online
    // =========================================================================

    /// Reserves the order, charges the gateway and commits `Paid` on success.
    ///
    /// A value sent on `cancel` abandons the wait and releases the
    /// reservation. Dropping the sender does not cancel.
    pub async fn commit_online(
        &self,
        payload: CommitPayload,
        mut cancel: oneshot::Receiver<()>,
    ) -> BookingResult<CommittedRecord> {
        if self.reservations.contains(payload.record_id) {
            debug!(order_id = %payload.record_id, "Order already charging, awaiting callback");
            return Err(BookingError::PaymentPending {
                order_id: payload.record_id,
            });
        }
        if let Some(existing) = self.store.find_by_code(&payload.code).await? {
            if existing.id == payload.record_id.to_string() {
                debug!(order_id = %payload.record_id, "Order already committed");
                return Ok(existing);
            }
            warn!(code = %payload.code, "Booking code already taken, not charging");
            return Err(BookingError::CommitConflict {
                record_id: payload.record_id.to_string(),
            });
        }

        let reservation = self.reservations.reserve(payload);
        let order_id = reservation.order_id;
        let amount = reservation.payload.total_price;
        info!(%order_id, %amount, "Charging online payment");

        let charge = tokio::time::timeout(self.gateway_timeout, self.gateway.charge(order_id, amount));

        tokio::select! {
            result = charge => match result {
                Ok(Ok(outcome)) => self.apply_charge_outcome(order_id, outcome).await,
                Ok(Err(e)) => {
                    // The gateway may still have taken the charge; keep the
                    // reservation so its callback can land.
                    warn!(?e, %order_id, "Payment gateway call failed");
                    Err(e)
                }
                Err(_) => {
                    warn!(%order_id, timeout = ?self.gateway_timeout, "Payment gateway timed out");
                    Err(BookingError::PaymentPending { order_id })
                }
            },
            Ok(()) = &mut cancel => {
                self.reservations.release(order_id);
                info!(%order_id, "Online payment abandoned");
                Err(BookingError::Cancelled)
            }
        }
    }

    /// Applies an out-of-band gateway result.
    ///
    /// A success for an order that was already committed returns the
    /// existing record; nothing is written twice.
    pub async fn handle_gateway_callback(
        &self,
        order_id: Uuid,
        outcome: ChargeOutcome,
    ) -> BookingResult<CommittedRecord> {
        debug!(%order_id, ?outcome, "Gateway callback received");
        self.apply_charge_outcome(order_id, outcome).await
    }

    async fn apply_charge_outcome(
        &self,
        order_id: Uuid,
        outcome: ChargeOutcome,
    ) -> BookingResult<CommittedRecord> {
        match outcome {
            ChargeOutcome::Success { transaction_id } => {
                self.finalize_online(order_id, &transaction_id).await
            }
            ChargeOutcome::Failure { reason } => {
                self.reservations.release(order_id);
                info!(%order_id, %reason, "Online payment declined");
                Err(BookingError::PaymentDeclined(reason))
            }
        }
    }

    async fn finalize_online(
        &self,
        order_id: Uuid,
        transaction_id: &str,
    ) -> BookingResult<CommittedRecord> {
        let Some(reservation) = self.reservations.claim(order_id) else {
            if let Some(existing) = self.store.find_by_id(&order_id.to_string()).await? {
                debug!(%order_id, "Order already committed");
                return Ok(existing);
            }
            error!(%order_id, txn = %transaction_id, "Payment succeeded for an unknown or expired order");
            return Err(BookingError::Precondition(format!(
                "no pending reservation for order {order_id}"
            )));
        };

        let payload = reservation.payload.clone();
        let record = self.settle(reservation.payload, transaction_id);
        if let Err(e) = self.store.insert(&record).await {
            error!(?e, %order_id, txn = %transaction_id, "Commit failed after online payment");
            if e.is_retryable() {
                self.reservations.reserve(payload);
            } else if let Err(refund) = self.refund_charge(&payload, transaction_id).await {
                error!(?refund, %order_id, txn = %transaction_id, "Refund failed, keeping reservation");
                self.reservations.reserve(payload);
            }
            return Err(e);
        }

        info!(
            record_id = %record.id,
            code = %record.code,
            total = %record.total_price(),
            "Committed online booking"
        );
        self.issue_reward(&record);
        Ok(record)
    }

    /// Returns a captured charge whose record can never be written, as wallet
    /// coins to the payer.
    async fn refund_charge(&self, payload: &CommitPayload, transaction_id: &str) -> BookingResult<()> {
        self.wallet
            .credit(
                &payload.owner_id,
                payload.total_price,
                &format!("refund {} ({transaction_id})", payload.code),
            )
            .await?;
        warn!(
            owner_id = %payload.owner_id,
            amount = %payload.total_price,
            txn = %transaction_id,
            "Online charge refunded to wallet"
        );
        Ok(())
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    /// Builds a `Paid` record whose reference binds the ledger transaction
    /// to a signature over the frozen fields.
    fn settle(&self, payload: CommitPayload, transaction_id: &str) -> CommittedRecord {
        let mut record = payload.into_record(RecordStatus::Paid, None, self.clock.now());
        let signature = self.signer.sign(&record);
        let prefix = signature.get(..SIGNATURE_PREFIX_LEN).unwrap_or(&signature);
        record.settlement_reference = Some(format!("{transaction_id}.{prefix}"));
        record
    }

    /// Credits reward coins in the background. Failure never touches the
    /// committed record.
    fn issue_reward(&self, record: &CommittedRecord) {
        let reward = record.total_price().portion(self.reward_rate);
        if !reward.is_positive() {
            return;
        }

        let wallet = Arc::clone(&self.wallet);
        let owner_id = record.owner_id.clone();
        let reason = format!("reward {}", record.code);
        tokio::spawn(async move {
            match wallet.credit(&owner_id, reward, &reason).await {
                Ok(()) => debug!(owner_id = %owner_id, %reward, "Reward coins credited"),
                Err(e) => warn!(?e, owner_id = %owner_id, %reward, "Reward coin credit failed"),
            }
        });
    }
}
