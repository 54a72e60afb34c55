//! # Validation & Settlement Gateway
//!
//! Runs on the conductor's device. Turns a scanned or typed identifier into
//! exactly one status transition on the matching record.
//!
//! ## Decision Table
//! ```text
//! ┌──────────────┬──────────────────┬──────────────────────────────────────┐
//! │ status       │ payment method   │ result                               │
//! ├──────────────┼──────────────────┼──────────────────────────────────────┤
//! │ PENDING      │ cash             │ → PAID, cash collected, earnings     │
//! │ PENDING      │ online / wallet  │ InvalidCredential                    │
//! │ PAID         │ cash             │ AlreadyUsed (cash already collected) │
//! │ PAID         │ online / wallet  │ → BOARDED (ticket), COMPLETED        │
//! │              │                  │   (pass, rental, parcel), earnings   │
//! │ BOARDED      │ any              │ AlreadyUsed                          │
//! │ COMPLETED    │ any              │ AlreadyUsed                          │
//! │ CANCELLED    │ any              │ InvalidCredential                    │
//! │ REJECTED     │ any              │ InvalidCredential                    │
//! └──────────────┴──────────────────┴──────────────────────────────────────┘
//! ```
//!
//! A cash booking is an obligation settled here; a prepaid booking is a
//! payment fact, and validating it only records boarding. The transition is
//! a conditional update, so two scanners racing on one record produce one
//! transition and one `AlreadyUsed`.

use std::sync::Arc;
use tracing::{debug, info, warn};

use villagelink_core::code::normalize_code;
use villagelink_core::validation::validate_actor_id;
use villagelink_core::{
    Bps, Clock, CommittedRecord, Money, PaymentMethod, RecordStatus, ValidationAction,
    ValidationOutcome,
};
use villagelink_db::StatusChange;

use crate::error::{BookingError, BookingResult};
use crate::services::{CredentialIssuer, EarningsLedger};
use crate::signing::is_credential_payload;
use crate::store::RecordStore;

/// Validates credentials and settles cash on the conductor's side.
pub struct ValidationGateway {
    store: Arc<dyn RecordStore>,
    issuer: Arc<dyn CredentialIssuer>,
    earnings: Arc<dyn EarningsLedger>,
    clock: Arc<dyn Clock>,
    platform_fee: Bps,
    allow_manual_entry: bool,
}

impl ValidationGateway {
    pub fn new(
        store: Arc<dyn RecordStore>,
        issuer: Arc<dyn CredentialIssuer>,
        earnings: Arc<dyn EarningsLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ValidationGateway {
            store,
            issuer,
            earnings,
            clock,
            platform_fee: Bps::zero(),
            allow_manual_entry: true,
        }
    }

    /// Share of each validated fare kept by the platform.
    pub fn with_platform_fee(mut self, fee: Bps) -> Self {
        self.platform_fee = fee;
        self
    }

    /// Whether hand-typed codes are accepted in place of a signed payload.
    pub fn with_manual_entry(mut self, allow: bool) -> Self {
        self.allow_manual_entry = allow;
        self
    }

    /// Validates `raw` on behalf of `actor_id`.
    ///
    /// ## Errors
    /// - `InvalidCredential`: unreadable, tampered, expired or unknown input,
    ///   or a record that can never be validated
    /// - `AlreadyUsed`: the record was already consumed
    pub async fn validate(&self, raw: &str, actor_id: &str) -> BookingResult<ValidationOutcome> {
        validate_actor_id("validating actor", actor_id)?;
        let actor_id = actor_id.trim();

        let code = self.resolve_code(raw)?;
        let record = self
            .store
            .find_by_code(&code)
            .await?
            .ok_or_else(|| BookingError::InvalidCredential(format!("no record for {code}")))?;

        let (next, action) = decide(&record)?;
        record.status.transition(next, record.kind, &record.code)?;

        let now = self.clock.now();
        let change = match action {
            ValidationAction::CashCollected => {
                StatusChange::to(next, now).cash_collected_by(actor_id)
            }
            ValidationAction::Boarded | ValidationAction::Completed => StatusChange::to(next, now),
        }
        .validated_by(actor_id);

        if !self
            .store
            .transition(&record.id, record.status, &change)
            .await?
        {
            // Someone else moved the record first.
            let status = self
                .store
                .find_by_id(&record.id)
                .await?
                .map(|r| r.status)
                .unwrap_or(record.status);
            warn!(code = %record.code, %status, "Concurrent validation lost the race");
            return Err(BookingError::AlreadyUsed {
                code: record.code,
                status,
            });
        }

        let earnings = record.total_price().less_portion(self.platform_fee);
        info!(
            code = %record.code,
            actor = %actor_id,
            from = %record.status,
            to = %next,
            ?action,
            %earnings,
            "Record validated"
        );
        self.credit_earnings(actor_id, earnings, &record);

        let total_price = record.total_price();
        Ok(ValidationOutcome {
            record_id: record.id,
            code: record.code,
            kind: record.kind,
            payment_method: record.payment_method,
            action,
            previous_status: record.status,
            status: next,
            passenger_count: record.passenger_count,
            total_price,
            earnings,
        })
    }

    /// Extracts the canonical code from a signed payload or a typed code.
    fn resolve_code(&self, raw: &str) -> BookingResult<String> {
        if is_credential_payload(raw) {
            let verified = self.issuer.verify(raw)?;
            if self.clock.now() >= verified.expires_at {
                debug!(code = %verified.code, "Expired credential presented");
                return Err(BookingError::InvalidCredential(format!(
                    "credential for {} has expired",
                    verified.code
                )));
            }
            return Ok(verified.code);
        }

        if !self.allow_manual_entry {
            return Err(BookingError::InvalidCredential(
                "manual code entry is disabled".into(),
            ));
        }
        normalize_code(raw)
            .map(|(_, code)| code)
            .map_err(|e| BookingError::InvalidCredential(e.to_string()))
    }

    fn credit_earnings(&self, actor_id: &str, amount: Money, record: &CommittedRecord) {
        if !amount.is_positive() {
            return;
        }
        let earnings = Arc::clone(&self.earnings);
        let actor_id = actor_id.to_string();
        let record = record.clone();
        tokio::spawn(async move {
            if let Err(e) = earnings.credit_earnings(&actor_id, amount, &record).await {
                warn!(?e, actor = %actor_id, code = %record.code, %amount, "Earnings credit failed");
            }
        });
    }
}

/// Where a validation takes the record, or why it cannot.
fn decide(record: &CommittedRecord) -> BookingResult<(RecordStatus, ValidationAction)> {
    let used = || BookingError::AlreadyUsed {
        code: record.code.clone(),
        status: record.status,
    };

    match (record.status, record.payment_method) {
        (RecordStatus::Pending, PaymentMethod::Cash) => {
            Ok((RecordStatus::Paid, ValidationAction::CashCollected))
        }
        (RecordStatus::Pending, method) => Err(BookingError::InvalidCredential(format!(
            "{} payment for {} never completed",
            method, record.code
        ))),
        (RecordStatus::Paid, PaymentMethod::Cash) => Err(used()),
        (RecordStatus::Paid, _) if record.kind.can_board() => {
            Ok((RecordStatus::Boarded, ValidationAction::Boarded))
        }
        (RecordStatus::Paid, _) => Ok((RecordStatus::Completed, ValidationAction::Completed)),
        (RecordStatus::Boarded | RecordStatus::Completed, _) => Err(used()),
        (RecordStatus::Cancelled | RecordStatus::Rejected, _) => Err(
            BookingError::InvalidCredential(format!("{} is {}", record.code, record.status)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::RecordingLedger;
    use crate::signing::HmacCredentialIssuer;
    use crate::testkit::{record, TEST_KEY};
    use chrono::{Duration, Utc};
    use std::time::Duration as StdDuration;
    use villagelink_core::{ManualClock, RecordKind};
    use villagelink_db::{Database, DbConfig, RecordRepository};

    struct Fixture {
        gateway: ValidationGateway,
        records: RecordRepository,
        ledger: Arc<RecordingLedger>,
        issuer: HmacCredentialIssuer,
        clock: Arc<ManualClock>,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = Arc::new(RecordingLedger::new());
        let issuer = HmacCredentialIssuer::new(TEST_KEY).unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gateway = ValidationGateway::new(
            Arc::new(db.records()),
            Arc::new(issuer.clone()),
            ledger.clone(),
            clock.clone(),
        )
        .with_platform_fee(Bps::new(1000));

        Fixture {
            gateway,
            records: db.records(),
            ledger,
            issuer,
            clock,
        }
    }

    async fn stored(f: &Fixture, status: RecordStatus, kind: RecordKind, method: PaymentMethod) -> CommittedRecord {
        let r = record(status, kind, method);
        f.records.insert(&r).await.unwrap();
        r
    }

    async fn wait_for_credits(ledger: &RecordingLedger, count: usize) {
        for _ in 0..50 {
            if ledger.credits().len() >= count {
                return;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_cash_pending_settles_once() {
        let f = fixture().await;
        let r = stored(&f, RecordStatus::Pending, RecordKind::Ticket, PaymentMethod::Cash).await;

        let outcome = f.gateway.validate(&r.code, "conductor-7").await.unwrap();
        assert_eq!(outcome.action, ValidationAction::CashCollected);
        assert_eq!(outcome.status, RecordStatus::Paid);
        assert_eq!(outcome.earnings, Money::from_rupees(90));
        assert_eq!(outcome.record_id, r.id);
        assert_eq!(outcome.code, r.code);
        assert_eq!(outcome.total_price, r.total_price());

        let after = f.records.get_by_id(&r.id).await.unwrap();
        assert_eq!(after.status, RecordStatus::Paid);
        assert_eq!(after.cash_collected_by.as_deref(), Some("conductor-7"));
        assert!(after.cash_collected_at.is_some());

        let err = f.gateway.validate(&r.code, "conductor-7").await.unwrap_err();
        assert!(matches!(
            err,
            BookingError::AlreadyUsed {
                status: RecordStatus::Paid,
                ..
            }
        ));

        wait_for_credits(&f.ledger, 1).await;
        assert_eq!(f.ledger.total_for("conductor-7"), Money::from_rupees(90));
    }

    #[tokio::test]
    async fn test_prepaid_ticket_boards_once() {
        let f = fixture().await;
        let r = stored(&f, RecordStatus::Paid, RecordKind::Ticket, PaymentMethod::Online).await;

        let outcome = f.gateway.validate(&r.code, "driver-1").await.unwrap();
        assert_eq!(outcome.action, ValidationAction::Boarded);
        assert_eq!(outcome.previous_status, RecordStatus::Paid);

        let after = f.records.get_by_id(&r.id).await.unwrap();
        assert_eq!(after.status, RecordStatus::Boarded);
        assert!(after.cash_collected_by.is_none());
        assert_eq!(after.validated_by.as_deref(), Some("driver-1"));

        assert!(matches!(
            f.gateway.validate(&r.code, "driver-1").await,
            Err(BookingError::AlreadyUsed { .. })
        ));
    }

    #[tokio::test]
    async fn test_prepaid_pass_completes() {
        let f = fixture().await;
        let r = stored(&f, RecordStatus::Paid, RecordKind::Pass, PaymentMethod::WalletCoin).await;

        let outcome = f.gateway.validate(&r.code, "driver-1").await.unwrap();
        assert_eq!(outcome.action, ValidationAction::Completed);
        assert_eq!(outcome.status, RecordStatus::Completed);
    }

    #[tokio::test]
    async fn test_unusable_records_are_invalid() {
        let f = fixture().await;
        let cancelled = stored(&f, RecordStatus::Cancelled, RecordKind::Ticket, PaymentMethod::Cash).await;
        let unpaid = stored(&f, RecordStatus::Pending, RecordKind::Ticket, PaymentMethod::Online).await;

        for code in [&cancelled.code, &unpaid.code, &"TKT-0000000000".to_string()] {
            assert!(matches!(
                f.gateway.validate(code, "driver-1").await,
                Err(BookingError::InvalidCredential(_))
            ));
        }
        assert!(matches!(
            f.gateway.validate("hello", "driver-1").await,
            Err(BookingError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_noisy_manual_entry_is_normalized() {
        let f = fixture().await;
        let r = stored(&f, RecordStatus::Pending, RecordKind::Ticket, PaymentMethod::Cash).await;
        let digits = r.code.trim_start_matches("TKT-");
        let noisy = format!(" tkt {} ", digits);

        let outcome = f.gateway.validate(&noisy, "conductor-7").await.unwrap();
        assert_eq!(outcome.code, r.code);
    }

    #[tokio::test]
    async fn test_signed_payload_checked_against_clock() {
        let f = fixture().await;
        let r = stored(&f, RecordStatus::Paid, RecordKind::Ticket, PaymentMethod::Online).await;
        let payload = f.issuer.payload_for(&r.code, f.clock.now() + Duration::seconds(300));

        f.clock.advance(Duration::seconds(301));
        assert!(matches!(
            f.gateway.validate(&payload, "driver-1").await,
            Err(BookingError::InvalidCredential(_))
        ));
        assert_eq!(f.records.get_by_id(&r.id).await.unwrap().status, RecordStatus::Paid);

        let fresh = f.issuer.payload_for(&r.code, f.clock.now() + Duration::seconds(300));
        let outcome = f.gateway.validate(&fresh, "driver-1").await.unwrap();
        assert_eq!(outcome.status, RecordStatus::Boarded);
    }

    #[tokio::test]
    async fn test_manual_entry_can_be_disabled() {
        let f = fixture().await;
        let gateway = f.gateway.with_manual_entry(false);
        let r = stored_in(&f.records, RecordStatus::Pending).await;

        assert!(matches!(
            gateway.validate(&r.code, "conductor-7").await,
            Err(BookingError::InvalidCredential(_))
        ));
    }

    async fn stored_in(records: &RecordRepository, status: RecordStatus) -> CommittedRecord {
        let r = record(status, RecordKind::Ticket, PaymentMethod::Cash);
        records.insert(&r).await.unwrap();
        r
    }

    #[tokio::test]
    async fn test_actor_id_is_required() {
        let f = fixture().await;
        let r = stored(&f, RecordStatus::Pending, RecordKind::Ticket, PaymentMethod::Cash).await;

        assert!(matches!(
            f.gateway.validate(&r.code, "  ").await,
            Err(BookingError::Validation(_))
        ));
    }
}
