//! Shared fixtures for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use villagelink_core::code::code_for;
use villagelink_core::{
    AddOns, CommitPayload, CommittedRecord, FareBreakdown, Money, PaymentMethod, RecordKind,
    RecordStatus,
};
use villagelink_db::{DbError, StatusChange};

use crate::error::{BookingError, BookingResult};
use crate::memory::{
    FixedFareService, InMemoryWallet, RecordingLedger, ScriptedGateway, StaticRouteService,
};
use crate::services::Collaborators;
use crate::signing::{HmacCredentialIssuer, HmacSigner};
use crate::store::RecordStore;

pub const TEST_KEY: &[u8] = b"test-key";

pub fn collaborators() -> Collaborators {
    Collaborators {
        routes: Arc::new(StaticRouteService::new().with_route("Rampur", "Sitapur", 12_000)),
        fares: Arc::new(FixedFareService::new(FareBreakdown {
            base: Money::from_rupees(20),
            surge: Money::from_rupees(5),
            discount: Money::zero(),
            message: None,
        })),
        wallet: Arc::new(InMemoryWallet::new()),
        gateway: Arc::new(ScriptedGateway::new()),
        signer: Arc::new(HmacSigner::new(TEST_KEY).unwrap()),
        issuer: Arc::new(HmacCredentialIssuer::new(TEST_KEY).unwrap()),
        earnings: Arc::new(RecordingLedger::new()),
    }
}

pub fn payload(kind: RecordKind, method: PaymentMethod, total: Money) -> CommitPayload {
    let record_id = Uuid::new_v4();
    CommitPayload {
        record_id,
        code: code_for(kind, record_id),
        kind,
        owner_id: "passenger-1".to_string(),
        origin: "Rampur".to_string(),
        destination: "Sitapur".to_string(),
        distance_m: 12_000,
        passenger_count: 2,
        add_ons: AddOns::default(),
        gift_recipient: None,
        payment_method: method,
        total_price: total,
        quoted_at: DateTime::<Utc>::default(),
    }
}

pub fn cash_ticket() -> CommitPayload {
    payload(RecordKind::Ticket, PaymentMethod::Cash, Money::from_rupees(41))
}

pub fn record(status: RecordStatus, kind: RecordKind, method: PaymentMethod) -> CommittedRecord {
    payload(kind, method, Money::from_rupees(100)).into_record(status, None, Utc::now())
}

/// A store whose writes always fail with a transient error.
#[derive(Debug, Default)]
pub struct UnavailableStore {
    pub inserts: AtomicUsize,
}

#[async_trait]
impl RecordStore for UnavailableStore {
    async fn insert(&self, _record: &CommittedRecord) -> BookingResult<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Err(BookingError::Storage(DbError::PoolExhausted))
    }

    async fn find_by_id(&self, _id: &str) -> BookingResult<Option<CommittedRecord>> {
        Ok(None)
    }

    async fn find_by_code(&self, _code: &str) -> BookingResult<Option<CommittedRecord>> {
        Ok(None)
    }

    async fn transition(
        &self,
        _id: &str,
        _expected: RecordStatus,
        _change: &StatusChange,
    ) -> BookingResult<bool> {
        Err(BookingError::Storage(DbError::PoolExhausted))
    }

    async fn list_active_for_owner(&self, _owner_id: &str) -> BookingResult<Vec<CommittedRecord>> {
        Ok(Vec::new())
    }
}
