//! End-to-end booking lifecycle against an in-memory SQLite database.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use villagelink_booking::memory::{
    FixedFareService, GatewayScript, InMemoryWallet, RecordingLedger, ScriptedGateway,
    StaticRouteService,
};
use villagelink_booking::{
    BookingConfig, BookingEngine, BookingError, Collaborators, CommitOutcome,
    HmacCredentialIssuer, HmacSigner, WalletService,
};
use villagelink_core::{
    Clock, Connectivity, CredentialPhase, DistanceSubsidy, DraftPatch, FareBreakdown,
    ManualClock, Money, PaymentMethod, Presentation, RecordKind, RecordStatus, SystemClock,
    ValidationAction,
};
use villagelink_db::{Database, DbConfig};

const KEY: &[u8] = b"lifecycle-key";

fn rs(rupees: i64) -> Money {
    Money::from_rupees(rupees)
}

struct Harness {
    engine: Arc<BookingEngine>,
    wallet: Arc<InMemoryWallet>,
    fares: Arc<FixedFareService>,
    ledger: Arc<RecordingLedger>,
}

/// Rampur to Sitapur is 12 km; fares are 20 base + 5 surge per passenger,
/// routes over 10 km get a 5 subsidy and insurance costs 1.
async fn harness(
    wallet: InMemoryWallet,
    gateway: ScriptedGateway,
    clock: Arc<dyn Clock>,
) -> Harness {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();

    let mut config = BookingConfig::new();
    config.credential.signing_key = String::from_utf8(KEY.to_vec()).unwrap();
    config.fares.reward_bps = 0;
    config.fares.add_on_fees.insurance = rs(1);
    config.fares.subsidy = Some(DistanceSubsidy {
        min_distance_m: 10_000,
        amount: rs(5),
        active_hours_utc: None,
    });
    config.queue.initial_backoff_ms = 10;

    let wallet = Arc::new(wallet);
    let fares = Arc::new(FixedFareService::new(FareBreakdown {
        base: rs(20),
        surge: rs(5),
        discount: Money::zero(),
        message: None,
    }));
    let ledger = Arc::new(RecordingLedger::new());
    let collaborators = Collaborators {
        routes: Arc::new(StaticRouteService::new().with_route("Rampur", "Sitapur", 12_000)),
        fares: fares.clone(),
        wallet: wallet.clone(),
        gateway: Arc::new(gateway),
        signer: Arc::new(HmacSigner::new(KEY).unwrap()),
        issuer: Arc::new(HmacCredentialIssuer::new(KEY).unwrap()),
        earnings: ledger.clone(),
    };

    let engine = BookingEngine::new(config, &db, collaborators, clock).unwrap();
    Harness {
        engine: Arc::new(engine),
        wallet,
        fares,
        ledger,
    }
}

async fn default_harness() -> Harness {
    harness(InMemoryWallet::new(), ScriptedGateway::new(), Arc::new(SystemClock)).await
}

fn two_insured(method: PaymentMethod) -> DraftPatch {
    DraftPatch {
        origin: Some("Rampur".into()),
        destination: Some("Sitapur".into()),
        passenger_count: Some(2),
        insurance: Some(true),
        payment_method: Some(method),
        ..Default::default()
    }
}

async fn book(engine: &BookingEngine, method: PaymentMethod) -> CommitOutcome {
    engine.create_draft("passenger-1", RecordKind::Ticket).unwrap();
    engine.update_draft(two_insured(method)).await.unwrap();
    engine.commit().await.unwrap()
}

// =============================================================================
// Pricing & Commit
// =============================================================================

#[tokio::test]
async fn test_worked_example_prices_and_commits_41() {
    let h = default_harness().await;
    h.engine
        .create_draft("passenger-1", RecordKind::Ticket)
        .unwrap();

    let quote = h
        .engine
        .update_draft(two_insured(PaymentMethod::Cash))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(quote.subsidy_amount, rs(5));
    assert_eq!(quote.per_unit_fare(), rs(20));
    assert_eq!(quote.total_fare(), rs(41));

    let outcome = h.engine.commit().await.unwrap();
    let record = outcome.record().unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(record.total_price(), rs(41));
    assert!(record.code.starts_with("TKT-"));
}

#[tokio::test]
async fn test_wallet_shortfall_creates_nothing() {
    let h = harness(
        InMemoryWallet::new().with_balance("passenger-1", rs(30)),
        ScriptedGateway::new(),
        Arc::new(SystemClock),
    )
    .await;
    h.engine
        .create_draft("passenger-1", RecordKind::Ticket)
        .unwrap();
    h.engine
        .update_draft(two_insured(PaymentMethod::WalletCoin))
        .await
        .unwrap();
    let attempt = h.engine.draft().unwrap().attempt_id;

    let err = h.engine.commit().await.unwrap_err();

    assert!(matches!(
        err,
        BookingError::InsufficientFunds { required, available }
            if required == rs(41) && available == rs(30)
    ));
    assert_eq!(h.wallet.balance("passenger-1").await.unwrap(), rs(30));
    assert!(h.engine.record(&attempt.to_string()).await.unwrap().is_none());
    // The draft survives so the passenger can switch to cash.
    assert_eq!(h.engine.draft().unwrap().attempt_id, attempt);
}

#[tokio::test]
async fn test_committed_price_is_frozen() {
    let h = default_harness().await;
    let outcome = book(&h.engine, PaymentMethod::Cash).await;
    let record_id = outcome.record().unwrap().id.clone();

    h.fares.set(FareBreakdown {
        base: rs(100),
        surge: Money::zero(),
        discount: Money::zero(),
        message: Some("Festival surge".into()),
    });
    h.engine
        .update_draft(two_insured(PaymentMethod::Cash))
        .await
        .unwrap();
    assert_eq!(h.engine.quote().unwrap().total_fare(), rs(191));

    let stored = h.engine.record(&record_id).await.unwrap().unwrap();
    assert_eq!(stored.total_price(), rs(41));
}

#[tokio::test]
async fn test_commit_needs_payment_method() {
    let h = default_harness().await;
    h.engine
        .create_draft("passenger-1", RecordKind::Ticket)
        .unwrap();
    h.engine
        .update_draft(DraftPatch {
            origin: Some("Rampur".into()),
            destination: Some("Sitapur".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let err = h.engine.commit().await.unwrap_err();
    assert!(matches!(err, BookingError::Precondition(_)));
    assert!(err.is_draft_side());
}

#[tokio::test]
async fn test_concurrent_commit_is_rejected() {
    let h = harness(
        InMemoryWallet::new(),
        ScriptedGateway::new().then(GatewayScript::Hang),
        Arc::new(SystemClock),
    )
    .await;
    h.engine
        .create_draft("passenger-1", RecordKind::Ticket)
        .unwrap();
    h.engine
        .update_draft(two_insured(PaymentMethod::Online))
        .await
        .unwrap();

    let engine = Arc::clone(&h.engine);
    let first = tokio::spawn(async move { engine.commit().await });

    // Let the first commit reach the gateway.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(
        h.engine.commit().await,
        Err(BookingError::CommitInFlight)
    ));

    // Leaving the flow while the gateway hangs cancels the wait.
    h.engine.abandon();
    let result = tokio::time::timeout(Duration::from_secs(5), first)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(BookingError::Cancelled)));
    assert!(h.engine.draft().unwrap().payment_method.is_none());
}

// =============================================================================
// Offline Queue
// =============================================================================

#[tokio::test]
async fn test_offline_cash_replays_once_across_reconnects() {
    let h = default_harness().await;
    h.engine.start_background();
    h.engine.set_connectivity(Connectivity::Offline);

    let queued = match book(&h.engine, PaymentMethod::Cash).await {
        CommitOutcome::Queued(action) => action,
        other => panic!("expected a queued commit, got {other:?}"),
    };
    assert!(h
        .engine
        .record(&queued.record_id)
        .await
        .unwrap()
        .is_none());

    // Flapping connectivity plus a manual drain all race for the same entry.
    h.engine.set_connectivity(Connectivity::Online);
    h.engine.set_connectivity(Connectivity::Offline);
    h.engine.set_connectivity(Connectivity::Online);
    let manual = h.engine.drain_queue().await.unwrap();
    assert!(manual.replayed <= 1);

    for _ in 0..200 {
        if h.engine.queue_status().await.unwrap().pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let status = h.engine.queue_status().await.unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.parked, 0);

    let record = h
        .engine
        .record(&queued.record_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(record.total_price(), rs(41));

    let again = h.engine.drain_queue().await.unwrap();
    assert_eq!(again.replayed, 0);

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_offline_online_payment_fails_fast() {
    let h = default_harness().await;
    h.engine.set_connectivity(Connectivity::Offline);
    h.engine
        .create_draft("passenger-1", RecordKind::Ticket)
        .unwrap();
    h.engine
        .update_draft(two_insured(PaymentMethod::Online))
        .await
        .unwrap();

    assert!(matches!(
        h.engine.commit().await,
        Err(BookingError::Connectivity(_))
    ));
    assert_eq!(h.engine.queue_status().await.unwrap().pending, 0);
}

// =============================================================================
// Credentials & Validation
// =============================================================================

#[tokio::test]
async fn test_credential_ages_out_and_is_rejected() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let h = harness(InMemoryWallet::new(), ScriptedGateway::new(), clock.clone()).await;
    let outcome = book(&h.engine, PaymentMethod::Cash).await;
    let record_id = outcome.record().unwrap().id.clone();

    let credential = h.engine.get_credential(&record_id).await.unwrap();

    clock.advance(chrono::Duration::seconds(270));
    assert_eq!(
        h.engine.credentials().phase(&record_id),
        Some(CredentialPhase::NearExpiry)
    );
    assert!(matches!(
        h.engine.present_credential(&record_id),
        Some(Presentation::Show { seconds_left: 30, .. })
    ));

    clock.advance(chrono::Duration::seconds(31));
    assert_eq!(
        h.engine.present_credential(&record_id),
        Some(Presentation::ExpiredRefreshing)
    );
    let err = h
        .engine
        .validate(&credential.payload, "conductor-7")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidCredential(_)));
    let stored = h.engine.record(&record_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RecordStatus::Pending);

    // A manual refresh issues a new window that scans fine.
    let fresh = h.engine.refresh_credential(&record_id).await.unwrap();
    assert!(fresh.refreshed);
    let scanned = h
        .engine
        .validate(&fresh.payload, "conductor-7")
        .await
        .unwrap();
    assert_eq!(scanned.action, ValidationAction::CashCollected);
    assert!(h.engine.present_credential(&record_id).is_none());

    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_cash_is_collected_exactly_once() {
    let h = default_harness().await;
    let outcome = book(&h.engine, PaymentMethod::Cash).await;
    let code = outcome.record().unwrap().code.clone();

    let first = h.engine.validate(&code, "conductor-7").await.unwrap();
    assert_eq!(first.action, ValidationAction::CashCollected);
    assert_eq!(first.status, RecordStatus::Paid);

    let err = h.engine.validate(&code, "conductor-8").await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::AlreadyUsed { status: RecordStatus::Paid, .. }
    ));

    for _ in 0..100 {
        if !h.ledger.credits().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.ledger.credits().len(), 1);
    assert_eq!(h.ledger.total_for("conductor-8"), Money::zero());
}

#[tokio::test]
async fn test_prepaid_ticket_boards_once() {
    let h = harness(
        InMemoryWallet::new(),
        ScriptedGateway::new().then(GatewayScript::Approve),
        Arc::new(SystemClock),
    )
    .await;
    let outcome = book(&h.engine, PaymentMethod::Online).await;
    let record = outcome.record().unwrap().clone();
    assert_eq!(record.status, RecordStatus::Paid);

    let credential = h.engine.get_credential(&record.id).await.unwrap();
    let scanned = h
        .engine
        .validate(&credential.payload, "driver-2")
        .await
        .unwrap();
    assert_eq!(scanned.action, ValidationAction::Boarded);

    let err = h
        .engine
        .validate(&record.code, "driver-2")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::AlreadyUsed { status: RecordStatus::Boarded, .. }
    ));
}
