//! # In-Memory Collaborators
//!
//! Process-local implementations of the collaborator traits, used by the demo
//! binary and by tests. They keep everything in `Mutex`-guarded maps and
//! record what was asked of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use villagelink_core::{CommittedRecord, FareBreakdown, Money, RouteSummary};

use crate::error::{BookingError, BookingResult};
use crate::services::{
    ChargeOutcome, EarningsLedger, FareService, PaymentGateway, RouteService, WalletReceipt,
    WalletService,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Routes & Fares
// =============================================================================

/// Routes from a fixed table. Lookups work in both directions.
#[derive(Debug, Default)]
pub struct StaticRouteService {
    routes: HashMap<(String, String), u32>,
}

impl StaticRouteService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, origin: &str, destination: &str, distance_m: u32) -> Self {
        self.routes
            .insert((origin.to_string(), destination.to_string()), distance_m);
        self
    }
}

#[async_trait]
impl RouteService for StaticRouteService {
    async fn compute_route(&self, origin: &str, destination: &str) -> BookingResult<RouteSummary> {
        let forward = (origin.to_string(), destination.to_string());
        let backward = (destination.to_string(), origin.to_string());
        self.routes
            .get(&forward)
            .or_else(|| self.routes.get(&backward))
            .map(|d| RouteSummary::with_distance(*d))
            .ok_or_else(|| {
                BookingError::RouteUnavailable(format!("no route from {origin} to {destination}"))
            })
    }
}

/// Quotes the same breakdown for every route.
#[derive(Debug)]
pub struct FixedFareService {
    breakdown: Mutex<FareBreakdown>,
}

impl FixedFareService {
    pub fn new(breakdown: FareBreakdown) -> Self {
        FixedFareService {
            breakdown: Mutex::new(breakdown),
        }
    }

    /// Changes future quotes. Committed records are unaffected.
    pub fn set(&self, breakdown: FareBreakdown) {
        *lock(&self.breakdown) = breakdown;
    }
}

#[async_trait]
impl FareService for FixedFareService {
    async fn base_fare(&self, _distance_m: u32, _at: DateTime<Utc>) -> BookingResult<FareBreakdown> {
        Ok(lock(&self.breakdown).clone())
    }
}

// =============================================================================
// Wallet
// =============================================================================

/// A wallet that holds balances in memory.
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    balances: Mutex<HashMap<String, Money>>,
    credits: Mutex<Vec<(String, Money, String)>>,
    next_txn: AtomicU64,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, owner_id: &str, amount: Money) -> Self {
        lock(&self.balances).insert(owner_id.to_string(), amount);
        self
    }

    /// Every credit so far: (owner, amount, reason).
    pub fn credits(&self) -> Vec<(String, Money, String)> {
        lock(&self.credits).clone()
    }

    fn txn_id(&self) -> String {
        format!("wal-{:06}", self.next_txn.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl WalletService for InMemoryWallet {
    async fn debit(&self, owner_id: &str, amount: Money, _reason: &str) -> BookingResult<WalletReceipt> {
        let mut balances = lock(&self.balances);
        let balance = balances.entry(owner_id.to_string()).or_default();
        if *balance < amount {
            return Err(BookingError::InsufficientFunds {
                required: amount,
                available: *balance,
            });
        }
        *balance -= amount;
        Ok(WalletReceipt {
            transaction_id: self.txn_id(),
            new_balance: *balance,
        })
    }

    async fn credit(&self, owner_id: &str, amount: Money, reason: &str) -> BookingResult<()> {
        *lock(&self.balances).entry(owner_id.to_string()).or_default() += amount;
        lock(&self.credits).push((owner_id.to_string(), amount, reason.to_string()));
        Ok(())
    }

    async fn balance(&self, owner_id: &str) -> BookingResult<Money> {
        Ok(lock(&self.balances)
            .get(owner_id)
            .copied()
            .unwrap_or_default())
    }
}

// =============================================================================
// Payment Gateway
// =============================================================================

/// One scripted gateway response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayScript {
    Approve,
    Decline(String),
    /// Never answers; the result must come through the callback.
    Hang,
    /// The gateway itself is unreachable.
    Fail(String),
}

/// A gateway that replays scripted responses, approving once the script
/// runs out.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<GatewayScript>>,
    charges: Mutex<Vec<(Uuid, Money)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, step: GatewayScript) -> Self {
        lock(&self.script).push_back(step);
        self
    }

    /// Every charge request so far.
    pub fn charges(&self) -> Vec<(Uuid, Money)> {
        lock(&self.charges).clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, order_id: Uuid, amount: Money) -> BookingResult<ChargeOutcome> {
        lock(&self.charges).push((order_id, amount));
        let step = lock(&self.script)
            .pop_front()
            .unwrap_or(GatewayScript::Approve);

        match step {
            GatewayScript::Approve => Ok(ChargeOutcome::Success {
                transaction_id: format!("pg-{}", order_id.simple()),
            }),
            GatewayScript::Decline(reason) => Ok(ChargeOutcome::Failure { reason }),
            GatewayScript::Fail(reason) => Err(BookingError::Collaborator(reason)),
            GatewayScript::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// Earnings Ledger
// =============================================================================

/// One earnings credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarningsCredit {
    pub actor_id: String,
    pub amount: Money,
    pub record_code: String,
}

/// Records earnings credits instead of paying them out.
#[derive(Debug, Default)]
pub struct RecordingLedger {
    credits: Mutex<Vec<EarningsCredit>>,
}

impl RecordingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credits(&self) -> Vec<EarningsCredit> {
        lock(&self.credits).clone()
    }

    pub fn total_for(&self, actor_id: &str) -> Money {
        lock(&self.credits)
            .iter()
            .filter(|c| c.actor_id == actor_id)
            .map(|c| c.amount)
            .sum()
    }
}

#[async_trait]
impl EarningsLedger for RecordingLedger {
    async fn credit_earnings(
        &self,
        actor_id: &str,
        amount: Money,
        record: &CommittedRecord,
    ) -> BookingResult<()> {
        lock(&self.credits).push(EarningsCredit {
            actor_id: actor_id.to_string(),
            amount,
            record_code: record.code.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wallet_debit_is_all_or_nothing() {
        let wallet = InMemoryWallet::new().with_balance("p1", Money::from_rupees(30));

        let err = wallet
            .debit("p1", Money::from_rupees(41), "booking")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InsufficientFunds { .. }));
        assert_eq!(wallet.balance("p1").await.unwrap(), Money::from_rupees(30));

        let receipt = wallet.debit("p1", Money::from_rupees(25), "booking").await.unwrap();
        assert_eq!(receipt.new_balance, Money::from_rupees(5));
    }

    #[tokio::test]
    async fn test_routes_are_symmetric() {
        let routes = StaticRouteService::new().with_route("Rampur", "Sitapur", 12_000);
        assert_eq!(
            routes.compute_route("Sitapur", "Rampur").await.unwrap().distance_m,
            12_000
        );
        assert!(matches!(
            routes.compute_route("Rampur", "Mars").await,
            Err(BookingError::RouteUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_gateway_follows_script() {
        let gateway = ScriptedGateway::new().then(GatewayScript::Decline("card".into()));
        let id = Uuid::new_v4();
        assert!(matches!(
            gateway.charge(id, Money::from_rupees(1)).await.unwrap(),
            ChargeOutcome::Failure { .. }
        ));
        assert!(matches!(
            gateway.charge(id, Money::from_rupees(1)).await.unwrap(),
            ChargeOutcome::Success { .. }
        ));
        assert_eq!(gateway.charges().len(), 2);
    }
}
