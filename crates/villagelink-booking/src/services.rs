//! # External Collaborators
//!
//! Contracts for the services the booking engine consumes but does not own.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RouteService      compute_route(origin, destination)                  │
//! │  FareService       base_fare(distance, at)                             │
//! │  WalletService     debit / credit / balance                            │
//! │  PaymentGateway    charge(order_id, amount)                            │
//! │  PayloadSigner     sign(record)           tamper-evident references    │
//! │  CredentialIssuer  issue / verify         rotating QR payloads         │
//! │  EarningsLedger    credit_earnings        driver/conductor share       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! In-memory implementations live in [`crate::memory`]; the HMAC signer and
//! issuer live in [`crate::signing`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use villagelink_core::{CommittedRecord, FareBreakdown, Money, RouteSummary};

use crate::error::BookingResult;

/// Computes a route between two places.
///
/// ## Errors
/// `BookingError::RouteUnavailable` when no route exists.
#[async_trait]
pub trait RouteService: Send + Sync {
    async fn compute_route(&self, origin: &str, destination: &str) -> BookingResult<RouteSummary>;
}

/// Prices a route. Surge and discount internals are the provider's business.
#[async_trait]
pub trait FareService: Send + Sync {
    async fn base_fare(&self, distance_m: u32, at: DateTime<Utc>) -> BookingResult<FareBreakdown>;
}

/// Proof of a wallet debit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletReceipt {
    pub transaction_id: String,
    pub new_balance: Money,
}

/// The internal coin wallet.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Atomically takes `amount` from the owner's balance.
    ///
    /// ## Errors
    /// `BookingError::InsufficientFunds` leaves the balance untouched.
    async fn debit(&self, owner_id: &str, amount: Money, reason: &str)
        -> BookingResult<WalletReceipt>;

    async fn credit(&self, owner_id: &str, amount: Money, reason: &str) -> BookingResult<()>;

    async fn balance(&self, owner_id: &str) -> BookingResult<Money>;
}

/// What the payment gateway reported for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ChargeOutcome {
    Success { transaction_id: String },
    Failure { reason: String },
}

/// External payment gateway.
///
/// `charge` may take arbitrarily long; the result can also arrive later
/// through `BookingEngine::handle_gateway_callback`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, order_id: Uuid, amount: Money) -> BookingResult<ChargeOutcome>;
}

/// Signs frozen records for tamper-evident settlement references.
pub trait PayloadSigner: Send + Sync {
    /// Hex signature over the record's immutable fields.
    fn sign(&self, record: &CommittedRecord) -> String;
}

/// A credential payload that passed signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayload {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// External token source for QR credentials.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Produces an opaque payload for `code`, valid until `expires_at`.
    async fn issue(&self, code: &str, expires_at: DateTime<Utc>) -> BookingResult<String>;

    /// Checks a payload's signature. Expiry is left to the caller's clock.
    ///
    /// ## Errors
    /// `BookingError::InvalidCredential` for malformed or tampered payloads.
    fn verify(&self, payload: &str) -> BookingResult<VerifiedPayload>;
}

/// Ledger of what validating actors have earned.
#[async_trait]
pub trait EarningsLedger: Send + Sync {
    async fn credit_earnings(
        &self,
        actor_id: &str,
        amount: Money,
        record: &CommittedRecord,
    ) -> BookingResult<()>;
}

/// Every collaborator the engine needs, bundled for construction.
#[derive(Clone)]
pub struct Collaborators {
    pub routes: Arc<dyn RouteService>,
    pub fares: Arc<dyn FareService>,
    pub wallet: Arc<dyn WalletService>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub signer: Arc<dyn PayloadSigner>,
    pub issuer: Arc<dyn CredentialIssuer>,
    pub earnings: Arc<dyn EarningsLedger>,
}
