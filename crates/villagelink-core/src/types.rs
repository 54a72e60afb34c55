//! # Domain Types
//!
//! Core domain types used throughout the VillageLink booking engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  CommitPayload  │   │ CommittedRecord │   │  QueuedAction   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  record_id      │──►│  id (UUID)      │◄──│  record_id      │       │
//! │  │  code           │   │  code (TKT-...) │   │  payload (JSON) │       │
//! │  │  total_price    │   │  status         │   │  retry_count    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   RecordKind    │   │  RecordStatus   │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Ticket  (TKT)  │   │  Pending        │   │  Online         │       │
//! │  │  Pass    (PAS)  │   │  Paid           │   │  Cash           │       │
//! │  │  Rental  (RNT)  │   │  Boarded        │   │  WalletCoin     │       │
//! │  │  Parcel  (PCL)  │   │  Completed/...  │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every committed record has:
//! - `id`: UUID v4 generated on the device before commit. It is the
//!   idempotency key and survives offline replay unchanged.
//! - `code`: the human/QR-facing identifier (`TKT-0123456789`), derived from
//!   the UUID so every replay of the same attempt yields the same code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Record Kind
// =============================================================================

/// What a committed record entitles its owner to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A single bus/jeep journey.
    Ticket,
    /// A multi-ride pass.
    Pass,
    /// A vehicle rental booking.
    Rental,
    /// A parcel sent along a route.
    Parcel,
}

impl RecordKind {
    /// All kinds, in code-prefix order.
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Ticket,
        RecordKind::Pass,
        RecordKind::Rental,
        RecordKind::Parcel,
    ];

    /// The three-letter prefix of this kind's record codes.
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            RecordKind::Ticket => "TKT",
            RecordKind::Pass => "PAS",
            RecordKind::Rental => "RNT",
            RecordKind::Parcel => "PCL",
        }
    }

    /// Looks up a kind by its code prefix (already uppercased).
    pub fn from_prefix(prefix: &str) -> Option<RecordKind> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.code_prefix() == prefix)
    }

    /// Only tickets pass through BOARDED; everything else completes directly.
    pub const fn can_board(&self) -> bool {
        matches!(self, RecordKind::Ticket)
    }

    /// Lowercase name, used as the offline queue `action_type` and in config.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Ticket => "ticket",
            RecordKind::Pass => "pass",
            RecordKind::Rental => "rental",
            RecordKind::Parcel => "parcel",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for RecordKind {
    fn default() -> Self {
        RecordKind::Ticket
    }
}

// =============================================================================
// Record Status
// =============================================================================

/// Lifecycle status of a committed record.
///
/// ## Lifecycle
/// ```text
///   PENDING ──(cash collected)──► PAID ──(ticket)──► BOARDED ──► COMPLETED
///      │                           │                    │
///      │                           └──(other kinds)─────┴──────► COMPLETED
///      │
///      └──────────┬──────────────────────────────────────► CANCELLED
///                 └──────────────────────────────────────► REJECTED
/// ```
/// No transition moves backward and terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Committed, money not yet moved (cash path).
    Pending,
    /// Money has moved (online/wallet at commit, cash at validation).
    Paid,
    /// Ticket holder has boarded.
    Boarded,
    /// Journey or service finished.
    Completed,
    /// Cancelled by the owner or operator.
    Cancelled,
    /// Rejected by the operator.
    Rejected,
}

impl RecordStatus {
    /// Whether no further transitions are allowed.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordStatus::Completed | RecordStatus::Cancelled | RecordStatus::Rejected
        )
    }

    /// Whether `self → next` is a documented forward transition for `kind`.
    pub fn can_transition_to(&self, next: RecordStatus, kind: RecordKind) -> bool {
        use RecordStatus::*;
        match (self, next) {
            (Pending, Paid | Cancelled | Rejected) => true,
            (Paid, Boarded) => kind.can_board(),
            (Paid, Completed | Cancelled | Rejected) => true,
            (Boarded, Completed | Cancelled) => true,
            _ => false,
        }
    }

    /// Checked transition, returning an error naming the record on failure.
    pub fn transition(
        &self,
        next: RecordStatus,
        kind: RecordKind,
        code: &str,
    ) -> CoreResult<RecordStatus> {
        if self.can_transition_to(next, kind) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                code: code.to_string(),
                from: *self,
                to: next,
            })
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Paid => "paid",
            RecordStatus::Boarded => "boarded",
            RecordStatus::Completed => "completed",
            RecordStatus::Cancelled => "cancelled",
            RecordStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// External payment gateway, settled before commit.
    Online,
    /// Cash handed to the driver, settled at validation.
    Cash,
    /// Internal coin wallet, debited atomically before commit.
    WalletCoin,
}

impl PaymentMethod {
    /// The status a record is created in for this method.
    pub const fn initial_status(&self) -> RecordStatus {
        match self {
            PaymentMethod::Cash => RecordStatus::Pending,
            PaymentMethod::Online | PaymentMethod::WalletCoin => RecordStatus::Paid,
        }
    }

    /// Settlement happens at validation time rather than at commit.
    pub const fn is_deferred(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::Cash => "cash",
            PaymentMethod::WalletCoin => "wallet_coin",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Add-ons
// =============================================================================

/// An optional extra on a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AddOn {
    /// Carrying goats, poultry etc.
    Livestock,
    /// Journey insurance.
    Insurance,
    /// Booking on behalf of someone else.
    Gift,
}

/// The add-on flags of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AddOns {
    #[cfg_attr(feature = "sqlx", sqlx(rename = "addon_livestock"))]
    pub livestock: bool,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "addon_insurance"))]
    pub insurance: bool,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "addon_gift"))]
    pub gift: bool,
}

impl AddOns {
    pub fn set(&mut self, flag: AddOn, value: bool) {
        match flag {
            AddOn::Livestock => self.livestock = value,
            AddOn::Insurance => self.insurance = value,
            AddOn::Gift => self.gift = value,
        }
    }

    pub fn is_set(&self, flag: AddOn) -> bool {
        match flag {
            AddOn::Livestock => self.livestock,
            AddOn::Insurance => self.insurance,
            AddOn::Gift => self.gift,
        }
    }

    /// Enabled flags in a fixed order.
    pub fn enabled(&self) -> impl Iterator<Item = AddOn> + '_ {
        [AddOn::Livestock, AddOn::Insurance, AddOn::Gift]
            .into_iter()
            .filter(move |flag| self.is_set(*flag))
    }
}

// =============================================================================
// Route & Fare (externally supplied)
// =============================================================================

/// A point on a computed route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
}

/// Result of the external route computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RouteSummary {
    /// Road distance in metres.
    pub distance_m: u32,
    pub path: Vec<Waypoint>,
}

impl RouteSummary {
    /// A route with a distance and no drawn path.
    pub fn with_distance(distance_m: u32) -> Self {
        RouteSummary {
            distance_m,
            path: Vec::new(),
        }
    }
}

/// Result of the external base-fare computation (per passenger unit).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FareBreakdown {
    pub base: Money,
    pub surge: Money,
    pub discount: Money,
    /// Human-readable note from the fare service ("Festival surge", ...).
    pub message: Option<String>,
}

// =============================================================================
// Commit Payload
// =============================================================================

/// A frozen snapshot of a draft, ready to be written exactly once.
///
/// This is what the offline queue serializes and what the commit engine
/// consumes. `total_price` is copied from the quote at the moment the
/// snapshot is taken and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommitPayload {
    /// Idempotency key (also the provisional order id on the online path).
    #[ts(as = "String")]
    pub record_id: Uuid,
    /// Canonical code derived from `record_id`.
    pub code: String,
    pub kind: RecordKind,
    pub owner_id: String,
    pub origin: String,
    pub destination: String,
    pub distance_m: u32,
    pub passenger_count: u32,
    pub add_ons: AddOns,
    pub gift_recipient: Option<String>,
    pub payment_method: PaymentMethod,
    pub total_price: Money,
    #[ts(as = "String")]
    pub quoted_at: DateTime<Utc>,
}

impl CommitPayload {
    /// Builds the committed record this payload turns into.
    pub fn into_record(
        self,
        status: RecordStatus,
        settlement_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> CommittedRecord {
        CommittedRecord {
            id: self.record_id.to_string(),
            code: self.code,
            kind: self.kind,
            owner_id: self.owner_id,
            origin: self.origin,
            destination: self.destination,
            distance_m: self.distance_m as i64,
            passenger_count: self.passenger_count as i64,
            add_ons: self.add_ons,
            total_price_paise: self.total_price.paise(),
            payment_method: self.payment_method,
            status,
            settlement_reference,
            gift_recipient: self.gift_recipient,
            cash_collected_by: None,
            cash_collected_at: None,
            validated_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Committed Record
// =============================================================================

/// A committed ticket, pass, rental or parcel booking.
///
/// Immutable after creation except for `status` and the validation fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CommittedRecord {
    /// Client-generated UUID v4 (idempotency key).
    pub id: String,
    /// Canonical `PREFIX-NNNNNNNNNN` code shown on the QR.
    pub code: String,
    pub kind: RecordKind,
    pub owner_id: String,
    pub origin: String,
    pub destination: String,
    pub distance_m: i64,
    pub passenger_count: i64,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    pub add_ons: AddOns,
    /// Frozen copy of the quote total at commit time, in paise.
    pub total_price_paise: i64,
    pub payment_method: PaymentMethod,
    pub status: RecordStatus,
    /// `{ledger transaction}.{signature prefix}` once money has moved.
    pub settlement_reference: Option<String>,
    pub gift_recipient: Option<String>,
    /// Validating actor who acknowledged cash collection.
    pub cash_collected_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub cash_collected_at: Option<DateTime<Utc>>,
    /// Validating actor of the most recent successful scan.
    pub validated_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CommittedRecord {
    /// Returns the frozen total as Money.
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_paise(self.total_price_paise)
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Parses the string id back into a UUID.
    pub fn record_uuid(&self) -> CoreResult<Uuid> {
        Uuid::parse_str(&self.id)
            .map_err(|e| CoreError::MalformedPayload(format!("record id {}: {}", self.id, e)))
    }
}

// =============================================================================
// Queued Action
// =============================================================================

/// A commit attempted while offline, waiting in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct QueuedAction {
    pub id: String,
    /// Record kind being committed ("ticket", "pass", ...).
    pub action_type: String,
    /// Idempotency key of the queued commit; unique in the queue.
    pub record_id: String,
    /// The full `CommitPayload` as JSON.
    pub payload: String,
    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: i64,
    pub last_error: Option<String>,
    #[ts(as = "Option<String>")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set once the entry exceeded its retry budget.
    #[ts(as = "Option<String>")]
    pub parked_at: Option<DateTime<Utc>>,
}

impl QueuedAction {
    /// Decodes the serialized commit payload.
    pub fn commit_payload(&self) -> CoreResult<CommitPayload> {
        serde_json::from_str(&self.payload)
            .map_err(|e| CoreError::MalformedPayload(format!("queue entry {}: {}", self.id, e)))
    }

    #[inline]
    pub fn is_parked(&self) -> bool {
        self.parked_at.is_some()
    }
}

// =============================================================================
// Validation Outcome
// =============================================================================

/// What a successful scan did to the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ValidationAction {
    /// Cash obligation fulfilled: PENDING → PAID.
    CashCollected,
    /// Prepaid ticket boarded: PAID → BOARDED.
    Boarded,
    /// Prepaid pass/rental/parcel redeemed: PAID → COMPLETED.
    Completed,
}

/// Result of a successful validation, shown on the conductor's device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ValidationOutcome {
    pub record_id: String,
    pub code: String,
    pub kind: RecordKind,
    pub payment_method: PaymentMethod,
    pub action: ValidationAction,
    pub previous_status: RecordStatus,
    pub status: RecordStatus,
    pub passenger_count: i64,
    pub total_price: Money,
    /// Amount credited to the validating actor (total minus platform fee).
    pub earnings: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================
