//! # villagelink-core: Pure Booking Logic for VillageLink
//!
//! This crate is the **heart** of the VillageLink booking engine. It contains
//! the booking rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     VillageLink Booking Architecture                    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Passenger / Conductor UI                     │   │
//! │  │   Route ──► Passengers ──► Add-ons ──► Pay ──► QR ──► Scan      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               villagelink-booking (orchestration)               │   │
//! │  │    commit, offline queue, credential rotation, validation       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ villagelink-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   money   │  │   fare    │  │   draft   │  │  payment  │  │   │
//! │  │   │  Money    │  │ compose() │  │DraftStore │  │ strategy  │  │   │
//! │  │   │  Bps      │  │ Subsidy   │  │ DraftPatch│  │ selection │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   code    │  │credential │  │ validation│  │   │
//! │  │   │ Record    │  │ TKT-...   │  │  phases   │  │   rules   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                villagelink-db (Database Layer)                  │   │
//! │  │          committed records, offline queue, migrations           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (CommittedRecord, RecordStatus, PaymentMethod, ...)
//! - [`money`] - Money type with integer arithmetic (paise, never floats)
//! - [`fare`] - The Fare Composer and the pluggable subsidy policy
//! - [`draft`] - The Booking Draft Store
//! - [`payment`] - Payment strategy selection
//! - [`credential`] - Rotating QR credential lifecycle math
//! - [`code`] - Ticket code generation and normalization
//! - [`clock`] - Time source abstraction
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules
//!
//! ## Example Usage
//!
//! ```rust
//! use villagelink_core::fare::compose;
//! use villagelink_core::money::Money;
//!
//! let quote = compose(
//!     Money::from_rupees(20),
//!     Money::from_rupees(5),
//!     Money::zero(),
//!     Money::from_rupees(5),
//!     2,
//!     &[Money::from_rupees(1)],
//! );
//!
//! assert_eq!(quote.total_fare(), Money::from_rupees(41));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod code;
pub mod credential;
pub mod draft;
pub mod error;
pub mod fare;
pub mod money;
pub mod payment;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use credential::{Credential, CredentialPhase, CredentialWindow, Presentation};
pub use draft::{BookingDraft, DraftPatch, DraftStore, GiftPatch, ResolvedRoute};
pub use error::{CoreError, CoreResult, ValidationError};
pub use fare::{compose, AddOnFees, DistanceSubsidy, NoSubsidy, PriceQuote, SubsidyPolicy};
pub use money::{Bps, Money};
pub use payment::{select_strategy, Connectivity, ExecutionStrategy};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum passengers on a single booking.
///
/// Rural buses and shared jeeps rarely seat more than this; a larger number is
/// almost always a typo (e.g. 40 instead of 4).
pub const MAX_PASSENGERS: u32 = 50;

/// Number of digits in the numeric part of a record code (`TKT-0123456789`).
pub const CODE_DIGITS: usize = 10;
