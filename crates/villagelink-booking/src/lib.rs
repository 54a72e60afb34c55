//! # villagelink-booking: Booking Orchestration for VillageLink
//!
//! This crate turns a passenger's draft into exactly one committed record,
//! keeps its QR credential fresh while it is on screen, and settles it when
//! a conductor or driver scans it.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Booking Engine Architecture                       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                   BookingEngine (Facade)                         │  │
//! │  │                                                                  │  │
//! │  │  One per acting user. Owns the draft, the in-flight guard and    │  │
//! │  │  the background tasks.                                           │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  CommitEngine  │  │  OfflineQueue  │  │  CredentialService     │    │
//! │  │                │  │                │  │                        │    │
//! │  │ cash / wallet /│◄─│ FIFO replay on │  │ Rotating signed QR     │    │
//! │  │ online commits │  │ reconnect with │  │ payloads, refreshed    │    │
//! │  │ idempotent by  │  │ backoff        │  │ ahead of expiry        │    │
//! │  │ record id      │  │                │  │                        │    │
//! │  └───────┬────────┘  └────────────────┘  └────────────────────────┘    │
//! │          │                                                              │
//! │          ▼                                                              │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  RecordStore   │◄─│ Validation     │  │  ReadModelPoller       │    │
//! │  │  (SQLite)      │  │ Gateway        │  │                        │    │
//! │  │                │  │ scan → settle  │  │ active records +       │    │
//! │  │ conditional    │  │ or board, once │  │ wallet balance         │    │
//! │  │ transitions    │  │                │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  EXTERNAL COLLABORATORS (async traits in services.rs):                 │
//! │  • routes, fares, wallet, payment gateway                              │
//! │  • record signer, credential issuer, earnings ledger                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Orchestration
//! - [`engine`] - `BookingEngine` facade
//! - [`commit`] - Strategy execution and gateway callbacks
//! - [`queue`] - Offline queue and its drainer
//! - [`reservation`] - Pending online orders awaiting a gateway result
//!
//! ### Credentials & Validation
//! - [`credential`] - Rotating QR credentials
//! - [`gateway`] - Scan/typed-code validation
//! - [`signing`] - HMAC signer and credential issuer
//!
//! ### Plumbing
//! - [`config`] - `booking.toml` settings
//! - [`connectivity`] - Coalesced connectivity reports
//! - [`poller`] - Read-model refresh
//! - [`services`] - Collaborator traits
//! - [`memory`] - In-memory collaborators for demos and tests
//! - [`store`] - Record persistence seam
//! - [`clock`] - Tokio-driven clock
//! - [`error`] - Booking error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use villagelink_booking::{BookingConfig, BookingEngine};
//! use villagelink_core::{DraftPatch, PaymentMethod, RecordKind, SystemClock};
//!
//! let engine = BookingEngine::new(config, &db, collaborators, Arc::new(SystemClock))?;
//! engine.start_background();
//!
//! engine.create_draft("passenger-1", RecordKind::Ticket)?;
//! engine.update_draft(DraftPatch {
//!     origin: Some("Rampur".into()),
//!     destination: Some("Sitapur".into()),
//!     payment_method: Some(PaymentMethod::Cash),
//!     ..Default::default()
//! }).await?;
//!
//! let outcome = engine.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod commit;
pub mod config;
pub mod connectivity;
pub mod credential;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod poller;
pub mod queue;
pub mod reservation;
pub mod services;
pub mod signing;
pub mod store;

#[cfg(test)]
mod testkit;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::TokioClock;
pub use commit::CommitEngine;
pub use config::BookingConfig;
pub use connectivity::ConnectivityMonitor;
pub use credential::CredentialService;
pub use engine::{BookingEngine, CommitOutcome};
pub use error::{BookingError, BookingResult};
pub use gateway::ValidationGateway;
pub use poller::{ReadModel, ReadModelPoller, ReadModelPollerHandle, SharedReadModel};
pub use queue::{DrainReport, OfflineQueue, QueueDrainer, QueueDrainerHandle, QueueStatus};
pub use reservation::{Reservation, ReservationBook};
pub use services::{
    ChargeOutcome, Collaborators, CredentialIssuer, EarningsLedger, FareService, PayloadSigner,
    PaymentGateway, RouteService, VerifiedPayload, WalletReceipt, WalletService,
};
pub use signing::{HmacCredentialIssuer, HmacSigner};
pub use store::RecordStore;
