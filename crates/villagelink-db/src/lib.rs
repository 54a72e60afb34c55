//! # villagelink-db: Database Layer for VillageLink
//!
//! This crate provides durable storage for the booking engine.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      VillageLink Data Flow                              │
//! │                                                                         │
//! │  CommitEngine / OfflineQueue / ValidationGateway                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   villagelink-db (THIS CRATE)                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ RecordRepo     │   │ 001_records  │  │   │
//! │  │   │ SqlitePool    │◄───│ OfflineQueue-  │   │ 002_queue    │  │   │
//! │  │   │               │    │   Repository   │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │        <platform data dir>/villagelink/booking.db               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Committed records and the offline queue
//!
//! ## Usage
//!
//! ```rust,ignore
//! use villagelink_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("booking.db")).await?;
//!
//! let record = db.records().find_by_code("TKT-0123456789").await?;
//! let waiting = db.offline_queue().count_pending().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DbLocation};

// Repository re-exports for convenience
pub use repository::queue::OfflineQueueRepository;
pub use repository::record::{RecordRepository, StatusChange};
