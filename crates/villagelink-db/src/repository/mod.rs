//! # Repository Module
//!
//! Database repository implementations for the booking engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CommitEngine ──► db.records().insert(&record)                          │
//! │  Gateway     ──► db.records().transition(id, expected, change)          │
//! │  Drainer     ──► db.offline_queue().head() / mark_replayed(id)          │
//! │       │                                                                 │
//! │       ▼  SQL lives only here                                            │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`record::RecordRepository`] - Committed tickets, passes, rentals, parcels
//! - [`queue::OfflineQueueRepository`] - Durable offline commit queue

pub mod queue;
pub mod record;
