//! # Committed Record Repository
//!
//! Durable storage for tickets, passes, rentals and parcels.
//!
//! ## Write Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  insert(record)                                                        │
//! │    └── UNIQUE(id), UNIQUE(code): a second insert for the same attempt  │
//! │        fails with DbError::UniqueViolation, never a second row         │
//! │                                                                         │
//! │  transition(id, expected, change)                                      │
//! │    └── UPDATE ... WHERE id = ? AND status = ?                          │
//! │        Two scanners racing on one code: exactly one sees `true`        │
//! │                                                                         │
//! │  total_price_paise is written once and never updated                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use villagelink_core::{CommittedRecord, RecordStatus};

const SELECT_RECORD: &str = r#"
    SELECT
        id, code, kind, owner_id, origin, destination, distance_m,
        passenger_count, addon_livestock, addon_insurance, addon_gift,
        total_price_paise, payment_method, status, settlement_reference,
        gift_recipient, cash_collected_by, cash_collected_at, validated_by,
        created_at, updated_at
    FROM committed_records
"#;

/// A status change applied by [`RecordRepository::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub to: RecordStatus,
    /// Set when a driver collects cash for a pending record.
    pub cash_collected_by: Option<String>,
    /// Actor that scanned or entered the code.
    pub validated_by: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    /// A plain status change with no actor attached.
    pub fn to(status: RecordStatus, at: DateTime<Utc>) -> Self {
        StatusChange {
            to: status,
            cash_collected_by: None,
            validated_by: None,
            at,
        }
    }

    pub fn validated_by(mut self, actor: impl Into<String>) -> Self {
        self.validated_by = Some(actor.into());
        self
    }

    pub fn cash_collected_by(mut self, actor: impl Into<String>) -> Self {
        self.cash_collected_by = Some(actor.into());
        self
    }
}

/// Repository for committed records.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.records();
/// repo.insert(&record).await?;
///
/// let found = repo.find_by_code("TKT-0000000042").await?;
/// ```
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Creates a new RecordRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecordRepository { pool }
    }

    /// Inserts a newly committed record.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` when a record with the same id or code
    /// already exists. Callers treat that as "already committed".
    pub async fn insert(&self, record: &CommittedRecord) -> DbResult<()> {
        debug!(id = %record.id, code = %record.code, status = %record.status, "Inserting record");

        sqlx::query(
            r#"
            INSERT INTO committed_records (
                id, code, kind, owner_id, origin, destination, distance_m,
                passenger_count, addon_livestock, addon_insurance, addon_gift,
                total_price_paise, payment_method, status, settlement_reference,
                gift_recipient, cash_collected_by, cash_collected_at, validated_by,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.code)
        .bind(record.kind)
        .bind(&record.owner_id)
        .bind(&record.origin)
        .bind(&record.destination)
        .bind(record.distance_m)
        .bind(record.passenger_count)
        .bind(record.add_ons.livestock)
        .bind(record.add_ons.insurance)
        .bind(record.add_ons.gift)
        .bind(record.total_price_paise)
        .bind(record.payment_method)
        .bind(record.status)
        .bind(&record.settlement_reference)
        .bind(&record.gift_recipient)
        .bind(&record.cash_collected_by)
        .bind(record.cash_collected_at)
        .bind(&record.validated_by)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a record by its id.
    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<CommittedRecord>> {
        let record = sqlx::query_as::<_, CommittedRecord>(&format!("{SELECT_RECORD} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    /// Gets a record by its id, failing with `NotFound` if absent.
    pub async fn get_by_id(&self, id: &str) -> DbResult<CommittedRecord> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Record", id))
    }

    /// Gets a record by its canonical code (e.g. `TKT-0000000042`).
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<CommittedRecord>> {
        let record =
            sqlx::query_as::<_, CommittedRecord>(&format!("{SELECT_RECORD} WHERE code = ?"))
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    /// Lists an owner's records, newest first.
    pub async fn list_for_owner(&self, owner_id: &str, limit: u32) -> DbResult<Vec<CommittedRecord>> {
        let records = sqlx::query_as::<_, CommittedRecord>(&format!(
            "{SELECT_RECORD} WHERE owner_id = ? ORDER BY created_at DESC, code DESC LIMIT ?"
        ))
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Lists an owner's records that can still be presented or validated.
    pub async fn list_active_for_owner(&self, owner_id: &str) -> DbResult<Vec<CommittedRecord>> {
        let records = sqlx::query_as::<_, CommittedRecord>(&format!(
            "{SELECT_RECORD} WHERE owner_id = ? AND status IN ('pending', 'paid', 'boarded') \
             ORDER BY created_at DESC, code DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Moves a record from `expected` to `change.to`.
    ///
    /// Returns `false` when the record is missing or is no longer in the
    /// expected status. The caller decides which of the two it was.
    ///
    /// Actor columns are only ever filled in, never cleared.
    pub async fn transition(
        &self,
        id: &str,
        expected: RecordStatus,
        change: &StatusChange,
    ) -> DbResult<bool> {
        let cash_collected_at = change.cash_collected_by.as_ref().map(|_| change.at);

        let result = sqlx::query(
            r#"
            UPDATE committed_records
            SET status = ?,
                cash_collected_by = COALESCE(?, cash_collected_by),
                cash_collected_at = COALESCE(?, cash_collected_at),
                validated_by = COALESCE(?, validated_by),
                updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(change.to)
        .bind(&change.cash_collected_by)
        .bind(cash_collected_at)
        .bind(&change.validated_by)
        .bind(change.at)
        .bind(id)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        if applied {
            debug!(id = %id, from = %expected, to = %change.to, "Record transitioned");
        } else {
            warn!(id = %id, expected = %expected, "Conditional transition did not apply");
        }
        Ok(applied)
    }

    /// Total number of committed records.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM committed_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
