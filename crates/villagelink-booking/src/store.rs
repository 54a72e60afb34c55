//! # Record Store
//!
//! The seam between orchestration and wherever committed records live.
//! The engine only ever talks to [`RecordStore`]; the SQLite repository is
//! the bundled implementation.

use async_trait::async_trait;

use villagelink_core::{CommittedRecord, RecordStatus};
use villagelink_db::{RecordRepository, StatusChange};

use crate::error::{BookingError, BookingResult};

/// Backing store for committed records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Writes a new record.
    ///
    /// ## Errors
    /// `BookingError::CommitConflict` if the id or code already exists.
    async fn insert(&self, record: &CommittedRecord) -> BookingResult<()>;

    async fn find_by_id(&self, id: &str) -> BookingResult<Option<CommittedRecord>>;

    async fn find_by_code(&self, code: &str) -> BookingResult<Option<CommittedRecord>>;

    /// Conditional status change; `false` when the record is no longer in
    /// `expected`.
    async fn transition(
        &self,
        id: &str,
        expected: RecordStatus,
        change: &StatusChange,
    ) -> BookingResult<bool>;

    async fn list_active_for_owner(&self, owner_id: &str) -> BookingResult<Vec<CommittedRecord>>;
}

#[async_trait]
impl RecordStore for RecordRepository {
    async fn insert(&self, record: &CommittedRecord) -> BookingResult<()> {
        RecordRepository::insert(self, record).await.map_err(|e| {
            if e.is_unique_violation() {
                BookingError::CommitConflict {
                    record_id: record.id.clone(),
                }
            } else {
                e.into()
            }
        })
    }

    async fn find_by_id(&self, id: &str) -> BookingResult<Option<CommittedRecord>> {
        Ok(RecordRepository::find_by_id(self, id).await?)
    }

    async fn find_by_code(&self, code: &str) -> BookingResult<Option<CommittedRecord>> {
        Ok(RecordRepository::find_by_code(self, code).await?)
    }

    async fn transition(
        &self,
        id: &str,
        expected: RecordStatus,
        change: &StatusChange,
    ) -> BookingResult<bool> {
        Ok(RecordRepository::transition(self, id, expected, change).await?)
    }

    async fn list_active_for_owner(&self, owner_id: &str) -> BookingResult<Vec<CommittedRecord>> {
        Ok(RecordRepository::list_active_for_owner(self, owner_id).await?)
    }
}
