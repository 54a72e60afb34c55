//! # Offline Queue Repository
//!
//! Durable FIFO of commits attempted while the device was offline.
//!
//! ## Lifecycle of an Entry
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  enqueue(payload)          INSERT ... ON CONFLICT(record_id) DO NOTHING │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  head()  ◄──────────────┐  oldest row with parked_at IS NULL (by seq)  │
//! │       │                 │                                               │
//! │   replay commit         │                                               │
//! │       │                 │                                               │
//! │   ┌───┴──────┐    mark_failed(id)  retry_count += 1                     │
//! │   ▼          ▼          │                                               │
//! │ acked     retryable ────┘                                               │
//! │   │                                                                     │
//! │   ▼                                                                     │
//! │ remove(id)                 row deleted only after acknowledgment       │
//! │                                                                         │
//! │  park(id): out of the FIFO, kept for inspection                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use villagelink_core::QueuedAction;

const SELECT_ACTION: &str = r#"
    SELECT
        id, action_type, record_id, payload, enqueued_at, retry_count,
        last_error, last_attempt_at, parked_at
    FROM offline_queue
"#;

/// Repository for the offline commit queue.
#[derive(Debug, Clone)]
pub struct OfflineQueueRepository {
    pool: SqlitePool,
}

impl OfflineQueueRepository {
    /// Creates a new OfflineQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OfflineQueueRepository { pool }
    }

    /// Appends an action for `record_id`.
    ///
    /// Enqueuing the same record twice keeps the first entry and returns it,
    /// so a double tap while offline still yields one replay.
    pub async fn enqueue(
        &self,
        action_type: &str,
        record_id: &str,
        payload: &str,
        now: DateTime<Utc>,
    ) -> DbResult<QueuedAction> {
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            r#"
            INSERT INTO offline_queue (id, action_type, record_id, payload, enqueued_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(record_id) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(action_type)
        .bind(record_id)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(record_id = %record_id, "Action already queued");
        } else {
            info!(record_id = %record_id, action_type = %action_type, "Queued offline action");
        }

        self.find_by_record(record_id)
            .await?
            .ok_or_else(|| DbError::not_found("QueuedAction", record_id))
    }

    /// The entry queued for a given record, parked or not.
    pub async fn find_by_record(&self, record_id: &str) -> DbResult<Option<QueuedAction>> {
        let action =
            sqlx::query_as::<_, QueuedAction>(&format!("{SELECT_ACTION} WHERE record_id = ?"))
                .bind(record_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(action)
    }

    /// The oldest entry that still takes part in replay.
    pub async fn head(&self) -> DbResult<Option<QueuedAction>> {
        let action = sqlx::query_as::<_, QueuedAction>(&format!(
            "{SELECT_ACTION} WHERE parked_at IS NULL ORDER BY seq ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(action)
    }

    /// Unparked entries in replay order.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<QueuedAction>> {
        let actions = sqlx::query_as::<_, QueuedAction>(&format!(
            "{SELECT_ACTION} WHERE parked_at IS NULL ORDER BY seq ASC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(actions)
    }

    /// Entries taken out of replay after too many failures.
    pub async fn parked(&self) -> DbResult<Vec<QueuedAction>> {
        let actions = sqlx::query_as::<_, QueuedAction>(&format!(
            "{SELECT_ACTION} WHERE parked_at IS NOT NULL ORDER BY seq ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(actions)
    }

    /// Deletes an entry once its commit has been acknowledged.
    pub async fn remove(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("QueuedAction", id));
        }

        debug!(id = %id, "Removed replayed action");
        Ok(())
    }

    /// Records a failed replay attempt and returns the new retry count.
    pub async fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> DbResult<i64> {
        let retry_count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE offline_queue
            SET retry_count = retry_count + 1,
                last_error = ?,
                last_attempt_at = ?
            WHERE id = ?
            RETURNING retry_count
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let retry_count = retry_count.ok_or_else(|| DbError::not_found("QueuedAction", id))?;
        warn!(id = %id, retry_count, error = %error, "Replay attempt failed");
        Ok(retry_count)
    }

    /// Takes an entry out of the FIFO without deleting it.
    pub async fn park(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query("UPDATE offline_queue SET parked_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("QueuedAction", id));
        }

        warn!(id = %id, "Parked offline action");
        Ok(())
    }

    /// Puts a parked entry back at its original place in the FIFO.
    pub async fn unpark(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE offline_queue SET parked_at = NULL, retry_count = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of entries waiting for replay.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM offline_queue WHERE parked_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Number of parked entries.
    pub async fn count_parked(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM offline_queue WHERE parked_at IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn repo() -> OfflineQueueRepository {
        Database::new(DbConfig::in_memory()).await.unwrap().offline_queue()
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_per_record() {
        let repo = repo().await;
        let now = Utc::now();

        let first = repo.enqueue("commit", "rec-1", "{}", now).await.unwrap();
        let second = repo.enqueue("commit", "rec-1", "{\"x\":1}", now).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.payload, "{}");
        assert_eq!(repo.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_head_is_fifo() {
        let repo = repo().await;
        let now = Utc::now();
        let a = repo.enqueue("commit", "rec-a", "{}", now).await.unwrap();
        let b = repo.enqueue("commit", "rec-b", "{}", now).await.unwrap();

        assert_eq!(repo.head().await.unwrap().unwrap().id, a.id);
        repo.remove(&a.id).await.unwrap();
        assert_eq!(repo.head().await.unwrap().unwrap().id, b.id);
        repo.remove(&b.id).await.unwrap();
        assert!(repo.head().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_bookkeeping_and_parking() {
        let repo = repo().await;
        let now = Utc::now();
        let a = repo.enqueue("commit", "rec-a", "{}", now).await.unwrap();
        let b = repo.enqueue("commit", "rec-b", "{}", now).await.unwrap();

        assert_eq!(repo.mark_failed(&a.id, "timeout", now).await.unwrap(), 1);
        assert_eq!(repo.mark_failed(&a.id, "timeout", now).await.unwrap(), 2);
        let head = repo.head().await.unwrap().unwrap();
        assert_eq!(head.last_error.as_deref(), Some("timeout"));
        assert!(head.last_attempt_at.is_some());

        repo.park(&a.id, now).await.unwrap();
        assert_eq!(repo.head().await.unwrap().unwrap().id, b.id);
        assert_eq!(repo.count_parked().await.unwrap(), 1);
        assert!(repo.parked().await.unwrap()[0].is_parked());

        repo.unpark(&a.id).await.unwrap();
        assert_eq!(repo.head().await.unwrap().unwrap().id, a.id);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let repo = repo().await;
        assert!(matches!(repo.remove("nope").await, Err(DbError::NotFound { .. })));
        assert!(matches!(
            repo.mark_failed("nope", "x", Utc::now()).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
