//! # Database Error Types
//!
//! What can go wrong between the booking engine and SQLite, sorted by what
//! the caller should do about it.
//!
//! ```text
//! sqlx::Error ──► DbError ──► BookingError (villagelink-booking)
//!                   │
//!                   ├─ UniqueViolation   a record or queue entry already exists;
//!                   │                    the commit engine turns it into
//!                   │                    CommitConflict
//!                   ├─ Busy / PoolExhausted / Unavailable
//!                   │                    transient; the queue retries later
//!                   └─ everything else   permanent for this input
//! ```

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write. `constraint` is the failing
    /// `table.column` as SQLite reports it.
    #[error("Duplicate value for {constraint}")]
    UniqueViolation { constraint: String },

    /// CHECK or foreign key failure.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// SQLite reported the database as busy or locked.
    #[error("Database busy: {0}")]
    Busy(String),

    /// All pooled connections stayed in use past the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// The database file could not be opened, or the pool is closed.
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    /// A stored row no longer decodes into its type.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(constraint: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            constraint: constraint.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }

    /// Returns true for transient failures worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Busy(_) | DbError::PoolExhausted | DbError::Unavailable(_)
        )
    }
}

/// Maps a SQLite error message onto the taxonomy.
fn classify(message: &str) -> DbError {
    if let Some(constraint) = message.strip_prefix("UNIQUE constraint failed: ") {
        DbError::duplicate(constraint)
    } else if message.contains("constraint failed") {
        DbError::Constraint(message.to_string())
    } else if message.contains("database is locked") || message.contains("database is busy") {
        DbError::Busy(message.to_string())
    } else {
        DbError::Query(message.to_string())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),
            sqlx::Error::Database(db_err) => classify(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::Unavailable("pool is closed".to_string()),
            sqlx::Error::Io(e) => DbError::Unavailable(e.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DbError::CorruptRow(err.to_string())
            }
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_messages_are_classified() {
        let err = classify("UNIQUE constraint failed: committed_records.code");
        assert!(err.is_unique_violation());
        assert!(err.to_string().contains("committed_records.code"));

        assert!(matches!(
            classify("CHECK constraint failed: status"),
            DbError::Constraint(_)
        ));
        assert!(classify("database is locked").is_retryable());
        assert!(matches!(classify("no such table: x"), DbError::Query(_)));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(DbError::PoolExhausted.is_retryable());
        assert!(DbError::Unavailable("disk".into()).is_retryable());
        assert!(!DbError::duplicate("offline_queue.record_id").is_retryable());
        assert!(!DbError::not_found("Record", "abc").is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
