//! # Booking Error Types
//!
//! Error types for booking orchestration.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Booking Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Draft side    │  │   Commit side   │  │   Validation side       │ │
//! │  │  (re-prompt)    │  │ (no partial     │  │  (terminal for the      │ │
//! │  │                 │  │  record)        │  │   scan)                 │ │
//! │  │  Validation     │  │  Connectivity   │  │  InvalidCredential      │ │
//! │  │  Precondition   │  │  InsufficientF. │  │  AlreadyUsed            │ │
//! │  │  RouteUnavail.  │  │  CommitConflict │  │                         │ │
//! │  │                 │  │  CommitInFlight │  │                         │ │
//! │  │                 │  │  PaymentDeclined│  │                         │ │
//! │  │                 │  │  PaymentPending │  │                         │ │
//! │  │                 │  │  Cancelled      │  │                         │ │
//! │  │                 │  │  QueueBacklog   │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Infrastructure: Storage, Collaborator, Config, Internal        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use uuid::Uuid;

use villagelink_core::{CoreError, Money, RecordStatus, ValidationError};
use villagelink_db::DbError;

/// Result type alias for booking operations.
pub type BookingResult<T> = Result<T, BookingError>;

/// Booking error type covering every failure the engine reports.
#[derive(Debug, Error)]
pub enum BookingError {
    // =========================================================================
    // Draft-side Errors
    // =========================================================================
    /// Bad draft input. The caller re-prompts.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Something required before commit is missing (route, payment method...).
    #[error("{0}")]
    Precondition(String),

    /// The route service could not route between the two places.
    #[error("Route unavailable: {0}")]
    RouteUnavailable(String),

    // =========================================================================
    // Commit-side Errors
    // =========================================================================
    /// A live-only path was attempted while offline.
    #[error("{0}")]
    Connectivity(String),

    /// The wallet could not cover the booking.
    #[error("Insufficient wallet balance: need {required}, have {available}")]
    InsufficientFunds { required: Money, available: Money },

    /// A record with this identifier already exists.
    #[error("Record {record_id} is already committed")]
    CommitConflict { record_id: String },

    /// Another commit from the same session is still running.
    #[error("A commit is already in progress")]
    CommitInFlight,

    /// The payment gateway refused the charge.
    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// The gateway has not answered yet; its callback may still commit.
    #[error("Payment for order {order_id} is still pending")]
    PaymentPending { order_id: Uuid },

    /// The booking flow was abandoned while waiting.
    #[error("Booking cancelled")]
    Cancelled,

    /// Queued bookings ahead of this one could not be replayed yet.
    #[error("{pending} queued booking(s) must sync first: {reason}")]
    QueueBacklog { pending: i64, reason: String },

    // =========================================================================
    // Validation-side Errors
    // =========================================================================
    /// Unknown, malformed, tampered or expired credential.
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The record was already consumed.
    #[error("Record {code} has already been used (status: {status})")]
    AlreadyUsed { code: String, status: RecordStatus },

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// Local storage failed.
    #[error("Storage error: {0}")]
    Storage(#[source] DbError),

    /// An external collaborator (wallet, gateway, token source) failed.
    #[error("Collaborator failed: {0}")]
    Collaborator(String),

    /// Configuration could not be loaded, saved or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Corrupt queue payload or another internal inconsistency.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for BookingError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => BookingError::Validation(e),
            CoreError::MissingInput { .. } | CoreError::NoActiveDraft => {
                BookingError::Precondition(err.to_string())
            }
            CoreError::Connectivity { .. } => BookingError::Connectivity(err.to_string()),
            CoreError::InvalidTransition { .. } => BookingError::Precondition(err.to_string()),
            CoreError::MalformedPayload(msg) => BookingError::Internal(msg),
        }
    }
}

impl From<DbError> for BookingError {
    fn from(err: DbError) -> Self {
        BookingError::Storage(err)
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(err: serde_json::Error) -> Self {
        BookingError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for BookingError {
    fn from(err: std::io::Error) -> Self {
        BookingError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for BookingError {
    fn from(err: toml::de::Error) -> Self {
        BookingError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BookingError {
    fn from(err: toml::ser::Error) -> Self {
        BookingError::Config(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl BookingError {
    /// Returns true if the same operation may succeed when retried later.
    ///
    /// ## Retryable Errors
    /// - Connectivity loss
    /// - Collaborator outages
    /// - Queued bookings still waiting to replay
    /// - Transient storage failures (pool exhausted, connection lost)
    ///
    /// ## Non-Retryable Errors
    /// - Anything about the input or the record itself
    pub fn is_retryable(&self) -> bool {
        match self {
            BookingError::Connectivity(_)
            | BookingError::Collaborator(_)
            | BookingError::QueueBacklog { .. } => true,
            BookingError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns true if the error is about the draft and the user can fix it
    /// by editing.
    pub fn is_draft_side(&self) -> bool {
        matches!(
            self,
            BookingError::Validation(_)
                | BookingError::Precondition(_)
                | BookingError::RouteUnavailable(_)
        )
    }

    /// Returns true if the booking attempt is over and the draft should be
    /// reset.
    ///
    /// Recoverable failures keep the draft (and its attempt id) so that a
    /// retry or a switch of payment method reuses it. A pending payment ends
    /// the foreground attempt; the gateway callback finishes it.
    pub fn ends_attempt(&self) -> bool {
        matches!(
            self,
            BookingError::PaymentDeclined(_)
                | BookingError::PaymentPending { .. }
                | BookingError::Cancelled
                | BookingError::CommitConflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use villagelink_core::{PaymentMethod, RecordKind};

    #[test]
    fn test_core_errors_map_to_taxonomy() {
        let err: BookingError = CoreError::missing("payment method").into();
        assert!(matches!(err, BookingError::Precondition(_)));
        assert!(err.to_string().contains("payment method"));

        let err: BookingError = CoreError::Connectivity {
            method: PaymentMethod::Online,
            kind: RecordKind::Ticket,
        }
        .into();
        assert!(matches!(err, BookingError::Connectivity(_)));
        assert!(err.is_retryable());

        let err: BookingError = CoreError::NoActiveDraft.into();
        assert!(err.is_draft_side());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(BookingError::Collaborator("timeout".into()).is_retryable());
        assert!(BookingError::Storage(DbError::PoolExhausted).is_retryable());

        assert!(!BookingError::CommitConflict {
            record_id: "x".into()
        }
        .is_retryable());
        assert!(!BookingError::InvalidCredential("bad".into()).is_retryable());
        assert!(!BookingError::Storage(DbError::not_found("Record", "x")).is_retryable());
    }

    #[test]
    fn test_attempt_ending_errors() {
        assert!(BookingError::Cancelled.ends_attempt());
        assert!(BookingError::PaymentDeclined("card".into()).ends_attempt());
        assert!(BookingError::PaymentPending {
            order_id: Uuid::nil()
        }
        .ends_attempt());
        assert!(!BookingError::InsufficientFunds {
            required: Money::from_rupees(41),
            available: Money::from_rupees(30),
        }
        .ends_attempt());
        assert!(!BookingError::CommitInFlight.ends_attempt());
    }

    #[test]
    fn test_error_display() {
        let err = BookingError::InsufficientFunds {
            required: Money::from_rupees(41),
            available: Money::from_rupees(30),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient wallet balance: need ₹41.00, have ₹30.00"
        );

        let err = BookingError::AlreadyUsed {
            code: "TKT-0000000042".into(),
            status: RecordStatus::Boarded,
        };
        assert!(err.to_string().contains("boarded"));
    }
}
