//! # Error Types
//!
//! Domain-specific error types for villagelink-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  villagelink-core errors (this file)                                   │
//! │  ├── CoreError        - Draft preconditions, transitions, payloads     │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  villagelink-db errors (separate crate)                                │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  villagelink-booking errors                                            │
//! │  └── BookingError     - What the UI sees (full taxonomy)               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → BookingError → UI                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::{PaymentMethod, RecordKind, RecordStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A draft input required for the requested operation is missing.
    ///
    /// ## When This Occurs
    /// - Requesting a quote before the route or base fare is known
    /// - Committing without a payment method
    /// - Gift flag set but no recipient contact given
    #[error("Cannot continue: {field} is missing")]
    MissingInput { field: String },

    /// A draft mutator was called with no draft in progress.
    #[error("No booking draft in progress")]
    NoActiveDraft,

    /// The selected payment path needs a live connection.
    ///
    /// ## User Workflow
    /// ```text
    /// Select ONLINE ──► commit() while offline
    ///      │
    ///      ▼
    /// Connectivity { method: Online, .. }
    ///      │
    ///      ▼
    /// UI: "No network. Pay cash to the driver or retry later."
    /// ```
    #[error("{method} payment for a {kind} needs a network connection")]
    Connectivity {
        method: PaymentMethod,
        kind: RecordKind,
    },

    /// A status change would move a record backward or out of a terminal state.
    #[error("Record {code} cannot move from {from} to {to}")]
    InvalidTransition {
        code: String,
        from: RecordStatus,
        to: RecordStatus,
    },

    /// A queued commit payload could not be decoded.
    #[error("Malformed commit payload: {0}")]
    MalformedPayload(String),
}

impl CoreError {
    /// Creates a MissingInput error for the named draft field.
    pub fn missing(field: impl Into<String>) -> Self {
        CoreError::MissingInput {
            field: field.into(),
        }
    }

    /// Returns true for errors the user fixes by completing the draft.
    pub fn is_precondition(&self) -> bool {
        matches!(self, CoreError::MissingInput { .. } | CoreError::NoActiveDraft)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed ticket code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
