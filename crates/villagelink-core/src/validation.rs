//! # Validation Module
//!
//! Input validation rules for booking drafts and validation requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Booking UI                                                   │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Draft Store (Rust)                                           │
//! │  └── THIS MODULE: business rule validation on every mutator            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── UNIQUE (id), UNIQUE (code)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use villagelink_core::validation::{normalize_recipient, validate_passenger_count};
//!
//! validate_passenger_count(2).unwrap();
//! assert_eq!(normalize_recipient("+91 98765-43210").unwrap(), "+919876543210");
//! ```

use uuid::Uuid;

use crate::error::ValidationError;
use crate::MAX_PASSENGERS;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Shortest accepted recipient phone number, in digits.
pub const MIN_RECIPIENT_DIGITS: usize = 10;
/// Longest accepted recipient phone number, in digits.
pub const MAX_RECIPIENT_DIGITS: usize = 13;

const MAX_PLACE_NAME_LEN: usize = 120;
const MAX_ACTOR_ID_LEN: usize = 64;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a passenger count.
///
/// ## Rules
/// - At least 1
/// - At most [`MAX_PASSENGERS`]
///
/// ## Example
/// ```rust
/// use villagelink_core::validation::validate_passenger_count;
///
/// assert!(validate_passenger_count(1).is_ok());
/// assert!(validate_passenger_count(0).is_err());
/// assert!(validate_passenger_count(51).is_err());
/// ```
pub fn validate_passenger_count(count: u32) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::MustBePositive {
            field: "passenger count".to_string(),
        });
    }

    if count > MAX_PASSENGERS {
        return Err(ValidationError::OutOfRange {
            field: "passenger count".to_string(),
            min: 1,
            max: MAX_PASSENGERS as i64,
        });
    }

    Ok(())
}

/// Validates a fee or reward rate in basis points (0-10000).
pub fn validate_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10_000,
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates and normalizes a gift recipient's phone number.
///
/// ## Rules
/// - Spaces and hyphens are dropped
/// - Optional leading `+`
/// - Then 10 to 13 digits, nothing else
///
/// ## Example
/// ```rust
/// use villagelink_core::validation::normalize_recipient;
///
/// assert_eq!(normalize_recipient("98765 43210").unwrap(), "9876543210");
/// assert!(normalize_recipient("12345").is_err());
/// assert!(normalize_recipient("call me").is_err());
/// ```
pub fn normalize_recipient(raw: &str) -> ValidationResult<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if compact.is_empty() {
        return Err(ValidationError::Required {
            field: "recipient".to_string(),
        });
    }

    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "recipient".to_string(),
            reason: "must be a phone number".to_string(),
        });
    }

    if digits.len() < MIN_RECIPIENT_DIGITS {
        return Err(ValidationError::TooShort {
            field: "recipient".to_string(),
            min: MIN_RECIPIENT_DIGITS,
        });
    }

    if digits.len() > MAX_RECIPIENT_DIGITS {
        return Err(ValidationError::TooLong {
            field: "recipient".to_string(),
            max: MAX_RECIPIENT_DIGITS,
        });
    }

    Ok(compact)
}

/// Validates an origin or destination name.
pub fn validate_place_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > MAX_PLACE_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_PLACE_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates an owner or validating-actor identifier.
pub fn validate_actor_id(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > MAX_ACTOR_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ACTOR_ID_LEN,
        });
    }

    Ok(())
}

/// Validates a UUID string.
pub fn validate_uuid(field: &str, value: &str) -> ValidationResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passenger_count_bounds() {
        assert!(validate_passenger_count(1).is_ok());
        assert!(validate_passenger_count(MAX_PASSENGERS).is_ok());
        assert!(matches!(
            validate_passenger_count(0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_passenger_count(MAX_PASSENGERS + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_recipient_accepts_common_forms() {
        assert_eq!(normalize_recipient("9876543210").unwrap(), "9876543210");
        assert_eq!(
            normalize_recipient("+91-98765-43210").unwrap(),
            "+919876543210"
        );
        assert_eq!(normalize_recipient(" 098765 43210 ").unwrap(), "09876543210");
    }

    #[test]
    fn test_recipient_rejects_bad_input() {
        assert!(matches!(
            normalize_recipient("   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            normalize_recipient("98765"),
            Err(ValidationError::TooShort { .. })
        ));
        assert!(matches!(
            normalize_recipient("12345678901234"),
            Err(ValidationError::TooLong { .. })
        ));
        assert!(matches!(
            normalize_recipient("98765x43210"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(normalize_recipient("++9876543210").is_err());
    }

    #[test]
    fn test_place_and_actor() {
        assert!(validate_place_name("origin", "Rampur").is_ok());
        assert!(validate_place_name("origin", "  ").is_err());
        assert!(validate_actor_id("validator", "driver-7").is_ok());
        assert!(validate_actor_id("validator", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_bps_and_uuid() {
        assert!(validate_bps("platform_fee_bps", 1000).is_ok());
        assert!(validate_bps("platform_fee_bps", 10_001).is_err());
        assert!(validate_uuid("id", "not-a-uuid").is_err());
        assert!(validate_uuid("id", &Uuid::new_v4().to_string()).is_ok());
    }
}
