//! # Record Codes
//!
//! Generation and normalization of the human/QR-facing record code.
//!
//! ## Format
//! ```text
//!   TKT-0123456789
//!   ─┬─ ────┬─────
//!    │      └── ten digits derived from the record UUID
//!    └───────── kind prefix (TKT, PAS, RNT, PCL)
//! ```
//!
//! Conductors type codes by hand when a QR will not scan, so
//! [`normalize_code`] accepts the usual noise: lowercase, spaces, missing or
//! doubled hyphens, stray punctuation.

use uuid::Uuid;

use crate::error::ValidationError;
use crate::types::RecordKind;
use crate::CODE_DIGITS;

const CODE_MODULUS: u128 = 10_000_000_000;

/// Derives the canonical code for a record.
///
/// Deterministic: the same UUID always yields the same code, so a replayed
/// offline commit carries the code it would have had online.
///
/// ## Example
/// ```rust
/// use uuid::Uuid;
/// use villagelink_core::code::code_for;
/// use villagelink_core::types::RecordKind;
///
/// let id = Uuid::new_v4();
/// let code = code_for(RecordKind::Ticket, id);
/// assert!(code.starts_with("TKT-"));
/// assert_eq!(code, code_for(RecordKind::Ticket, id));
/// ```
pub fn code_for(kind: RecordKind, record_id: Uuid) -> String {
    let digits = record_id.as_u128() % CODE_MODULUS;
    format!("{}-{:0width$}", kind.code_prefix(), digits, width = CODE_DIGITS)
}

/// Normalizes a raw code into `PREFIX-NNNNNNNNNN`, returning the kind too.
///
/// ## Steps
/// 1. Drop every non-alphanumeric character
/// 2. Uppercase
/// 3. Split into leading letters and trailing digits
/// 4. Require a known prefix and exactly ten digits
///
/// ## Example
/// ```rust
/// use villagelink_core::code::normalize_code;
/// use villagelink_core::types::RecordKind;
///
/// let (kind, code) = normalize_code(" tkt 01234-56789 ").unwrap();
/// assert_eq!(kind, RecordKind::Ticket);
/// assert_eq!(code, "TKT-0123456789");
/// assert!(normalize_code("TKT-123").is_err());
/// ```
pub fn normalize_code(raw: &str) -> Result<(RecordKind, String), ValidationError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    let split = cleaned
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cleaned.len());
    let (prefix, digits) = cleaned.split_at(split);

    let kind = RecordKind::from_prefix(prefix).ok_or_else(|| ValidationError::InvalidFormat {
        field: "code".to_string(),
        reason: format!("unknown prefix '{}'", prefix),
    })?;

    if digits.len() != CODE_DIGITS || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: format!("expected {} digits after {}", CODE_DIGITS, prefix),
        });
    }

    Ok((kind, format!("{}-{}", prefix, digits)))
}
