//! # Signing
//!
//! HMAC-SHA256 signatures for settlement references and QR credentials.
//!
//! ## Credential Payload
//! ```text
//! VLQ|code=TKT-0000000042|exp=1718000300|sig=5f2c…(64 hex chars)
//!      │                  │               │
//!      │                  │               └── HMAC over "VLQ|code=…|exp=…"
//!      │                  └── unix seconds; checked against the scanner's clock
//!      └── canonical record code
//! ```
//! Signatures are compared in constant time.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;

use villagelink_core::code::normalize_code;
use villagelink_core::CommittedRecord;

use crate::error::{BookingError, BookingResult};
use crate::services::{CredentialIssuer, PayloadSigner, VerifiedPayload};

type HmacSha256 = Hmac<Sha256>;

/// Leading tag of every credential payload.
pub const PAYLOAD_PREFIX: &str = "VLQ";

fn keyed_mac(key: &[u8]) -> BookingResult<HmacSha256> {
    if key.is_empty() {
        return Err(BookingError::Config("signing key must not be empty".into()));
    }
    HmacSha256::new_from_slice(key).map_err(|e| BookingError::Config(e.to_string()))
}

fn hex_mac(base: &HmacSha256, message: &str) -> String {
    let mut mac = base.clone();
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

// =============================================================================
// Record Signer
// =============================================================================

/// Signs the immutable fields of a committed record.
#[derive(Clone)]
pub struct HmacSigner {
    mac: HmacSha256,
}

impl HmacSigner {
    pub fn new(key: &[u8]) -> BookingResult<Self> {
        Ok(HmacSigner {
            mac: keyed_mac(key)?,
        })
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}

impl PayloadSigner for HmacSigner {
    fn sign(&self, record: &CommittedRecord) -> String {
        let message = format!(
            "{}|{}|{}|{}|{}|{}",
            record.id,
            record.code,
            record.owner_id,
            record.total_price_paise,
            record.payment_method.as_str(),
            record.status.as_str(),
        );
        hex_mac(&self.mac, &message)
    }
}

// =============================================================================
// Credential Issuer
// =============================================================================

/// Issues and verifies `VLQ|…` credential payloads with a shared key.
#[derive(Clone)]
pub struct HmacCredentialIssuer {
    mac: HmacSha256,
}

impl HmacCredentialIssuer {
    pub fn new(key: &[u8]) -> BookingResult<Self> {
        Ok(HmacCredentialIssuer {
            mac: keyed_mac(key)?,
        })
    }

    fn body(code: &str, expires_unix: i64) -> String {
        format!("{PAYLOAD_PREFIX}|code={code}|exp={expires_unix}")
    }

    /// Builds a payload synchronously.
    pub fn payload_for(&self, code: &str, expires_at: DateTime<Utc>) -> String {
        let body = Self::body(code, expires_at.timestamp());
        let sig = hex_mac(&self.mac, &body);
        format!("{body}|sig={sig}")
    }
}

impl fmt::Debug for HmacCredentialIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacCredentialIssuer").finish_non_exhaustive()
    }
}

/// Whether a scanned string looks like a credential payload rather than a
/// hand-typed code.
pub fn is_credential_payload(raw: &str) -> bool {
    raw.trim_start()
        .strip_prefix(PAYLOAD_PREFIX)
        .is_some_and(|rest| rest.starts_with('|'))
}

fn parse_payload(raw: &str) -> BookingResult<(String, i64, String)> {
    let invalid = || BookingError::InvalidCredential("malformed payload".into());

    let mut parts = raw.trim().split('|');
    if parts.next() != Some(PAYLOAD_PREFIX) {
        return Err(invalid());
    }

    let mut code = None;
    let mut exp = None;
    let mut sig = None;
    for kv in parts {
        let Some((k, v)) = kv.split_once('=') else {
            return Err(invalid());
        };
        match k {
            "code" => code = Some(v.to_string()),
            "exp" => exp = Some(v.parse::<i64>().map_err(|_| invalid())?),
            "sig" => sig = Some(v.to_string()),
            _ => return Err(invalid()),
        }
    }

    match (code, exp, sig) {
        (Some(code), Some(exp), Some(sig)) if !code.is_empty() && !sig.is_empty() => {
            Ok((code, exp, sig))
        }
        _ => Err(invalid()),
    }
}

#[async_trait]
impl CredentialIssuer for HmacCredentialIssuer {
    async fn issue(&self, code: &str, expires_at: DateTime<Utc>) -> BookingResult<String> {
        Ok(self.payload_for(code, expires_at))
    }

    fn verify(&self, payload: &str) -> BookingResult<VerifiedPayload> {
        let (code, exp, sig) = parse_payload(payload)?;

        let expected = hex_mac(&self.mac, &Self::body(&code, exp));
        if expected.as_bytes().ct_eq(sig.as_bytes()).unwrap_u8() != 1 {
            return Err(BookingError::InvalidCredential("signature mismatch".into()));
        }

        let (_, canonical) = normalize_code(&code)
            .map_err(|_| BookingError::InvalidCredential("malformed code".into()))?;
        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .ok_or_else(|| BookingError::InvalidCredential("malformed expiry".into()))?;

        Ok(VerifiedPayload {
            code: canonical,
            expires_at,
        })
    }
}
