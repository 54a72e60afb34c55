//! # Credential Lifecycle
//!
//! Pure time math for the rotating QR credential shown to the passenger.
//!
//! ## State Machine
//! ```text
//!  issued_at                      refresh_at          expires_at
//!      │                               │                   │
//!      ▼                               ▼                   ▼
//!  ────●───────────────────────────────●───────────────────●──────────► t
//!   ISSUED            ACTIVE              NEAR_EXPIRY          EXPIRED
//!                                  (refresh requested)   (never shown)
//! ```
//!
//! A successful refresh starts a brand new window. A failed refresh leaves the
//! credential in NEAR_EXPIRY until someone refreshes it by hand or it expires.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Lengths of the credential window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialWindow {
    pub window: Duration,
    pub near_expiry: Duration,
}

impl CredentialWindow {
    pub fn from_secs(window_secs: u64, near_expiry_secs: u64) -> Self {
        CredentialWindow {
            window: Duration::seconds(window_secs as i64),
            near_expiry: Duration::seconds(near_expiry_secs as i64),
        }
    }
}

impl Default for CredentialWindow {
    fn default() -> Self {
        CredentialWindow::from_secs(300, 30)
    }
}

/// Where a credential is in its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPhase {
    Issued,
    Active,
    NearExpiry,
    Expired,
}

/// What the display layer may show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Presentation {
    /// Render this payload as a QR code.
    Show { payload: String, seconds_left: i64 },
    /// Block interaction and show "expired, refreshing…".
    ExpiredRefreshing,
}

/// A signed, expiring token bound to one committed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Credential {
    pub record_id: String,
    pub code: String,
    /// Opaque token encoded into the QR.
    pub payload: String,
    #[ts(as = "String")]
    pub issued_at: DateTime<Utc>,
    /// Start of the near-expiry phase; a refresh is requested from here on.
    #[ts(as = "String")]
    pub refresh_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    /// Whether this credential came from a refresh rather than first issue.
    pub refreshed: bool,
}

impl Credential {
    /// Creates a credential whose window starts at `now`.
    pub fn issue(
        record_id: impl Into<String>,
        code: impl Into<String>,
        payload: impl Into<String>,
        now: DateTime<Utc>,
        window: CredentialWindow,
    ) -> Self {
        let expires_at = now + window.window;
        Credential {
            record_id: record_id.into(),
            code: code.into(),
            payload: payload.into(),
            issued_at: now,
            refresh_at: expires_at - window.near_expiry,
            expires_at,
            refreshed: false,
        }
    }

    /// The same binding with a new payload and a fresh window.
    pub fn renewed(
        &self,
        payload: impl Into<String>,
        now: DateTime<Utc>,
        window: CredentialWindow,
    ) -> Self {
        Credential {
            refreshed: true,
            ..Credential::issue(
                self.record_id.clone(),
                self.code.clone(),
                payload,
                now,
                window,
            )
        }
    }

    pub fn phase(&self, now: DateTime<Utc>) -> CredentialPhase {
        if now >= self.expires_at {
            CredentialPhase::Expired
        } else if now >= self.refresh_at {
            CredentialPhase::NearExpiry
        } else if now <= self.issued_at {
            CredentialPhase::Issued
        } else {
            CredentialPhase::Active
        }
    }

    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// What the display layer may show at `now`. Expired payloads are never
    /// returned.
    pub fn present(&self, now: DateTime<Utc>) -> Presentation {
        if self.is_expired(now) {
            Presentation::ExpiredRefreshing
        } else {
            Presentation::Show {
                payload: self.payload.clone(),
                seconds_left: (self.expires_at - now).num_seconds(),
            }
        }
    }
}
