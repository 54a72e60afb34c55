//! # Online Payment Reservations
//!
//! While the gateway is charging an order, the frozen payload is parked here
//! under its order id. Whoever claims the reservation first (the awaited
//! charge or the gateway callback) is the one that commits the record.
//!
//! ```text
//!  reserve(payload) ──► [order_id → payload, expires_at]
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!   claim (success)     release (decline,    purge (TTL passed,
//!   → commit PAID        cancel, abandon)     nobody answered)
//! ```

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use villagelink_core::{Clock, CommitPayload};

/// A payload waiting for the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub order_id: Uuid,
    pub payload: CommitPayload,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Pending online orders keyed by order id.
pub struct ReservationBook {
    entries: Mutex<HashMap<Uuid, Reservation>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ReservationBook {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        ReservationBook {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Reservation>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        entries.retain(|order_id, r| {
            let keep = r.expires_at > now;
            if !keep {
                debug!(%order_id, "Reservation expired");
            }
            keep
        });
        entries
    }

    /// Parks `payload` under its record id, replacing an older reservation
    /// for the same attempt.
    pub fn reserve(&self, payload: CommitPayload) -> Reservation {
        let now = self.clock.now();
        let reservation = Reservation {
            order_id: payload.record_id,
            payload,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.lock()
            .insert(reservation.order_id, reservation.clone());
        reservation
    }

    /// Takes the reservation out. Only one caller ever gets `Some`.
    pub fn claim(&self, order_id: Uuid) -> Option<Reservation> {
        self.lock().remove(&order_id)
    }

    /// Drops the reservation without committing anything.
    pub fn release(&self, order_id: Uuid) -> bool {
        self.lock().remove(&order_id).is_some()
    }

    pub fn contains(&self, order_id: Uuid) -> bool {
        self.lock().contains_key(&order_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
