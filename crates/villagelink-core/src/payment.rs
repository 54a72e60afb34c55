//! # Payment Selector
//!
//! Chooses how a commit is executed for the selected payment method.
//!
//! ## Strategy Table
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────────────────────────┐
//! │ Method       │ Online               │ Offline                          │
//! ├──────────────┼──────────────────────┼──────────────────────────────────┤
//! │ ONLINE       │ Online { order_id }  │ ConnectivityError                │
//! │ WALLET_COIN  │ WalletCoin           │ ConnectivityError                │
//! │ CASH         │ Cash                 │ QueueOffline (queueable kinds)   │
//! │              │                      │ ConnectivityError (otherwise)    │
//! └──────────────┴──────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Live-only paths fail fast while offline. Queuing them would risk charging
//! twice if the gateway had partly processed the first request.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::types::{CommitPayload, PaymentMethod};

/// Network state as last reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    #[inline]
    pub const fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

/// How the commit engine executes a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum ExecutionStrategy {
    /// Charge through the gateway, then commit `Paid`.
    ///
    /// `order_id` is issued before the gateway is called so its callback
    /// binds to exactly one record.
    Online { order_id: Uuid },
    /// Commit `Pending`; settle when the credential is validated.
    Cash,
    /// Debit the wallet, then commit `Paid`.
    WalletCoin,
    /// Append to the offline queue; commit `Pending` on reconnection.
    QueueOffline,
}

/// Selects the execution strategy for a frozen commit payload.
///
/// `queueable` says whether the payload's record kind may be queued offline.
///
/// ## Example
/// ```rust
/// use villagelink_core::payment::{select_strategy, Connectivity, ExecutionStrategy};
/// # use villagelink_core::types::*;
/// # use villagelink_core::money::Money;
/// # let payload = CommitPayload {
/// #     record_id: uuid::Uuid::new_v4(), code: "TKT-0000000001".into(),
/// #     kind: RecordKind::Ticket, owner_id: "p".into(), origin: "a".into(),
/// #     destination: "b".into(), distance_m: 1, passenger_count: 1,
/// #     add_ons: AddOns::default(), gift_recipient: None,
/// #     payment_method: PaymentMethod::Cash, total_price: Money::zero(),
/// #     quoted_at: chrono::Utc::now(),
/// # };
/// let strategy = select_strategy(&payload, Connectivity::Offline, true).unwrap();
/// assert_eq!(strategy, ExecutionStrategy::QueueOffline);
/// ```
pub fn select_strategy(
    payload: &CommitPayload,
    connectivity: Connectivity,
    queueable: bool,
) -> CoreResult<ExecutionStrategy> {
    let method = payload.payment_method;
    match (method, connectivity) {
        (PaymentMethod::Online, Connectivity::Online) => Ok(ExecutionStrategy::Online {
            order_id: payload.record_id,
        }),
        (PaymentMethod::WalletCoin, Connectivity::Online) => Ok(ExecutionStrategy::WalletCoin),
        (PaymentMethod::Cash, Connectivity::Online) => Ok(ExecutionStrategy::Cash),
        (PaymentMethod::Cash, Connectivity::Offline) if queueable => {
            Ok(ExecutionStrategy::QueueOffline)
        }
        (_, Connectivity::Offline) => Err(CoreError::Connectivity {
            method,
            kind: payload.kind,
        }),
    }
}
