//! # Booking Draft Store
//!
//! Holds the single booking a user is assembling before commit.
//!
//! ## Draft Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Draft Store Operations                               │
//! │                                                                         │
//! │  UI Action                Store Mutator             Effect              │
//! │  ─────────                ─────────────             ──────              │
//! │                                                                         │
//! │  Pick stops ─────────────► set_route() ──────────► route, fare cleared  │
//! │  Fare arrives ───────────► set_base_fare() ──────► fare                 │
//! │  +/- passengers ─────────► set_passenger_count() ► count (1..=50)       │
//! │  Toggle livestock ───────► set_add_on() ─────────► flag                 │
//! │  "Send as gift" ─────────► set_gift() ───────────► flag + recipient     │
//! │  Pick payment ───────────► select_payment_method()                      │
//! │                                                                         │
//! │  EVERY mutator ──► recompute() ──► compose() ──► PriceQuote             │
//! │                                                                         │
//! │  Commit / failure ───────► reset() ──────────────► fresh empty draft    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store is the only writer of the draft. Downstream components read a
//! [`CommitPayload`] snapshot and never see the mutable draft.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::clock::Clock;
use crate::code::code_for;
use crate::error::{CoreError, CoreResult};
use crate::fare::{compose, AddOnFees, PriceQuote, SubsidyPolicy};
use crate::types::{
    AddOn, AddOns, CommitPayload, FareBreakdown, PaymentMethod, RecordKind, RouteSummary,
};
use crate::validation::{
    normalize_recipient, validate_actor_id, validate_passenger_count, validate_place_name,
};

// =============================================================================
// Booking Draft
// =============================================================================

/// An uncommitted, mutable booking-in-progress.
///
/// ## Invariants
/// - `passenger_count >= 1`
/// - `gift_recipient.is_some()` implies `add_ons.gift`
/// - `fare` always belongs to the current `route` (cleared when the route changes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BookingDraft {
    /// Client-generated id this attempt will be committed under.
    #[ts(as = "String")]
    pub attempt_id: Uuid,
    pub owner_id: String,
    pub kind: RecordKind,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub route: Option<RouteSummary>,
    pub fare: Option<FareBreakdown>,
    pub passenger_count: u32,
    pub add_ons: AddOns,
    pub gift_recipient: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl BookingDraft {
    /// Creates an empty draft for one passenger.
    pub fn new(owner_id: impl Into<String>, kind: RecordKind, now: DateTime<Utc>) -> Self {
        BookingDraft {
            attempt_id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            kind,
            origin: None,
            destination: None,
            route: None,
            fare: None,
            passenger_count: 1,
            add_ons: AddOns::default(),
            gift_recipient: None,
            payment_method: None,
            created_at: now,
        }
    }

    fn set_route(
        &mut self,
        origin: &str,
        destination: &str,
        route: RouteSummary,
    ) -> CoreResult<()> {
        validate_place_name("origin", origin)?;
        validate_place_name("destination", destination)?;
        self.origin = Some(origin.trim().to_string());
        self.destination = Some(destination.trim().to_string());
        self.route = Some(route);
        self.fare = None;
        Ok(())
    }

    fn set_passenger_count(&mut self, count: u32) -> CoreResult<()> {
        validate_passenger_count(count)?;
        self.passenger_count = count;
        Ok(())
    }

    fn set_add_on(&mut self, flag: AddOn, value: bool) {
        self.add_ons.set(flag, value);
        if flag == AddOn::Gift && !value {
            self.gift_recipient = None;
        }
    }

    fn set_gift(&mut self, recipient: Option<&str>) -> CoreResult<()> {
        match recipient {
            Some(raw) => {
                let normalized = normalize_recipient(raw)?;
                self.add_ons.gift = true;
                self.gift_recipient = Some(normalized);
            }
            None => {
                self.add_ons.gift = false;
                self.gift_recipient = None;
            }
        }
        Ok(())
    }

    /// Returns the frozen commit snapshot, or the first missing input.
    ///
    /// ## Preconditions (checked in order)
    /// 1. Route
    /// 2. Base fare
    /// 3. Payment method
    /// 4. Gift recipient, when the gift flag is set
    pub fn ready_for_commit(
        &self,
        quote: &PriceQuote,
        now: DateTime<Utc>,
    ) -> CoreResult<CommitPayload> {
        let (origin, destination, route) = match (&self.origin, &self.destination, &self.route) {
            (Some(o), Some(d), Some(r)) => (o, d, r),
            _ => return Err(CoreError::missing("route")),
        };
        if self.fare.is_none() {
            return Err(CoreError::missing("base fare"));
        }
        let payment_method = self
            .payment_method
            .ok_or_else(|| CoreError::missing("payment method"))?;
        if self.add_ons.gift && self.gift_recipient.is_none() {
            return Err(CoreError::missing("gift recipient"));
        }

        Ok(CommitPayload {
            record_id: self.attempt_id,
            code: code_for(self.kind, self.attempt_id),
            kind: self.kind,
            owner_id: self.owner_id.clone(),
            origin: origin.clone(),
            destination: destination.clone(),
            distance_m: route.distance_m,
            passenger_count: self.passenger_count,
            add_ons: self.add_ons,
            gift_recipient: self.gift_recipient.clone(),
            payment_method,
            total_price: quote.total_fare(),
            quoted_at: now,
        })
    }
}

// =============================================================================
// Draft Patch
// =============================================================================

/// Change to the gift option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum GiftPatch {
    Send { recipient: String },
    Clear,
}

/// A batch of draft edits from the UI, applied all-or-nothing.
///
/// Origin/destination changes need an external route lookup first; the
/// caller resolves them into a [`ResolvedRoute`] before applying the patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DraftPatch {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub passenger_count: Option<u32>,
    #[serde(default)]
    pub livestock: Option<bool>,
    #[serde(default)]
    pub insurance: Option<bool>,
    #[serde(default)]
    pub gift: Option<GiftPatch>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl DraftPatch {
    /// Whether applying this patch requires a route lookup.
    pub fn changes_route(&self) -> bool {
        self.origin.is_some() || self.destination.is_some()
    }
}

/// A route and fare looked up for a patch's origin/destination.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRoute {
    pub origin: String,
    pub destination: String,
    pub route: RouteSummary,
    pub fare: FareBreakdown,
}

// =============================================================================
// Draft Store
// =============================================================================

/// Owns the in-flight draft and its derived quote.
///
/// ## Thread Safety
/// The store itself is not synchronized; the booking engine wraps it in a
/// `Mutex` so only one edit runs at a time.
pub struct DraftStore {
    draft: Option<BookingDraft>,
    quote: Option<PriceQuote>,
    subsidy: Arc<dyn SubsidyPolicy>,
    add_on_fees: AddOnFees,
    clock: Arc<dyn Clock>,
}

impl DraftStore {
    pub fn new(
        subsidy: Arc<dyn SubsidyPolicy>,
        add_on_fees: AddOnFees,
        clock: Arc<dyn Clock>,
    ) -> Self {
        DraftStore {
            draft: None,
            quote: None,
            subsidy,
            add_on_fees,
            clock,
        }
    }

    /// Starts a new draft, replacing any previous one.
    pub fn create_draft(&mut self, owner_id: &str, kind: RecordKind) -> CoreResult<&BookingDraft> {
        validate_actor_id("owner", owner_id)?;
        let draft = BookingDraft::new(owner_id.trim(), kind, self.clock.now());
        self.quote = None;
        Ok(self.draft.insert(draft))
    }

    /// The current draft, if any.
    pub fn draft(&self) -> Option<&BookingDraft> {
        self.draft.as_ref()
    }

    pub fn set_route(
        &mut self,
        origin: &str,
        destination: &str,
        route: RouteSummary,
    ) -> CoreResult<()> {
        self.mutate(|d| d.set_route(origin, destination, route))
    }

    pub fn set_base_fare(&mut self, fare: FareBreakdown) -> CoreResult<()> {
        self.mutate(|d| {
            if d.route.is_none() {
                return Err(CoreError::missing("route"));
            }
            d.fare = Some(fare);
            Ok(())
        })
    }

    pub fn set_passenger_count(&mut self, count: u32) -> CoreResult<()> {
        self.mutate(|d| d.set_passenger_count(count))
    }

    pub fn set_add_on(&mut self, flag: AddOn, value: bool) -> CoreResult<()> {
        self.mutate(|d| {
            d.set_add_on(flag, value);
            Ok(())
        })
    }

    /// Sets (`Some`) or clears (`None`) the gift recipient.
    pub fn set_gift(&mut self, recipient: Option<&str>) -> CoreResult<()> {
        self.mutate(|d| d.set_gift(recipient))
    }

    pub fn select_payment_method(&mut self, method: PaymentMethod) -> CoreResult<()> {
        self.mutate(|d| {
            d.payment_method = Some(method);
            Ok(())
        })
    }

    /// Applies a patch atomically: on any validation failure the draft is
    /// left exactly as it was.
    pub fn apply_patch(
        &mut self,
        patch: &DraftPatch,
        resolved: Option<ResolvedRoute>,
    ) -> CoreResult<()> {
        self.mutate(|d| {
            if let Some(resolved) = resolved {
                d.set_route(&resolved.origin, &resolved.destination, resolved.route)?;
                d.fare = Some(resolved.fare);
            } else if patch.changes_route() {
                return Err(CoreError::missing("route"));
            }
            if let Some(count) = patch.passenger_count {
                d.set_passenger_count(count)?;
            }
            if let Some(value) = patch.livestock {
                d.set_add_on(AddOn::Livestock, value);
            }
            if let Some(value) = patch.insurance {
                d.set_add_on(AddOn::Insurance, value);
            }
            match &patch.gift {
                Some(GiftPatch::Send { recipient }) => d.set_gift(Some(recipient))?,
                Some(GiftPatch::Clear) => d.set_gift(None)?,
                None => {}
            }
            if let Some(method) = patch.payment_method {
                d.payment_method = Some(method);
            }
            Ok(())
        })
    }

    /// Clears the draft back to empty, keeping the owner and kind.
    ///
    /// A fresh attempt id is allocated so the next booking never collides
    /// with the one just finished.
    pub fn reset(&mut self) {
        if let Some(previous) = self.draft.take() {
            self.draft = Some(BookingDraft::new(
                previous.owner_id,
                previous.kind,
                self.clock.now(),
            ));
        }
        self.quote = None;
    }

    /// The current quote, recomputed against the current time.
    pub fn quote(&mut self) -> CoreResult<PriceQuote> {
        if self.draft.is_none() {
            return Err(CoreError::NoActiveDraft);
        }
        self.recompute();
        match (&self.quote, &self.draft) {
            (Some(quote), _) => Ok(quote.clone()),
            (None, Some(d)) => Err(draft_precondition(d)),
            (None, None) => Err(CoreError::NoActiveDraft),
        }
    }

    /// The quote as of the last mutator, without recomputing.
    pub fn last_quote(&self) -> Option<&PriceQuote> {
        self.quote.as_ref()
    }

    /// Freezes the draft into a commit snapshot priced by a fresh quote.
    pub fn commit_payload(&mut self) -> CoreResult<CommitPayload> {
        self.recompute();
        let draft = self.draft.as_ref().ok_or(CoreError::NoActiveDraft)?;
        match &self.quote {
            Some(quote) => draft.ready_for_commit(quote, self.clock.now()),
            None => Err(draft_precondition(draft)),
        }
    }

    fn mutate<F>(&mut self, edit: F) -> CoreResult<()>
    where
        F: FnOnce(&mut BookingDraft) -> CoreResult<()>,
    {
        let current = self.draft.as_ref().ok_or(CoreError::NoActiveDraft)?;
        let mut next = current.clone();
        edit(&mut next)?;
        self.draft = Some(next);
        self.recompute();
        Ok(())
    }

    /// Recomputes the quote from the current draft. Subsidy is asked fresh.
    fn recompute(&mut self) {
        self.quote = self.draft.as_ref().and_then(|d| {
            let route = d.route.as_ref()?;
            let fare = d.fare.as_ref()?;
            let subsidy = self.subsidy.subsidy(route, self.clock.now(), fare);
            Some(compose(
                fare.base,
                fare.surge,
                fare.discount,
                subsidy,
                d.passenger_count,
                &self.add_on_fees.fees_for(&d.add_ons),
            ))
        });
    }
}

/// The first missing pricing input of a draft that has no quote.
fn draft_precondition(draft: &BookingDraft) -> CoreError {
    if draft.route.is_none() {
        CoreError::missing("route")
    } else {
        CoreError::missing("base fare")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::fare::{DistanceSubsidy, NoSubsidy};
    use crate::money::Money;

    fn rs(r: i64) -> Money {
        Money::from_rupees(r)
    }

    fn fare(base: i64, surge: i64) -> FareBreakdown {
        FareBreakdown {
            base: rs(base),
            surge: rs(surge),
            discount: rs(0),
            message: None,
        }
    }

    fn store_with(subsidy: Arc<dyn SubsidyPolicy>) -> DraftStore {
        let fees = AddOnFees {
            livestock: rs(10),
            insurance: rs(1),
            gift: rs(0),
        };
        DraftStore::new(subsidy, fees, Arc::new(ManualClock::epoch()))
    }

    fn ready_store() -> DraftStore {
        let mut store = store_with(Arc::new(NoSubsidy));
        store.create_draft("passenger-1", RecordKind::Ticket).unwrap();
        store
            .set_route("Rampur", "Sitapur", RouteSummary::with_distance(12_000))
            .unwrap();
        store.set_base_fare(fare(20, 5)).unwrap();
        store
    }

    #[test]
    fn test_mutators_require_a_draft() {
        let mut store = store_with(Arc::new(NoSubsidy));
        assert!(matches!(
            store.set_passenger_count(2),
            Err(CoreError::NoActiveDraft)
        ));
        assert!(matches!(store.quote(), Err(CoreError::NoActiveDraft)));
    }

    #[test]
    fn test_every_mutator_recomputes() {
        let mut store = ready_store();
        assert_eq!(store.last_quote().unwrap().total_fare(), rs(25));

        store.set_passenger_count(2).unwrap();
        assert_eq!(store.last_quote().unwrap().total_fare(), rs(50));

        store.set_add_on(AddOn::Insurance, true).unwrap();
        assert_eq!(store.last_quote().unwrap().total_fare(), rs(51));
    }

    #[test]
    fn test_worked_example_through_store() {
        let policy = DistanceSubsidy {
            min_distance_m: 5_000,
            amount: rs(5),
            active_hours_utc: None,
        };
        let mut store = store_with(Arc::new(policy));
        store.create_draft("passenger-1", RecordKind::Ticket).unwrap();
        store
            .set_route("Rampur", "Sitapur", RouteSummary::with_distance(12_000))
            .unwrap();
        store.set_base_fare(fare(20, 5)).unwrap();
        store.set_passenger_count(2).unwrap();
        store.set_add_on(AddOn::Insurance, true).unwrap();

        assert_eq!(store.quote().unwrap().total_fare(), rs(41));

        // A shorter route loses the subsidy on the very next recompute.
        store
            .set_route("Rampur", "Kheri", RouteSummary::with_distance(3_000))
            .unwrap();
        store.set_base_fare(fare(20, 5)).unwrap();
        assert_eq!(store.quote().unwrap().subsidy_amount, rs(0));
        assert_eq!(store.quote().unwrap().total_fare(), rs(51));
    }

    #[test]
    fn test_invalid_passenger_count_leaves_draft_unchanged() {
        let mut store = ready_store();
        store.set_passenger_count(3).unwrap();
        assert!(matches!(
            store.set_passenger_count(0),
            Err(CoreError::Validation(_))
        ));
        assert_eq!(store.draft().unwrap().passenger_count, 3);
    }

    #[test]
    fn test_route_change_clears_stale_fare() {
        let mut store = ready_store();
        store
            .set_route("Rampur", "Kheri", RouteSummary::with_distance(3_000))
            .unwrap();
        assert!(store.draft().unwrap().fare.is_none());
        assert!(store.last_quote().is_none());
        assert!(matches!(
            store.quote(),
            Err(CoreError::MissingInput { ref field }) if field == "base fare"
        ));
    }

    #[test]
    fn test_gift_requires_valid_recipient() {
        let mut store = ready_store();
        assert!(store.set_gift(Some("123")).is_err());
        assert!(!store.draft().unwrap().add_ons.gift);

        store.set_gift(Some("98765 43210")).unwrap();
        let draft = store.draft().unwrap();
        assert!(draft.add_ons.gift);
        assert_eq!(draft.gift_recipient.as_deref(), Some("9876543210"));

        store.set_add_on(AddOn::Gift, false).unwrap();
        assert!(store.draft().unwrap().gift_recipient.is_none());
    }

    #[test]
    fn test_commit_payload_preconditions_in_order() {
        let mut store = store_with(Arc::new(NoSubsidy));
        store.create_draft("passenger-1", RecordKind::Ticket).unwrap();
        let missing = |store: &mut DraftStore| match store.commit_payload() {
            Err(CoreError::MissingInput { field }) => field,
            other => panic!("expected missing input, got {:?}", other),
        };

        assert_eq!(missing(&mut store), "route");
        store
            .set_route("Rampur", "Sitapur", RouteSummary::with_distance(12_000))
            .unwrap();
        assert_eq!(missing(&mut store), "base fare");
        store.set_base_fare(fare(20, 0)).unwrap();
        assert_eq!(missing(&mut store), "payment method");
        store.select_payment_method(PaymentMethod::Cash).unwrap();
        store.set_add_on(AddOn::Gift, true).unwrap();
        assert_eq!(missing(&mut store), "gift recipient");
        store.set_add_on(AddOn::Gift, false).unwrap();

        let payload = store.commit_payload().unwrap();
        assert_eq!(payload.total_price, rs(20));
        assert_eq!(payload.record_id, store.draft().unwrap().attempt_id);
        assert!(payload.code.starts_with("TKT-"));
    }

    #[test]
    fn test_patch_is_all_or_nothing() {
        let mut store = ready_store();
        let patch = DraftPatch {
            passenger_count: Some(4),
            gift: Some(GiftPatch::Send {
                recipient: "nope".to_string(),
            }),
            ..Default::default()
        };
        assert!(store.apply_patch(&patch, None).is_err());
        assert_eq!(store.draft().unwrap().passenger_count, 1);

        let patch = DraftPatch {
            passenger_count: Some(4),
            livestock: Some(true),
            payment_method: Some(PaymentMethod::WalletCoin),
            ..Default::default()
        };
        store.apply_patch(&patch, None).unwrap();
        assert_eq!(store.last_quote().unwrap().total_fare(), rs(110));
        assert_eq!(
            store.draft().unwrap().payment_method,
            Some(PaymentMethod::WalletCoin)
        );
    }

    #[test]
    fn test_route_patch_needs_resolution() {
        let mut store = ready_store();
        let patch = DraftPatch {
            destination: Some("Kheri".to_string()),
            ..Default::default()
        };
        assert!(store.apply_patch(&patch, None).is_err());

        let resolved = ResolvedRoute {
            origin: "Rampur".to_string(),
            destination: "Kheri".to_string(),
            route: RouteSummary::with_distance(3_000),
            fare: fare(15, 0),
        };
        store.apply_patch(&patch, Some(resolved)).unwrap();
        assert_eq!(store.draft().unwrap().destination.as_deref(), Some("Kheri"));
        assert_eq!(store.last_quote().unwrap().total_fare(), rs(15));
    }

    #[test]
    fn test_reset_allocates_new_attempt() {
        let mut store = ready_store();
        let first = store.draft().unwrap().attempt_id;
        store.reset();
        let draft = store.draft().unwrap();
        assert_ne!(draft.attempt_id, first);
        assert_eq!(draft.owner_id, "passenger-1");
        assert!(draft.route.is_none());
        assert!(store.last_quote().is_none());
    }
}
