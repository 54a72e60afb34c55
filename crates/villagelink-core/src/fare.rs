//! # Fare Composer
//!
//! Combines the externally supplied base fare, its modifiers, the passenger
//! count and add-on fees into a [`PriceQuote`].
//!
//! ## Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  per_unit  = base + surge − discount − subsidy                          │
//! │  subtotal  = max(0, per_unit × passengers)                              │
//! │  total     = subtotal + Σ add_on_fees                                   │
//! │                                                                         │
//! │  base=20 surge=5 discount=0 subsidy=5 n=2 add_ons=[1]                   │
//! │    → (20 + 5 − 0 − 5) × 2 + 1 = 41                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Add-on fees are charged once per booking and are never negative, so the
//! total can never drop below zero.
//!
//! ## Subsidy
//! Subsidy eligibility is a pure function of the current route and time,
//! supplied by a [`SubsidyPolicy`]. The draft store calls the policy on
//! every recompute; nothing about a previous subsidy is cached.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{AddOn, AddOns, FareBreakdown, RouteSummary};

// =============================================================================
// Price Quote
// =============================================================================

/// The inputs of a fare computation, with the total derived on demand.
///
/// There is no `total` field; [`PriceQuote::total_fare`] always reflects the
/// stored inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PriceQuote {
    pub base_fare: Money,
    pub surge_amount: Money,
    pub discount_amount: Money,
    pub subsidy_amount: Money,
    pub add_on_fees: Vec<Money>,
    pub passenger_count: u32,
}

impl PriceQuote {
    /// Fare for one passenger unit, before clamping.
    pub fn per_unit_fare(&self) -> Money {
        self.base_fare + self.surge_amount - self.discount_amount - self.subsidy_amount
    }

    /// Sum of once-per-booking add-on fees (negative entries ignored).
    pub fn add_on_total(&self) -> Money {
        self.add_on_fees
            .iter()
            .map(Money::clamp_non_negative)
            .sum()
    }

    /// The final price. Never negative.
    pub fn total_fare(&self) -> Money {
        let subtotal = self
            .per_unit_fare()
            .multiply_quantity(self.passenger_count as i64)
            .clamp_non_negative();
        subtotal + self.add_on_total()
    }
}

/// Composes a price quote.
///
/// Pure and deterministic: identical inputs always yield an identical quote.
///
/// ## Example
/// ```rust
/// use villagelink_core::fare::compose;
/// use villagelink_core::money::Money;
///
/// // Discount larger than the fare: clamped, add-on still charged.
/// let quote = compose(
///     Money::from_rupees(10),
///     Money::zero(),
///     Money::from_rupees(15),
///     Money::zero(),
///     3,
///     &[Money::from_rupees(2)],
/// );
/// assert_eq!(quote.total_fare(), Money::from_rupees(2));
/// ```
pub fn compose(
    base: Money,
    surge: Money,
    discount: Money,
    subsidy: Money,
    passenger_count: u32,
    add_on_fees: &[Money],
) -> PriceQuote {
    PriceQuote {
        base_fare: base,
        surge_amount: surge,
        discount_amount: discount,
        subsidy_amount: subsidy,
        add_on_fees: add_on_fees.to_vec(),
        passenger_count,
    }
}

// =============================================================================
// Subsidy Policy
// =============================================================================

/// Decides the per-passenger subsidy for a route at a point in time.
///
/// Implementations must be deterministic. The real eligibility rule is owned
/// by the transport authority; plug it in here.
pub trait SubsidyPolicy: Send + Sync {
    fn subsidy(&self, route: &RouteSummary, at: DateTime<Utc>, fare: &FareBreakdown) -> Money;
}

/// No subsidy, ever.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSubsidy;

impl SubsidyPolicy for NoSubsidy {
    fn subsidy(&self, _route: &RouteSummary, _at: DateTime<Utc>, _fare: &FareBreakdown) -> Money {
        Money::zero()
    }
}

/// A flat per-passenger subsidy for long routes, optionally limited to a
/// window of hours (UTC, start inclusive, end exclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceSubsidy {
    pub min_distance_m: u32,
    pub amount: Money,
    #[serde(default)]
    pub active_hours_utc: Option<(u32, u32)>,
}

impl DistanceSubsidy {
    fn active_at(&self, at: DateTime<Utc>) -> bool {
        match self.active_hours_utc {
            None => true,
            Some((start, end)) if start <= end => (start..end).contains(&at.hour()),
            // Window wraps midnight, e.g. (22, 6)
            Some((start, end)) => at.hour() >= start || at.hour() < end,
        }
    }
}

impl SubsidyPolicy for DistanceSubsidy {
    fn subsidy(&self, route: &RouteSummary, at: DateTime<Utc>, fare: &FareBreakdown) -> Money {
        if route.distance_m <= self.min_distance_m || !self.active_at(at) {
            return Money::zero();
        }
        // Never subsidize more than the passenger would pay.
        let payable = (fare.base + fare.surge - fare.discount).clamp_non_negative();
        self.amount.min(payable)
    }
}

// =============================================================================
// Add-on Fees
// =============================================================================

/// Configured once-per-booking fee for each add-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AddOnFees {
    #[serde(default)]
    pub livestock: Money,
    #[serde(default)]
    pub insurance: Money,
    #[serde(default)]
    pub gift: Money,
}

impl AddOnFees {
    /// Fee list for the enabled flags, in a fixed order.
    pub fn fees_for(&self, add_ons: &AddOns) -> Vec<Money> {
        add_ons
            .enabled()
            .map(|flag| match flag {
                AddOn::Livestock => self.livestock,
                AddOn::Insurance => self.insurance,
                AddOn::Gift => self.gift,
            })
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rs(r: i64) -> Money {
        Money::from_rupees(r)
    }

    #[test]
    fn test_worked_example_is_41() {
        let quote = compose(rs(20), rs(5), rs(0), rs(5), 2, &[rs(1)]);
        assert_eq!(quote.total_fare(), rs(41));
        assert_eq!(quote.per_unit_fare(), rs(20));
    }

    #[test]
    fn test_total_never_negative() {
        for discount in [0, 10, 25, 100, 1000] {
            for subsidy in [0, 5, 50] {
                for n in 1..=4 {
                    let quote = compose(rs(20), rs(5), rs(discount), rs(subsidy), n, &[]);
                    assert!(quote.total_fare() >= Money::zero());
                }
            }
        }
    }

    #[test]
    fn test_absurd_base_fare_saturates() {
        let quote = compose(Money::from_paise(i64::MAX), rs(5), rs(0), rs(0), 4, &[rs(1)]);
        assert_eq!(quote.total_fare(), Money::from_paise(i64::MAX));
    }

    #[test]
    fn test_negative_add_on_is_ignored() {
        let quote = compose(rs(0), rs(0), rs(5), rs(0), 1, &[rs(-3)]);
        assert_eq!(quote.total_fare(), Money::zero());
    }

    #[test]
    fn test_compose_is_deterministic() {
        let a = compose(rs(30), rs(2), rs(1), rs(0), 3, &[rs(1), rs(2)]);
        let b = compose(rs(30), rs(2), rs(1), rs(0), 3, &[rs(1), rs(2)]);
        assert_eq!(a, b);
        assert_eq!(a.total_fare(), b.total_fare());
    }

    #[test]
    fn test_distance_subsidy_threshold() {
        let policy = DistanceSubsidy {
            min_distance_m: 5_000,
            amount: rs(5),
            active_hours_utc: None,
        };
        let fare = FareBreakdown {
            base: rs(20),
            ..Default::default()
        };
        let now = Utc::now();

        assert_eq!(policy.subsidy(&RouteSummary::with_distance(4_000), now, &fare), rs(0));
        assert_eq!(policy.subsidy(&RouteSummary::with_distance(5_000), now, &fare), rs(0));
        assert_eq!(policy.subsidy(&RouteSummary::with_distance(12_000), now, &fare), rs(5));

        let cheap = FareBreakdown {
            base: rs(3),
            ..Default::default()
        };
        assert_eq!(policy.subsidy(&RouteSummary::with_distance(12_000), now, &cheap), rs(3));
    }

    #[test]
    fn test_distance_subsidy_hours() {
        let policy = DistanceSubsidy {
            min_distance_m: 0,
            amount: rs(5),
            active_hours_utc: Some((22, 6)),
        };
        let fare = FareBreakdown {
            base: rs(20),
            ..Default::default()
        };
        let route = RouteSummary::with_distance(1_000);
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        assert_eq!(policy.subsidy(&route, late, &fare), rs(5));
        assert_eq!(policy.subsidy(&route, noon, &fare), rs(0));
    }

    #[test]
    fn test_add_on_fees_for_flags() {
        let fees = AddOnFees {
            livestock: rs(10),
            insurance: rs(1),
            gift: rs(0),
        };
        let mut add_ons = AddOns::default();
        assert!(fees.fees_for(&add_ons).is_empty());

        add_ons.set(AddOn::Insurance, true);
        add_ons.set(AddOn::Livestock, true);
        assert_eq!(fees.fees_for(&add_ons), vec![rs(10), rs(1)]);
    }
}
