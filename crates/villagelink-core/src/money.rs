//! # Money Module
//!
//! Provides the `Money` type for fares, fees, wallet debits and earnings.
//!
//! ## Why Integer Paise?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A fare frozen at commit must equal, to the paisa, what the wallet     │
//! │  debited and what the driver's share is computed from.                 │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Paise                                            │
//! │    ₹41.00 = 4100 paise, stored and compared exactly                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use villagelink_core::money::{Bps, Money};
//!
//! let fare = Money::from_rupees(41);
//! assert_eq!(fare.paise(), 4100);
//!
//! // Platform fee of 10%
//! let fee = fare.portion(Bps::new(1000));
//! assert_eq!(fee.paise(), 410);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in paise (1 rupee = 100 paise).
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate fare arithmetic may dip below zero before
///   the composer clamps it
/// - **Single field tuple struct**: zero-cost abstraction over i64
///
/// ## Where Money Flows
/// ```text
/// FareBreakdown (external) ──► compose() ──► PriceQuote.total_fare()
///                                                 │
///                                                 ▼ frozen at commit
///                                   CommittedRecord.total_price_paise
///                                                 │
///                     ┌───────────────────────────┼──────────────────────┐
///                     ▼                           ▼                      ▼
///               wallet debit              reward coins           driver earnings
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paise (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use villagelink_core::money::Money;
    ///
    /// let fare = Money::from_paise(2550); // ₹25.50
    /// assert_eq!(fare.paise(), 2550);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Money(paise)
    }

    /// Creates a Money value from whole rupees.
    #[inline]
    pub const fn from_rupees(rupees: i64) -> Self {
        Money(rupees * 100)
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Returns the whole-rupee portion (truncated toward zero).
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the paise portion (always 0-99).
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    ///
    /// ## Example
    /// ```rust
    /// use villagelink_core::money::Money;
    ///
    /// assert_eq!(Money::from_paise(-300).clamp_non_negative(), Money::zero());
    /// assert_eq!(Money::from_paise(300).clamp_non_negative().paise(), 300);
    /// ```
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            Money(self.0)
        }
    }

    /// Multiplies money by a quantity (passenger count, for example).
    ///
    /// ## Example
    /// ```rust
    /// use villagelink_core::money::Money;
    ///
    /// let per_seat = Money::from_rupees(20);
    /// assert_eq!(per_seat.multiply_quantity(3), Money::from_rupees(60));
    /// ```
    ///
    /// Saturates instead of overflowing.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Returns the basis-point portion of this amount, rounding half up.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`.
    /// i128 keeps large amounts from overflowing.
    ///
    /// ## Example
    /// ```rust
    /// use villagelink_core::money::{Bps, Money};
    ///
    /// // ₹10.05 at 2.5% = 25.125 paise → 25 paise
    /// let reward = Money::from_paise(1005).portion(Bps::new(250));
    /// assert_eq!(reward.paise(), 25);
    /// ```
    pub fn portion(&self, rate: Bps) -> Money {
        let paise = (self.0 as i128 * rate.value() as i128 + 5000) / 10000;
        Money::from_paise(paise as i64)
    }

    /// Returns this amount minus its basis-point portion.
    ///
    /// Used for the driver's share: `total - platform fee`.
    pub fn less_portion(&self, rate: Bps) -> Money {
        *self - self.portion(rate)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented rendering (`₹41.00`). Localized display belongs to the UI.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.rupees().abs(), self.paise_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: u32) -> Self {
        Money(self.0.saturating_mul(qty as i64))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Basis Points
// =============================================================================

/// A rate in basis points (1 bps = 0.01%, 10000 bps = 100%).
///
/// Platform fees and reward-coin rates are configured in bps so every
/// computation stays in integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Bps(u32);

impl Bps {
    /// 100%.
    pub const FULL: Bps = Bps(10_000);

    /// Creates a rate from basis points.
    #[inline]
    pub const fn new(bps: u32) -> Self {
        Bps(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Bps(0)
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Default for Bps {
    fn default() -> Self {
        Bps::zero()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_paise() {
        let money = Money::from_paise(4150);
        assert_eq!(money.paise(), 4150);
        assert_eq!(money.rupees(), 41);
        assert_eq!(money.paise_part(), 50);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_paise(4100)), "₹41.00");
        assert_eq!(format!("{}", Money::from_paise(505)), "₹5.05");
        assert_eq!(format!("{}", Money::from_paise(-250)), "-₹2.50");
        assert_eq!(format!("{}", Money::zero()), "₹0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_rupees(20);
        let b = Money::from_rupees(5);

        assert_eq!(a + b, Money::from_rupees(25));
        assert_eq!(a - b, Money::from_rupees(15));
        assert_eq!(a * 2u32, Money::from_rupees(40));
        assert_eq!(b - a, Money::from_rupees(-15));
    }

    #[test]
    fn test_arithmetic_saturates() {
        let huge = Money::from_paise(i64::MAX / 2);
        assert_eq!(huge.multiply_quantity(4), Money::from_paise(i64::MAX));
        assert_eq!(huge * 3u32, Money::from_paise(i64::MAX));
        assert_eq!(huge + huge + huge, Money::from_paise(i64::MAX));
        assert_eq!(
            Money::from_paise(i64::MIN) - Money::from_paise(1),
            Money::from_paise(i64::MIN)
        );
    }

    #[test]
    fn test_clamp_non_negative() {
        assert_eq!(Money::from_rupees(-3).clamp_non_negative(), Money::zero());
        assert_eq!(Money::zero().clamp_non_negative(), Money::zero());
        assert_eq!(
            Money::from_rupees(3).clamp_non_negative(),
            Money::from_rupees(3)
        );
    }

    #[test]
    fn test_portion_rounds_half_up() {
        // 10% of ₹41.00
        assert_eq!(Money::from_rupees(41).portion(Bps::new(1000)).paise(), 410);
        // 2.5% of 1020 paise = 25.5 → 26
        assert_eq!(Money::from_paise(1020).portion(Bps::new(250)).paise(), 26);
        assert_eq!(Money::from_rupees(41).portion(Bps::zero()), Money::zero());
        assert_eq!(
            Money::from_rupees(41).portion(Bps::FULL),
            Money::from_rupees(41)
        );
    }

    #[test]
    fn test_less_portion_is_driver_share() {
        let total = Money::from_rupees(41);
        let share = total.less_portion(Bps::new(1000));
        assert_eq!(share.paise(), 3690);
    }

    #[test]
    fn test_sum() {
        let fees = [Money::from_rupees(1), Money::from_rupees(2)];
        let total: Money = fees.iter().sum();
        assert_eq!(total, Money::from_rupees(3));

        let empty: Vec<Money> = Vec::new();
        assert_eq!(empty.into_iter().sum::<Money>(), Money::zero());
    }
}
