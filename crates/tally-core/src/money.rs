//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A commission breakdown must foot EXACTLY to its total, and the        │
//! │  schedule must never exceed it. Both checks are equality / ordering    │
//! │  on sums, which floats cannot guarantee.                               │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units (cents)                             │
//! │    final amount 100,000.00 → 10_000_000 cents                          │
//! │    10% share              →  1_000_000 cents                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! let amount = Money::from_cents(1099); // 10.99
//! let total = amount + Money::from_cents(500);
//! assert_eq!(total.cents(), 1599);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

use crate::types::Percentage;
use crate::FULL_PERCENTAGE_BPS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: differences such as `total - paid` stay representable
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serialized as an integer**: the RPC surface carries minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(100_000, 0).cents(), 10_000_000);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts, `None` on i64 overflow.
    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Adds two amounts, clamping at the i64 bounds.
    #[inline]
    pub const fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Sums an iterator of amounts, `None` as soon as the total overflows.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let parts = [Money::from_cents(i64::MAX), Money::from_cents(1)];
    /// assert_eq!(Money::checked_sum(parts), None);
    /// ```
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Applies a percentage and rounds to the minor unit, half to even.
    ///
    /// ## Bankers Rounding Explained
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  BANKERS ROUNDING (Round Half to Even)                              │
    /// │                                                                     │
    /// │  Standard rounding always rounds 0.5 UP, causing systematic bias:  │
    /// │    0.5 → 1, 1.5 → 2, 2.5 → 3, 3.5 → 4 (always up = +bias)         │
    /// │                                                                     │
    /// │  Bankers Rounding rounds 0.5 to nearest EVEN number:               │
    /// │    0.5 → 0, 1.5 → 2, 2.5 → 2, 3.5 → 4 (alternates = no bias)      │
    /// │                                                                     │
    /// │  Many small shares are summed into role totals; half-up would     │
    /// │  drift those totals upward.                                        │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::Percentage;
    ///
    /// let half = Percentage::from_bps(5000);
    /// assert_eq!(Money::from_cents(5).apply_percentage(half).cents(), 2);  // 2.5 → 2
    /// assert_eq!(Money::from_cents(3).apply_percentage(half).cents(), 2);  // 1.5 → 2
    /// ```
    pub fn apply_percentage(&self, rate: Percentage) -> Money {
        // i128 so that large amounts times 10_000 bps cannot overflow
        let numerator = self.0 as i128 * rate.bps() as i128;
        let rounded = div_round_half_even(numerator, FULL_PERCENTAGE_BPS as i128);
        Money::from_cents(rounded as i64)
    }
}

/// Integer division rounding the quotient half to even.
///
/// `den` must be positive.
fn div_round_half_even(num: i128, den: i128) -> i128 {
    let quotient = num / den;
    let remainder = num % den;
    let twice = 2 * remainder.abs();

    if twice > den || (twice == den && quotient % 2 != 0) {
        quotient + num.signum()
    } else {
        quotient
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering; currency symbols are a presentation concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
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
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Saturates instead of wrapping. Paths that must not silently clamp use
/// [`Money::checked_sum`].
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Money::saturating_add)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1_000_000).to_string(), "10000.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn test_apply_percentage_exact() {
        // 100,000.00 at 10% = 10,000.00
        let amount = Money::from_major_minor(100_000, 0);
        assert_eq!(
            amount.apply_percentage(Percentage::from_bps(1000)).cents(),
            1_000_000
        );
    }

    #[test]
    fn test_apply_percentage_rounds_half_to_even() {
        let half = Percentage::from_bps(5000);
        assert_eq!(Money::from_cents(1).apply_percentage(half).cents(), 0); // 0.5
        assert_eq!(Money::from_cents(3).apply_percentage(half).cents(), 2); // 1.5
        assert_eq!(Money::from_cents(5).apply_percentage(half).cents(), 2); // 2.5
        assert_eq!(Money::from_cents(7).apply_percentage(half).cents(), 4); // 3.5
        assert_eq!(Money::from_cents(-5).apply_percentage(half).cents(), -2);
    }

    #[test]
    fn test_apply_percentage_non_half_rounds_to_nearest() {
        // 1,234.57 at 2.5% = 30.86425 → 30.86
        let amount = Money::from_cents(123_457);
        assert_eq!(amount.apply_percentage(Percentage::from_bps(250)).cents(), 3086);

        // 0.99 at 33.33% = 0.329967 → 0.33
        let amount = Money::from_cents(99);
        assert_eq!(amount.apply_percentage(Percentage::from_bps(3333)).cents(), 33);
    }

    #[test]
    fn test_apply_percentage_large_amount_does_not_overflow() {
        let amount = Money::from_cents(i64::MAX / 2);
        let full = amount.apply_percentage(Percentage::from_bps(FULL_PERCENTAGE_BPS));
        assert_eq!(full, amount);
    }

    #[test]
    fn test_sum_and_arithmetic() {
        let parts = [Money::from_cents(400), Money::from_cents(400), Money::from_cents(200)];
        let total: Money = parts.iter().copied().sum();
        assert_eq!(total.cents(), 1000);
        assert_eq!((total - Money::from_cents(250)).cents(), 750);
        assert!(Money::zero().is_zero());
        assert!(Money::from_cents(-1).is_negative());
    }

    #[test]
    fn test_overflowing_sums() {
        let big = [Money::from_cents(i64::MAX - 10), Money::from_cents(20)];

        assert_eq!(Money::checked_sum(big), None);
        assert_eq!(big.iter().copied().sum::<Money>(), Money::from_cents(i64::MAX));
        assert_eq!(
            Money::checked_sum([Money::from_cents(600), Money::from_cents(400)]),
            Some(Money::from_cents(1000))
        );
        assert_eq!(Money::from_cents(i64::MIN).checked_add(Money::from_cents(-1)), None);
    }
}
