//! # Money & Discounts
//!
//! Minor-unit money and discount math.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A 10% discount applied, undone and re-applied in floats drifts a       │
//! │  little each cycle. Under the ledger's undo stack that drift would      │
//! │  make "restored" totals unequal to the originals.                       │
//! │                                                                         │
//! │  OUR SOLUTION: integer minor units (cents, paise, ...)                  │
//! │    Every intermediate rounding happens in integer space, so repeated    │
//! │    recompute/undo cycles are exact.                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

/// Upper clamp for fixed discounts, in minor units.
///
/// A signed-32-bit ceiling keeps a fixed discount summable across a large
/// cart without i64 overflow.
pub const MAX_FIXED_DISCOUNT_MINOR: i64 = i32::MAX as i64;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate subtraction may dip negative before the
///   final `max(0, ..)` clamp in totals
/// - **Single field tuple struct**: zero-cost abstraction over i64
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtraction clamped at zero.
    ///
    /// Totals are defined as `max(0, subtotal - discounts)`; this is that
    /// clamp as an operation.
    #[inline]
    pub fn sub_clamped(&self, other: Money) -> Money {
        Money((self.0 - other.0).max(0))
    }

    /// The smaller of two values.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }
}

/// Debug/log formatting only - UI formatting is the host's job
/// (currency symbol and decimals are store configuration).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
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

/// Multiplication by quantity (for line totals).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Discount
// =============================================================================

/// A discount, either per-item or cart-level.
///
/// ## Clamping at Construction
/// Percentage is clamped to [0, 100]; fixed is clamped to
/// [0, [`MAX_FIXED_DISCOUNT_MINOR`]]. Stored values are always in range, so
/// `amount_off` never needs to re-validate.
///
/// ## Serialized Form
/// ```json
/// { "type": "percentage", "value": 12.5, "reason": "loyalty" }
/// { "type": "fixed", "value": 500 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Discount {
    /// Percentage off the base amount, 0-100.
    Percentage {
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Fixed amount off, in minor units.
    Fixed {
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Discount {
    /// Creates a percentage discount, clamped to [0, 100].
    pub fn percentage(value: f64) -> Self {
        Discount::Percentage {
            value: value.clamp(0.0, 100.0),
            reason: None,
        }
    }

    /// Creates a fixed discount in minor units, clamped to
    /// [0, [`MAX_FIXED_DISCOUNT_MINOR`]].
    pub fn fixed(value: f64) -> Self {
        Discount::Fixed {
            value: value.clamp(0.0, MAX_FIXED_DISCOUNT_MINOR as f64),
            reason: None,
        }
    }

    /// Attaches a human-readable reason ("manager override", "loyalty", ...).
    pub fn with_reason(mut self, why: impl Into<String>) -> Self {
        match &mut self {
            Discount::Percentage { reason, .. } | Discount::Fixed { reason, .. } => {
                *reason = Some(why.into());
            }
        }
        self
    }

    /// The amount this discount takes off a given base.
    ///
    /// ## Rounding
    /// Percentage converts to basis points and uses the integer
    /// `(base × bps + 5000) / 10000` rounding idiom; fixed rounds its value
    /// to the nearest minor unit. Both clamp to `base` - a discount can
    /// never push a line or cart below zero.
    ///
    /// ## Example
    /// ```rust
    /// use vend_core::money::{Discount, Money};
    ///
    /// let base = Money::from_minor(999);
    /// assert_eq!(Discount::percentage(10.0).amount_off(base).minor(), 100);
    /// assert_eq!(Discount::fixed(5000.0).amount_off(base).minor(), 999);
    /// ```
    pub fn amount_off(&self, base: Money) -> Money {
        if base.minor() <= 0 {
            return Money::zero();
        }
        let off = match self {
            Discount::Percentage { value, .. } => {
                // Basis points keep the arithmetic in integer space; i128
                // guards against overflow on large carts.
                let bps = (value * 100.0).round() as i128;
                ((base.minor() as i128 * bps + 5_000) / 10_000) as i64
            }
            Discount::Fixed { value, .. } => value.round() as i64,
        };
        Money::from_minor(off.clamp(0, base.minor()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
