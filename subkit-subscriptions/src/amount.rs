//! Money values.
//!
//! Plan prices, charges and revenue totals are [`Amount`]s: a `Decimal`
//! held at two places. Sums are exact; rounding happens only when a value is
//! derived, such as the monthly share of an annual price. JSON carries the
//! value as a string, e.g. `"29.90"`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

/// Number of decimal places kept for currency values.
pub const CURRENCY_SCALE: u32 = 2;

/// A currency value
///
/// ```
/// use subkit_subscriptions::Amount;
///
/// let basic = Amount::from_cents(2990);
/// let addon: Amount = "10.10".parse().unwrap();
/// assert_eq!(basic.checked_add(&addon).map(|a| a.to_string()), Some("40.00".into()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    /// `2990` is `29.90`
    pub fn from_cents(cents: i64) -> Self {
        Self {
            value: Decimal::new(cents, CURRENCY_SCALE),
        }
    }

    /// Rounds half away from zero to whole cents.
    pub fn new(value: Decimal) -> Self {
        Self {
            value: value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero),
        }
    }

    /// Parse a decimal string such as `"29.90"`, rounding to cents.
    pub fn from_str_checked(s: &str) -> Result<Self, String> {
        Decimal::from_str(s.trim())
            .map(Self::new)
            .map_err(|e| format!("not a money value {:?}: {}", s, e))
    }

    pub fn zero() -> Self {
        Self {
            value: Decimal::new(0, CURRENCY_SCALE),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.value.is_sign_negative() && !self.value.is_zero()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        self.value
            .checked_add(other.value)
            .map(|value| Self { value })
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.value
            .checked_sub(other.value)
            .map(|value| Self { value })
    }

    /// Clamps at `Decimal::MAX`; used for report totals.
    pub fn saturating_add(&self, other: &Self) -> Self {
        self.checked_add(other).unwrap_or(Self {
            value: Decimal::MAX,
        })
    }

    /// Split into `parts`, rounded to cents. `None` for zero parts.
    ///
    /// ```
    /// use subkit_subscriptions::Amount;
    /// assert_eq!(Amount::from_cents(29900).divide(12), Some(Amount::from_cents(2492)));
    /// ```
    pub fn divide(&self, parts: u32) -> Option<Self> {
        match parts {
            0 => None,
            n => self.value.checked_div(Decimal::from(n)).map(Self::new),
        }
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.value;
        value.rescale(CURRENCY_SCALE);
        write!(f, "{}", value)
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, a| acc.saturating_add(&a))
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, a| acc.saturating_add(a))
    }
}
