//! Value objects for the tab domain.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when decimal text is not a valid amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid money amount {input:?}: {reason}")]
pub struct MoneyParseError {
    pub input: String,
    pub reason: &'static str,
}

/// Money amount represented in cents to avoid floating point issues.
///
/// Serialized as the bare cent count.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Parses decimal text such as `"2.50"`, `"1.5"` or `"3"`.
    ///
    /// At most two fractional digits are accepted; anything finer than a cent
    /// is rejected rather than rounded.
    pub fn from_decimal_str(input: &str) -> Result<Self, MoneyParseError> {
        let err = |reason| MoneyParseError {
            input: input.to_string(),
            reason,
        };

        let trimmed = input.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

        if whole.is_empty() && fraction.is_empty() {
            return Err(err("no digits"));
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err("unexpected character"));
        }
        if fraction.len() > 2 {
            return Err(err("more than two decimal places"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| err("amount too large"))?
        };
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| err("bad fraction"))? * 10,
            _ => fraction.parse().map_err(|_| err("bad fraction"))?,
        };

        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(|| err("amount too large"))?;

        Ok(Self(if negative { -cents } else { cents }))
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Sum, or `None` if it does not fit.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Difference, or `None` if it does not fit.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_decimal_str(s)
    }
}

// Operators saturate at the i64 bounds. Commands reject amounts that would
// get there, so only a hand-made history can reach them.
impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> std::iter::Sum<&'a MenuItem> for Money {
    fn sum<I: Iterator<Item = &'a MenuItem>>(iter: I) -> Self {
        iter.map(|item| item.price).sum()
    }
}

/// A drink on the menu, and a line item once ordered.
///
/// Ordering the same drink twice produces two identical line items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MenuItem {
    pub menu_number: u32,
    pub description: String,
    pub price: Money,
}

impl MenuItem {
    pub fn new(menu_number: u32, description: impl Into<String>, price: Money) -> Self {
        Self {
            menu_number,
            description: description.into(),
            price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(250).to_string(), "2.50");
        assert_eq!(Money::from_cents(100).to_string(), "1.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-12.34");
    }

    #[test]
    fn test_money_arithmetic_never_wraps() {
        let max = Money::from_cents(i64::MAX);
        let min = Money::from_cents(i64::MIN);
        let one = Money::from_cents(1);

        assert_eq!(max.checked_add(one), None);
        assert_eq!(min.checked_sub(one), None);
        assert_eq!(max + one, max);
        assert_eq!(min - one, min);

        let mut total = max;
        total += max;
        assert_eq!(total, max);
        assert_eq!([max, max].into_iter().sum::<Money>(), max);
    }

    #[test]
    fn test_money_from_decimal_str() {
        assert_eq!(Money::from_decimal_str("2.50").unwrap().cents(), 250);
        assert_eq!(Money::from_decimal_str("1.5").unwrap().cents(), 150);
        assert_eq!(Money::from_decimal_str("3").unwrap().cents(), 300);
        assert_eq!(Money::from_decimal_str(".75").unwrap().cents(), 75);
        assert_eq!(Money::from_decimal_str("-1.25").unwrap().cents(), -125);
        assert_eq!("0.10".parse::<Money>().unwrap().cents(), 10);
    }

    #[test]
    fn test_money_from_decimal_str_rejects_garbage() {
        assert!(Money::from_decimal_str("").is_err());
        assert!(Money::from_decimal_str("1.234").is_err());
        assert!(Money::from_decimal_str("1,50").is_err());
        assert!(Money::from_decimal_str("abc").is_err());
        assert!(Money::from_decimal_str("99999999999999999999").is_err());
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(250);
        let b = Money::from_cents(150);

        assert_eq!((a + b).cents(), 400);
        assert_eq!((a - b).cents(), 100);
        assert!((b - a).is_negative());

        let mut total = Money::zero();
        total += a;
        assert_eq!(total, a);
    }

    #[test]
    fn test_line_items_sum_to_total() {
        let items = [
            MenuItem::new(11, "beer", Money::from_cents(150)),
            MenuItem::new(12, "water", Money::from_cents(100)),
        ];
        let total: Money = items.iter().sum();
        assert_eq!(total, Money::from_cents(250));
    }

    #[test]
    fn test_menu_item_serializes_price_as_cents() {
        let item = MenuItem::new(11, "beer", Money::from_cents(150));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"menu_number": 11, "description": "beer", "price": 150})
        );
    }
}
