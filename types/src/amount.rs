//! Point amounts.
//!
//! Points are an abstract unit with two decimal places of precision. They are
//! stored as signed hundredths (`i64`) to avoid floating-point drift: credits
//! are positive, debits negative.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use std::str::FromStr;
use thiserror::Error;

/// A signed point amount in hundredths of a point.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Points(i64);

impl Points {
    pub const ZERO: Self = Self(0);

    /// Build from hundredths of a point.
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Build from a whole number of points.
    pub const fn whole(points: i64) -> Self {
        Self(points * 100)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Sum of `amounts`, or `None` if any partial sum overflows.
    pub fn checked_sum<I: IntoIterator<Item = Self>>(amounts: I) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Split evenly across `parts` recipients, rounding each share down to the cent.
    ///
    /// Returns `None` when `parts` is zero. The shares never sum to more than `self`.
    pub fn split_floor(self, parts: usize) -> Option<Self> {
        if parts == 0 {
            return None;
        }
        Some(Self(self.0.div_euclid(parts as i64)))
    }
}

impl Neg for Points {
    type Output = Self;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid point amount: {0}")]
pub struct PointsParseError(String);

impl FromStr for Points {
    type Err = PointsParseError;

    /// Parse `"12"`, `"12.5"` or `"-0.25"`. More than two decimals is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PointsParseError(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() || frac.len() > 2 {
            return Err(err());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }
        let whole: i64 = whole.parse().map_err(|_| err())?;
        let frac_cents: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse().map_err(|_| err())?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or_else(err)?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_two_decimals() {
        assert_eq!(Points::from_cents(333).to_string(), "3.33");
        assert_eq!(Points::from_cents(-5).to_string(), "-0.05");
        assert_eq!(Points::whole(10).to_string(), "10.00");
    }

    #[test]
    fn parse_accepts_up_to_two_decimals() {
        assert_eq!("12".parse::<Points>().unwrap(), Points::whole(12));
        assert_eq!("12.5".parse::<Points>().unwrap(), Points::from_cents(1250));
        assert_eq!("-0.25".parse::<Points>().unwrap(), Points::from_cents(-25));
        assert!("1.234".parse::<Points>().is_err());
        assert!("abc".parse::<Points>().is_err());
        assert!(".5".parse::<Points>().is_err());
    }

    #[test]
    fn split_floor_ten_three_ways() {
        let share = Points::whole(10).split_floor(3).unwrap();
        assert_eq!(share, Points::from_cents(333));
    }

    #[test]
    fn split_floor_zero_parts() {
        assert_eq!(Points::whole(10).split_floor(0), None);
    }

    #[test]
    fn checked_sum_of_mixed_signs() {
        let total = Points::checked_sum([Points::whole(5), Points::from_cents(-150)]);
        assert_eq!(total, Some(Points::from_cents(350)));
        assert_eq!(Points::checked_sum([]), Some(Points::ZERO));
    }

    #[test]
    fn checked_sum_reports_overflow() {
        let big = Points::from_cents(i64::MAX);
        assert_eq!(Points::checked_sum([big, Points::from_cents(1)]), None);
        // An overflowing prefix is not rescued by a later debit.
        assert_eq!(
            Points::checked_sum([big, Points::from_cents(1), Points::from_cents(-5)]),
            None
        );
    }
}
