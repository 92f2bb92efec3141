use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Money amount represented in integer cents to avoid floating point drift.
///
/// Serialized over the wire as a decimal string with exactly two fraction
/// digits (e.g. "35.00"), never as binary floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Line total for a quantity of units at this unit price.
    pub fn times(&self, quantity: i32) -> Self {
        Self { cents: self.cents * quantity as i64 }
    }

    /// Percentage fee expressed in basis points (1 bp = 0.01%),
    /// rounded half-up to whole cents.
    pub fn fee_basis_points(&self, basis_points: i64) -> Self {
        debug_assert!(self.cents >= 0 && basis_points >= 0);
        Self { cents: (self.cents * basis_points + 5_000) / 10_000 }
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money { cents: self.cents + rhs.cents }
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.cents += rhs.cents;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Money {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid money amount '{s}'"));
        }
        if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid money amount '{s}': at most 2 fraction digits"));
        }
        let whole: i64 = whole.parse().map_err(|_| format!("invalid money amount '{s}'"))?;
        let mut frac_cents: i64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| format!("invalid money amount '{s}'"))?
        };
        if frac.len() == 1 {
            frac_cents *= 10;
        }
        Ok(Money { cents: sign * (whole * 100 + frac_cents) })
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_two_fraction_digits() {
        assert_eq!(Money::from_cents(3500).to_string(), "35.00");
        assert_eq!(Money::from_cents(11).to_string(), "0.11");
        assert_eq!(Money::from_cents(-250).to_string(), "-2.50");
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("10.00".parse::<Money>().unwrap(), Money::from_cents(1000));
        assert_eq!("5".parse::<Money>().unwrap(), Money::from_cents(500));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from_cents(50));
        assert!("10.005".parse::<Money>().is_err());
        assert!("ten".parse::<Money>().is_err());
    }

    #[test]
    fn fee_rounds_half_up() {
        // 35.00 at 0.3% = 0.105 -> 0.11
        assert_eq!(Money::from_cents(3500).fee_basis_points(30), Money::from_cents(11));
        // 33.33 at 0.3% = 0.09999 -> 0.10
        assert_eq!(Money::from_cents(3333).fee_basis_points(30), Money::from_cents(10));
        // 1.00 at 0.3% = 0.003 -> 0.00
        assert_eq!(Money::from_cents(100).fee_basis_points(30), Money::zero());
    }

    #[test]
    fn serde_round_trips_as_string() {
        let m = Money::from_cents(15511);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"155.11\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
