use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Money in the shop's local currency, stored as a scaled integer of the
/// smallest unit (two decimal places).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 100;

    pub const ZERO: Amount = Amount(0);

    /// Converts a decimal value, rounding half-up to the smallest unit.
    ///
    /// Rounds the shortest decimal form of `value`, so `1.005` gives 1.01
    /// even though its binary approximation sits just below the half.
    pub fn from_float(value: f64) -> Self {
        Self::parse_decimal(&value.to_string())
            .map(Amount)
            .unwrap_or_else(|| Amount((value * Self::SCALE as f64).round() as i64))
    }

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    /// Whole currency units, e.g. `Amount::from_units(1000)` is 1000.00.
    pub fn from_units(units: i64) -> Self {
        Amount(units * Self::SCALE)
    }

    pub fn scaled(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        Amount((self.0 - rhs.0).max(0))
    }

    /// The share of this amount covered by `percent` (0..=100), rounded
    /// half-up to the smallest unit.
    pub fn percent(self, percent: f64) -> Self {
        let basis_points = (percent.clamp(0.0, 100.0) * 100.0).round() as i128;
        let raw = self.0 as i128 * basis_points;
        Amount((raw + 5_000).div_euclid(10_000) as i64)
    }

    /// Exact `[-+]digits[.digits]` to scaled units, half-up on the third
    /// fractional digit.
    fn parse_decimal(s: &str) -> Option<i64> {
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let mut frac = frac.bytes().map(|b| i64::from(b - b'0'));
        let cents = frac.next().unwrap_or(0) * 10 + frac.next().unwrap_or(0);
        let round_up = i64::from(frac.next().is_some_and(|d| d >= 5));

        let scaled = whole
            .checked_mul(Self::SCALE)?
            .checked_add(cents + round_up)?;
        Some(if negative { -scaled } else { scaled })
    }

    fn as_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

/// Error returned when a money string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount '{0}'")]
pub struct ParseAmountError(pub String);

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Amount::parse_decimal(trimmed)
            .map(Amount)
            .ok_or_else(|| ParseAmountError(trimmed.to_string()))
    }
}

// The backend speaks plain JSON numbers; whole amounts go out as integers.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % Self::SCALE == 0 {
            serializer.serialize_i64(self.0 / Self::SCALE)
        } else {
            serializer.serialize_f64(self.as_f64())
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Amount::from_float(value))
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_scaled_preserves_value() {
        let amount = Amount::from_scaled(12345);
        assert_eq!(amount, Amount(12345));
    }

    #[test]
    fn from_float_converts_correctly() {
        assert_eq!(Amount::from_float(100.0), Amount::from_scaled(10_000));
        assert_eq!(Amount::from_float(1.5), Amount::from_scaled(150));
        assert_eq!(Amount::from_float(0.01), Amount::from_scaled(1));
    }

    #[test]
    fn from_float_rounds_half_up() {
        assert_eq!(Amount::from_float(1.125), Amount::from_scaled(113));
        assert_eq!(Amount::from_float(1.124), Amount::from_scaled(112));
        // binary approximations just below the half
        assert_eq!(Amount::from_float(1.005), Amount::from_scaled(101));
        assert_eq!(Amount::from_float(2.675), Amount::from_scaled(268));
    }

    #[test]
    fn from_units() {
        assert_eq!(Amount::from_units(1000), Amount::from_scaled(100_000));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Amount::from_units(990).to_string(), "990.00");
        assert_eq!(Amount::from_scaled(150).to_string(), "1.50");
        assert_eq!(Amount::from_scaled(1).to_string(), "0.01");
        assert_eq!(Amount::from_scaled(-250).to_string(), "-2.50");
    }

    #[test]
    fn parse_from_str() {
        assert_eq!("100".parse::<Amount>().unwrap(), Amount::from_units(100));
        assert_eq!(" 10.5 ".parse::<Amount>().unwrap(), Amount::from_scaled(1050));
        assert!("ten".parse::<Amount>().is_err());
        assert!("NaN".parse::<Amount>().is_err());
        assert!(".".parse::<Amount>().is_err());
        assert!("1.2.3".parse::<Amount>().is_err());
    }

    #[test]
    fn parse_rounds_decimal_digits_half_up() {
        assert_eq!("1.005".parse::<Amount>().unwrap(), Amount::from_scaled(101));
        assert_eq!("2.675".parse::<Amount>().unwrap(), Amount::from_scaled(268));
        assert_eq!("1.0049".parse::<Amount>().unwrap(), Amount::from_scaled(100));
        assert_eq!("-1.005".parse::<Amount>().unwrap(), Amount::from_scaled(-101));
        assert_eq!(".5".parse::<Amount>().unwrap(), Amount::from_scaled(50));
        assert_eq!("7.".parse::<Amount>().unwrap(), Amount::from_units(7));
    }

    #[test]
    fn deserializes_inexact_json_number() {
        let parsed: Amount = serde_json::from_str("1.005").unwrap();
        assert_eq!(parsed, Amount::from_scaled(101));
    }

    #[test]
    fn saturating_sub_clamps_at_zero() {
        let a = Amount::from_units(5);
        assert_eq!(a.saturating_sub(Amount::from_units(7)), Amount::ZERO);
        assert_eq!(a.saturating_sub(Amount::from_units(2)), Amount::from_units(3));
    }

    #[test]
    fn percent_of_amount() {
        assert_eq!(Amount::from_units(1100).percent(10.0), Amount::from_units(110));
        assert_eq!(Amount::from_units(999).percent(0.0), Amount::ZERO);
        assert_eq!(Amount::from_units(999).percent(100.0), Amount::from_units(999));
        // 3.33% of 10.00 = 0.333 -> 0.33
        assert_eq!(Amount::from_units(10).percent(3.33), Amount::from_scaled(33));
        // 12.5% of 0.20 = 0.025 -> 0.03
        assert_eq!(Amount::from_scaled(20).percent(12.5), Amount::from_scaled(3));
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(Amount::from_units(50).percent(150.0), Amount::from_units(50));
        assert_eq!(Amount::from_units(50).percent(-5.0), Amount::ZERO);
    }

    #[test]
    fn serializes_as_json_number() {
        assert_eq!(serde_json::to_string(&Amount::from_units(990)).unwrap(), "990");
        assert_eq!(serde_json::to_string(&Amount::from_scaled(1050)).unwrap(), "10.5");
        let parsed: Amount = serde_json::from_str("1200.25").unwrap();
        assert_eq!(parsed, Amount::from_scaled(120_025));
    }

    #[test]
    fn sum_of_amounts() {
        let total: Amount = [Amount::from_units(1), Amount::from_units(2)].iter().sum();
        assert_eq!(total, Amount::from_units(3));
    }

    #[test]
    fn ordering() {
        let small = Amount::from_scaled(100);
        let large = Amount::from_scaled(200);
        assert!(small < large);
        assert!(Amount::from_scaled(-1).is_negative());
    }
}
