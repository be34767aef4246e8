use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Fixed-point money, scaled by 10^4 (four fractional digits). Never a float,
/// even transiently: all arithmetic is plain `i64` addition/subtraction with
/// overflow checked at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

const SCALE: i64 = 10_000;

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_scaled(scaled: i64) -> Self {
        Money(scaled)
    }

    pub fn scaled(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Parses a decimal string with at most four fractional digits, e.g.
    /// `"100.50"`, `"7"`, `"0.0001"`. Rejects floats-in-disguise like
    /// exponent notation, more than one decimal point, or extra fractional
    /// digits, and rejects non-positive amounts for the mutation callers that
    /// require strictly positive inputs via [`Money::parse_positive`].
    pub fn parse(input: &str) -> Result<Self, LedgerError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LedgerError::Validation("amount must not be empty".into()));
        }

        let (sign, body) = match input.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, input),
        };

        let mut parts = body.splitn(2, '.');
        let integer_part = parts.next().unwrap_or("");
        let fraction_part = parts.next();

        if integer_part.is_empty() || !integer_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LedgerError::Validation(format!(
                "amount '{input}' is not a valid decimal"
            )));
        }

        let integer_value: i64 = integer_part
            .parse()
            .map_err(|_| LedgerError::Validation(format!("amount '{input}' overflows")))?;

        let fraction_value: i64 = match fraction_part {
            None => 0,
            Some(frac) => {
                if frac.is_empty() || frac.len() > 4 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(LedgerError::Validation(format!(
                        "amount '{input}' has an invalid or overlong fractional part (max 4 digits)"
                    )));
                }
                let padded = format!("{frac:0<4}");
                padded
                    .parse()
                    .map_err(|_| LedgerError::Validation(format!("amount '{input}' is not a valid decimal")))?
            }
        };

        let scaled = integer_value
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(fraction_value))
            .ok_or_else(|| LedgerError::Validation(format!("amount '{input}' overflows")))?;

        Ok(Money(sign * scaled))
    }

    /// As [`Money::parse`], additionally rejecting zero and negative amounts.
    /// Every mutating operation requires a strictly positive amount.
    pub fn parse_positive(input: &str) -> Result<Self, LedgerError> {
        let money = Money::parse(input)?;
        if !money.is_positive() {
            return Err(LedgerError::Validation(format!(
                "amount '{input}' must be strictly positive"
            )));
        }
        Ok(money)
    }

    pub fn checked_add(&self, other: Money) -> Result<Money, LedgerError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| LedgerError::Internal("money addition overflowed".into()))
    }

    pub fn checked_sub(&self, other: Money) -> Result<Money, LedgerError> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| LedgerError::Internal("money subtraction overflowed".into()))
    }

    /// Renders with all four internal fractional digits, the persisted-row
    /// representation.
    pub fn to_internal_string(&self) -> String {
        format_scaled(self.0, 4)
    }

    /// Renders with two fractional digits (truncating, never rounding up),
    /// the event-payload representation.
    pub fn to_display_string(&self) -> String {
        format_scaled(self.0, 2)
    }
}

fn format_scaled(scaled: i64, digits: u32) -> String {
    let sign = if scaled < 0 { "-" } else { "" };
    let magnitude = scaled.unsigned_abs();
    let integer_part = magnitude / SCALE as u64;
    let fraction_part = magnitude % SCALE as u64;
    let fraction_str = format!("{fraction_part:04}");
    let truncated = &fraction_str[..digits as usize];
    format!("{sign}{integer_part}.{truncated}")
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_internal_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(Money::parse("100.50").unwrap().scaled(), 1_005_000);
        assert_eq!(Money::parse("7").unwrap().scaled(), 70_000);
        assert_eq!(Money::parse("0.0001").unwrap().scaled(), 1);
    }

    #[test]
    fn rejects_overlong_fraction() {
        assert!(Money::parse("1.00001").is_err());
    }

    #[test]
    fn rejects_non_positive_for_parse_positive() {
        assert!(Money::parse_positive("0").is_err());
        assert!(Money::parse_positive("-5.00").is_err());
    }

    #[test]
    fn display_truncates_to_two_digits() {
        let m = Money::parse("100.5099").unwrap();
        assert_eq!(m.to_display_string(), "100.50");
        assert_eq!(m.to_internal_string(), "100.5099");
    }

    #[test]
    fn arithmetic_round_trips() {
        let a = Money::parse("30.00").unwrap();
        let b = Money::parse("70.00").unwrap();
        assert_eq!(a.checked_add(b).unwrap().to_internal_string(), "100.0000");
        assert_eq!(b.checked_sub(a).unwrap().to_internal_string(), "40.0000");
    }
}
