use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid currency code: '{0}'")]
    InvalidCurrency(String),
    #[error("Currency mismatch: {0} vs {1}")]
    CurrencyMismatch(Currency, Currency),
    #[error("Unparsable amount: '{0}'")]
    UnparsableAmount(String),
}

/// Three-letter uppercase ISO 4217 code, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");
    pub const GBP: Currency = Currency(*b"GBP");
    pub const CAD: Currency = Currency(*b"CAD");

    pub fn as_str(&self) -> &str {
        // Construction guarantees uppercase ASCII.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 3 || !s.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(MoneyError::InvalidCurrency(s.to_string()));
        }
        let mut code = [0u8; 3];
        for (i, b) in s.bytes().enumerate() {
            code[i] = b.to_ascii_uppercase();
        }
        Ok(Currency(code))
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> String {
        c.as_str().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A signed amount in integer minor units (cents) with an explicit currency.
/// Amounts are never represented as floats anywhere in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub minor_units: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(minor_units: i64, currency: Currency) -> Self {
        Money { minor_units, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Money { minor_units: 0, currency }
    }

    pub fn is_zero(self) -> bool {
        self.minor_units == 0
    }

    pub fn is_negative(self) -> bool {
        self.minor_units < 0
    }

    pub fn abs(self) -> Self {
        Money { minor_units: self.minor_units.abs(), ..self }
    }

    pub fn negate(self) -> Self {
        Money { minor_units: -self.minor_units, ..self }
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, MoneyError> {
        if self.currency != rhs.currency {
            return Err(MoneyError::CurrencyMismatch(self.currency, rhs.currency));
        }
        Ok(Money {
            minor_units: self.minor_units + rhs.minor_units,
            currency: self.currency,
        })
    }

    pub fn checked_sub(self, rhs: Money) -> Result<Money, MoneyError> {
        self.checked_add(rhs.negate())
    }

    /// Parse a plain decimal string ("12.34", "-5", "0.01") into minor units.
    /// Locale-specific cleanup (symbols, thousands separators, parentheses)
    /// happens upstream in the normalizer; this conversion itself is exact.
    pub fn parse(s: &str, currency: Currency) -> Result<Money, MoneyError> {
        let dec = Decimal::from_str(s.trim())
            .map_err(|_| MoneyError::UnparsableAmount(s.to_string()))?;
        let minor = (dec * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| MoneyError::UnparsableAmount(s.to_string()))?;
        Ok(Money::new(minor, currency))
    }

    /// Decimal rendering without the currency code ("-12.34").
    pub fn to_decimal_string(self) -> String {
        Decimal::new(self.minor_units, 2).to_string()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_parse_normalizes_case() {
        let c: Currency = "usd".parse().unwrap();
        assert_eq!(c, Currency::USD);
        assert_eq!(c.as_str(), "USD");
    }

    #[test]
    fn currency_parse_rejects_bad_codes() {
        assert!("US".parse::<Currency>().is_err());
        assert!("DOLLARS".parse::<Currency>().is_err());
        assert!("U$D".parse::<Currency>().is_err());
        assert!("".parse::<Currency>().is_err());
    }

    #[test]
    fn money_parse_exact() {
        assert_eq!(Money::parse("12.34", Currency::USD).unwrap().minor_units, 1234);
        assert_eq!(Money::parse("-5", Currency::USD).unwrap().minor_units, -500);
        assert_eq!(Money::parse("0.01", Currency::USD).unwrap().minor_units, 1);
    }

    #[test]
    fn money_parse_invalid() {
        assert!(Money::parse("abc", Currency::USD).is_err());
        assert!(Money::parse("", Currency::USD).is_err());
    }

    #[test]
    fn money_display_roundtrip() {
        // Display must preserve the numeric value exactly — no float drift.
        for cents in [-123456, -1, 0, 1, 99, 100, 123456789] {
            let m = Money::new(cents, Currency::USD);
            let back = Money::parse(&m.to_decimal_string(), Currency::USD).unwrap();
            assert_eq!(back, m);
        }
    }

    #[test]
    fn money_display_format() {
        assert_eq!(Money::new(-1234, Currency::USD).to_string(), "-12.34 USD");
        assert_eq!(Money::new(5, Currency::EUR).to_string(), "0.05 EUR");
    }

    #[test]
    fn checked_add_same_currency() {
        let a = Money::new(100, Currency::USD);
        let b = Money::new(250, Currency::USD);
        assert_eq!(a.checked_add(b).unwrap().minor_units, 350);
    }

    #[test]
    fn checked_add_rejects_mixed_currencies() {
        let a = Money::new(100, Currency::USD);
        let b = Money::new(100, Currency::EUR);
        assert!(matches!(
            a.checked_add(b),
            Err(MoneyError::CurrencyMismatch(_, _))
        ));
    }

    #[test]
    fn negate_and_abs() {
        let m = Money::new(-500, Currency::USD);
        assert_eq!(m.abs().minor_units, 500);
        assert_eq!(m.negate().minor_units, 500);
        assert!(m.is_negative());
        assert!(!m.abs().is_negative());
    }
}
