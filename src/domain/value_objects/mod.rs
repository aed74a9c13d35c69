//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;
use thiserror::Error;

/// Money value object, held in minor currency units (paise for INR).
///
/// JSON carries major units as a number (`1080.5`), which is what storefront
/// clients and the gateway checkout widget expect. Arithmetic never leaves
/// integers, so a summary always equals the sum of its parts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_minor(minor: i64) -> Self { Self(minor) }
    pub fn from_major(units: i64) -> Self { Self(units * 100) }
    pub fn minor(&self) -> i64 { self.0 }
    pub fn is_zero(&self) -> bool { self.0 == 0 }

    /// Converts a major-unit decimal, rounding half away from zero to the
    /// nearest minor unit. Negative or out-of-range amounts are rejected.
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        if amount.is_sign_negative() && !amount.is_zero() { return None; }
        (amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Self)
    }

    pub fn to_decimal(&self) -> Decimal { Decimal::new(self.0, 2) }

    pub fn times(&self, qty: u32) -> Result<Money, AmountOverflow> {
        self.0.checked_mul(i64::from(qty)).map(Money).ok_or(AmountOverflow)
    }

    /// Share of this amount in basis points, rounded half-up to a minor unit.
    pub fn basis_points(&self, bps: u32) -> Result<Money, AmountOverflow> {
        let share = (i128::from(self.0) * i128::from(bps) + 5_000) / 10_000;
        i64::try_from(share).map(Money).map_err(|_| AmountOverflow)
    }

    pub fn checked_add(self, rhs: Money) -> Result<Money, AmountOverflow> {
        self.0.checked_add(rhs.0).map(Money).ok_or(AmountOverflow)
    }
}

/// Saturates; priced amounts go through [`Money::checked_add`].
impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0.saturating_add(rhs.0)) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("amount is out of range")]
pub struct AmountOverflow;

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.to_decimal()) }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        rust_decimal::serde::float::serialize(&self.to_decimal(), serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = rust_decimal::serde::float::deserialize(deserializer)?;
        Money::from_decimal(amount).ok_or_else(|| de::Error::custom("amount must be a non-negative number"))
    }
}

/// Stable external product identifier (`PROD-482913`), distinct from the storage id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCode(String);

impl ProductCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CodeError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(CodeError::Empty); }
        if value.len() > 64 { return Err(CodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn generate() -> Self { Self(format!("PROD-{}", rand::random::<u32>() % 900_000 + 100_000)) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ProductCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Human-readable order code shown to customers (`ORD0048213377`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderCode(String);

impl OrderCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CodeError::Empty); }
        if value.len() > 32 { return Err(CodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn generate() -> Self { Self(format!("ORD{:010}", rand::random::<u32>())) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CodeError { Empty, TooLong, Malformed }
impl std::error::Error for CodeError {}
impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "code is empty"),
            Self::TooLong => write!(f, "code too long"),
            Self::Malformed => write!(f, "code is malformed"),
        }
    }
}

/// Six digit postal code, first digit non-zero.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pincode(String);

impl Pincode {
    pub fn new(value: impl AsRef<str>) -> Result<Self, CodeError> {
        let value = value.as_ref().trim();
        if value.is_empty() { return Err(CodeError::Empty); }
        let bytes = value.as_bytes();
        let well_formed = bytes.len() == 6
            && bytes.iter().all(u8::is_ascii_digit)
            && bytes[0] != b'0';
        if !well_formed { return Err(CodeError::Malformed); }
        Ok(Self(value.to_string()))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Pincode {
    type Error = CodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Pincode> for String {
    fn from(p: Pincode) -> String { p.0 }
}

impl fmt::Display for Pincode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_decimal_rounds_to_minor_units() {
        assert_eq!(Money::from_decimal(Decimal::new(75001, 2)).unwrap().minor(), 75001);
        assert_eq!(Money::from_decimal(Decimal::new(1005, 3)).unwrap().minor(), 101);
        assert!(Money::from_decimal(Decimal::new(-1, 0)).is_none());
    }

    #[test]
    fn test_money_json_uses_major_units() {
        let json = serde_json::to_string(&Money::from_minor(108_050)).unwrap();
        assert_eq!(json, "1080.5");
        let back: Money = serde_json::from_str("99").unwrap();
        assert_eq!(back, Money::from_major(99));
        assert!(serde_json::from_str::<Money>("-4").is_err());
    }

    #[test]
    fn test_basis_points_rounds_half_up() {
        assert_eq!(Money::from_major(1000).basis_points(800), Ok(Money::from_major(80)));
        // 8% of 7 paise is 0.56 paise
        assert_eq!(Money::from_minor(7).basis_points(800), Ok(Money::from_minor(1)));
        assert_eq!(Money::from_minor(6).basis_points(800), Ok(Money::from_minor(0)));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let price = Money::from_major(30_000_000);
        assert_eq!(price.times(4_000_000_000), Err(AmountOverflow));
        assert_eq!(price.times(3), Ok(Money::from_major(90_000_000)));
        assert_eq!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)), Err(AmountOverflow));
        assert_eq!(Money::from_minor(i64::MAX) + Money::from_minor(1), Money::from_minor(i64::MAX));
    }

    #[test]
    fn test_pincode() {
        assert_eq!(Pincode::new(" 560001 ").unwrap().as_str(), "560001");
        assert_eq!(Pincode::new("060001"), Err(CodeError::Malformed));
        assert_eq!(Pincode::new("56001"), Err(CodeError::Malformed));
        assert_eq!(Pincode::new("56000a"), Err(CodeError::Malformed));
    }

    #[test]
    fn test_generated_codes() {
        let code = ProductCode::generate();
        assert!(code.as_str().starts_with("PROD-"));
        assert_eq!(code.as_str().len(), 11);
        assert!(OrderCode::generate().as_str().starts_with("ORD"));
        assert_eq!(OrderCode::new("ord0000000042").unwrap().as_str(), "ORD0000000042");
    }

    #[test]
    fn test_quantity() {
        let q = Quantity::new(3);
        assert_eq!(q.subtract(2), Some(Quantity::new(1)));
        assert_eq!(q.subtract(4), None);
        assert!(q.subtract(3).unwrap().is_zero());
    }
}
