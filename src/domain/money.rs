use crate::error::LogisticsError;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Minor-unit precision for every currency amount handled by the platform.
pub const CURRENCY_SCALE: u32 = 2;

fn to_minor_units(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn out_of_range() -> LogisticsError {
    LogisticsError::InvalidAmount("Amount is out of range".to_string())
}

/// Adds up `values`, failing with `InvalidAmount` instead of overflowing.
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, LogisticsError> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |total, value| total.checked_add(value).ok_or_else(out_of_range))
}

/// A wallet balance in currency units.
///
/// This is a wrapper around `rust_decimal::Decimal`, so repeated credits and
/// debits never drift the way floating point would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.value()
    }

    /// The balance moved by `delta`, or `InvalidAmount` if that overflows.
    pub fn checked_add(self, delta: Decimal) -> Result<Self, LogisticsError> {
        self.0.checked_add(delta).map(Self).ok_or_else(out_of_range)
    }

    pub fn checked_sub(self, delta: Decimal) -> Result<Self, LogisticsError> {
        self.0.checked_sub(delta).map(Self).ok_or_else(out_of_range)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

/// A strictly positive amount moved by a ledger entry or a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, LogisticsError> {
        let value = to_minor_units(value);
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(LogisticsError::InvalidAmount(
                "Amount must be greater than 0".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = LogisticsError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Amount::new(value).map_err(serde::de::Error::custom)
    }
}

/// The price of a pickup job. Zero is allowed, negatives are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct Price(Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self, LogisticsError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(LogisticsError::ValidationError(
                "Price cannot be negative".to_string(),
            ));
        }
        Ok(Self(to_minor_units(value)))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// `percentage` percent of this price, rounded to minor units.
    pub fn percent(&self, percentage: Decimal) -> Result<Decimal, LogisticsError> {
        self.0
            .checked_mul(percentage / Decimal::ONE_HUNDRED)
            .map(to_minor_units)
            .ok_or_else(out_of_range)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = LogisticsError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = <Decimal as Deserialize>::deserialize(deserializer)?;
        Price::new(value).map_err(serde::de::Error::custom)
    }
}
