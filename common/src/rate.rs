//! Exchange rate records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RateError, Result};
use crate::CurrencyCode;

/// Fractional digits kept for stored rates and money values.
pub const RATE_PRECISION: u32 = 5;

/// Total significant digits a stored rate may carry.
pub const RATE_MAX_DIGITS: u32 = 9;

/// Extra digits carried through rate arithmetic before anything is stored.
pub const RATE_GUARD_DIGITS: u32 = 10;

/// Store-assigned identifier of a persisted rate. Higher ids were inserted later.
pub type RateId = u64;

/// Exchange rate from `base` to `foreign` settled on `date`.
///
/// One unit of `base` buys `rate` units of `foreign`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Identifier, `None` until persisted.
    pub id: Option<RateId>,
    pub base: CurrencyCode,
    pub foreign: CurrencyCode,
    pub rate: Decimal,
    /// Settlement date.
    pub date: NaiveDate,
}

impl ExchangeRate {
    /// Create an unsaved rate.
    pub fn new(base: CurrencyCode, foreign: CurrencyCode, rate: Decimal, date: NaiveDate) -> Self {
        Self {
            id: None,
            base,
            foreign,
            rate,
            date,
        }
    }

    /// Whether this rate has been persisted.
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// Copy of this rate with the value rounded to the stored precision.
    pub fn quantized(&self) -> Self {
        Self {
            rate: quantize(self.rate, RATE_PRECISION),
            ..self.clone()
        }
    }

    /// Check the invariants that need no other rows: distinct currencies,
    /// positive rate, no future date and the stored digit range. The rate is
    /// judged as it will be stored, rounded to `RATE_PRECISION` places.
    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        if self.base == self.foreign {
            return Err(RateError::Validation(format!(
                "base and foreign currency are both {}",
                self.base
            )));
        }

        let stored = quantize(self.rate, RATE_PRECISION);
        if stored <= Decimal::ZERO {
            return Err(RateError::Validation(format!("{} is not positive", self.rate)));
        }

        if crate::time::is_future(self.date, today) {
            return Err(RateError::Validation(format!(
                "can't create rate for future date {}",
                self.date
            )));
        }

        let max_whole = Decimal::from(10u64.pow(RATE_MAX_DIGITS - RATE_PRECISION));
        if stored >= max_whole {
            return Err(RateError::Validation(format!(
                "{} has more than {} digits",
                self.rate, RATE_MAX_DIGITS
            )));
        }

        Ok(())
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {} for {}: {}",
            self.base, self.foreign, self.date, self.rate
        )
    }
}

/// A resolved rate and whether it must be inverted to answer the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateQueryResult {
    pub rate: ExchangeRate,
    pub is_reverse: bool,
}

impl RateQueryResult {
    pub fn direct(rate: ExchangeRate) -> Self {
        Self {
            rate,
            is_reverse: false,
        }
    }

    pub fn reverse(rate: ExchangeRate) -> Self {
        Self {
            rate,
            is_reverse: true,
        }
    }

    /// Rate from the queried base to the queried foreign currency, at `digits`
    /// significant digits when inverting.
    pub fn effective_rate(&self, digits: u32) -> Result<Decimal> {
        if !self.is_reverse {
            return Ok(self.rate.rate);
        }
        let inverted = Decimal::ONE
            .checked_div(self.rate.rate)
            .ok_or_else(|| RateError::Validation(format!("cannot invert rate {}", self.rate)))?;
        Ok(round_significant(inverted, digits))
    }
}

/// Round to `places` fractional digits, half to even, and pin the scale.
pub fn quantize(value: Decimal, places: u32) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(places, rust_decimal::RoundingStrategy::MidpointNearestEven);
    rounded.rescale(places);
    rounded
}

/// Round to `digits` significant digits, half to even.
pub fn round_significant(value: Decimal, digits: u32) -> Decimal {
    if value.is_zero() {
        return value;
    }
    value
        .round_sf_with_strategy(digits, rust_decimal::RoundingStrategy::MidpointNearestEven)
        .unwrap_or(value)
}
