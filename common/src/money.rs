//! Fixed precision monetary values.

use rust_decimal::Decimal;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::error::{RateError, Result};
use crate::rate::{quantize, round_significant, RATE_PRECISION};
use crate::{Currency, CurrencyCode};

/// Default number of significant digits used for money arithmetic.
pub const DEFAULT_MAX_DIGITS: u32 = 15;

/// Largest precision a `Decimal` can carry.
pub const MAX_DECIMAL_DIGITS: u32 = 28;

/// Something that can answer "how many units of `foreign` does one unit of `base` buy".
pub trait RateSource {
    fn rate(&self, base: &CurrencyCode, foreign: &CurrencyCode) -> Result<Decimal>;
}

impl<T: RateSource + ?Sized> RateSource for &T {
    fn rate(&self, base: &CurrencyCode, foreign: &CurrencyCode) -> Result<Decimal> {
        (**self).rate(base, foreign)
    }
}

impl<T: RateSource + ?Sized> RateSource for Arc<T> {
    fn rate(&self, base: &CurrencyCode, foreign: &CurrencyCode) -> Result<Decimal> {
        (**self).rate(base, foreign)
    }
}

/// Memoized operation on a `Money` instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoOp {
    GetRate,
}

/// Key of a memoized result: the operation and its argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoKey {
    pub op: MemoOp,
    pub arg: CurrencyCode,
}

/// A monetary amount tagged with its currency.
///
/// Values are quantized to five fractional digits on construction and after
/// every operation; every operation returns a new instance.
///
/// Each instance remembers the rates it has fetched. Once `get_rate` has
/// answered for a target currency, later calls on the same instance return
/// that answer without asking the rate source again, even if the underlying
/// rate has changed since. Clones start with an empty memo. The memo makes
/// `Money` `Send` but not `Sync`.
#[derive(Debug, Serialize)]
pub struct Money {
    value: Decimal,
    currency: CurrencyCode,
    #[serde(skip)]
    precision: u32,
    #[serde(skip)]
    memo: RefCell<HashMap<MemoKey, Decimal>>,
}

impl Money {
    /// Create from any value whose string form is a decimal number.
    ///
    /// The value always goes through its string representation, so
    /// `Money::new(5.1, "usd")` holds exactly `5.10000`.
    pub fn new(value: impl fmt::Display, currency: impl AsRef<str>) -> Result<Self> {
        Self::with_max_digits(value, currency, DEFAULT_MAX_DIGITS)
    }

    /// Create with a custom number of significant digits.
    pub fn with_max_digits(
        value: impl fmt::Display,
        currency: impl AsRef<str>,
        max_digits: u32,
    ) -> Result<Self> {
        if max_digits == 0 || max_digits > MAX_DECIMAL_DIGITS {
            return Err(RateError::InvalidAmount(format!(
                "max_digits must be between 1 and {}, got {}",
                MAX_DECIMAL_DIGITS, max_digits
            )));
        }
        let currency = CurrencyCode::new(currency)?;
        let value = parse_decimal(&value.to_string())?;
        Self::from_parts(value, currency, max_digits)
    }

    /// Create a zero amount.
    pub fn zero(currency: CurrencyCode) -> Self {
        Self {
            value: quantize(Decimal::ZERO, RATE_PRECISION),
            currency,
            precision: DEFAULT_MAX_DIGITS,
            memo: RefCell::default(),
        }
    }

    fn from_parts(value: Decimal, currency: CurrencyCode, precision: u32) -> Result<Self> {
        let quantized = quantize(value, RATE_PRECISION);
        if quantized.scale() != RATE_PRECISION || digit_count(quantized) > precision {
            return Err(RateError::InvalidAmount(format!(
                "{} does not fit in {} digits with {} decimal places",
                value, precision, RATE_PRECISION
            )));
        }
        Ok(Self {
            value: quantized,
            currency,
            precision,
            memo: RefCell::default(),
        })
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// New amount in the same currency.
    pub fn with_value(&self, value: impl fmt::Display) -> Result<Self> {
        let value = parse_decimal(&value.to_string())?;
        self.derive(value)
    }

    fn derive(&self, value: Decimal) -> Result<Self> {
        Self::from_parts(
            round_significant(value, self.precision),
            self.currency.clone(),
            self.precision,
        )
    }

    fn same_currencies(&self, other: &Money) -> Result<()> {
        if self.currency != other.currency {
            return Err(RateError::CurrencyMismatch {
                expected: self.currency.clone(),
                actual: other.currency.clone(),
            });
        }
        Ok(())
    }

    pub fn try_add(&self, other: &Money) -> Result<Money> {
        self.same_currencies(other)?;
        let sum = self
            .value
            .checked_add(other.value)
            .ok_or_else(|| overflow("addition"))?;
        self.derive(sum)
    }

    pub fn try_sub(&self, other: &Money) -> Result<Money> {
        self.same_currencies(other)?;
        let difference = self
            .value
            .checked_sub(other.value)
            .ok_or_else(|| overflow("subtraction"))?;
        self.derive(difference)
    }

    /// Multiply by a plain scalar, parsed from its string form.
    pub fn try_mul(&self, factor: impl fmt::Display) -> Result<Money> {
        let factor = parse_decimal(&factor.to_string())?;
        let product = self
            .value
            .checked_mul(factor)
            .ok_or_else(|| overflow("multiplication"))?;
        self.derive(product)
    }

    /// Divide by a plain scalar, parsed from its string form. The quotient is
    /// rounded, never truncated.
    pub fn try_div(&self, divisor: impl fmt::Display) -> Result<Money> {
        let divisor = parse_decimal(&divisor.to_string())?;
        if divisor.is_zero() {
            return Err(RateError::InvalidAmount(format!(
                "division of {} by zero",
                self
            )));
        }
        let quotient = self
            .value
            .checked_div(divisor)
            .ok_or_else(|| overflow("division"))?;
        self.derive(quotient)
    }

    /// Rate from this amount's currency to `target`, remembered for the
    /// lifetime of this instance. Failures are not remembered.
    pub fn get_rate<R>(&self, target: &CurrencyCode, rates: &R) -> Result<Decimal>
    where
        R: RateSource + ?Sized,
    {
        let key = MemoKey {
            op: MemoOp::GetRate,
            arg: target.clone(),
        };

        if let Some(rate) = self.memo.borrow().get(&key) {
            debug!(base = %self.currency, foreign = %target, "Memoized rate hit");
            return Ok(*rate);
        }

        let rate = rates.rate(&self.currency, target)?;
        self.memo.borrow_mut().insert(key, rate);
        Ok(rate)
    }

    /// Convert into `target` using the memoized rate.
    pub fn convert_to<R>(&self, target: impl AsRef<str>, rates: &R) -> Result<Money>
    where
        R: RateSource + ?Sized,
    {
        let target = CurrencyCode::new(target)?;
        let rate = self.get_rate(&target, rates)?;
        let converted = self
            .value
            .checked_mul(rate)
            .ok_or_else(|| overflow("conversion"))?;
        Self::from_parts(
            round_significant(converted, self.precision),
            target,
            self.precision,
        )
    }

    /// Render through the currency's format template.
    pub fn format_with(&self, currency: &Currency) -> Result<String> {
        if currency.code != self.currency {
            return Err(RateError::CurrencyMismatch {
                expected: self.currency.clone(),
                actual: currency.code.clone(),
            });
        }
        currency.format(self.value)
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| RateError::InvalidAmount(format!("{:?} is not a decimal number", raw)))
}

fn digit_count(value: Decimal) -> u32 {
    let mantissa = value.mantissa().unsigned_abs();
    if mantissa == 0 {
        1
    } else {
        mantissa.ilog10() + 1
    }
}

fn overflow(operation: &str) -> RateError {
    RateError::InvalidAmount(format!("{} overflowed", operation))
}

impl Clone for Money {
    fn clone(&self) -> Self {
        Self {
            value: self.value,
            currency: self.currency.clone(),
            precision: self.precision,
            memo: RefCell::default(),
        }
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.currency == other.currency
    }
}

impl Eq for Money {}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.currency)
    }
}

impl Add for &Money {
    type Output = Result<Money>;

    fn add(self, other: &Money) -> Self::Output {
        self.try_add(other)
    }
}

impl Add for Money {
    type Output = Result<Money>;

    fn add(self, other: Money) -> Self::Output {
        self.try_add(&other)
    }
}

impl Sub for &Money {
    type Output = Result<Money>;

    fn sub(self, other: &Money) -> Self::Output {
        self.try_sub(other)
    }
}

impl Sub for Money {
    type Output = Result<Money>;

    fn sub(self, other: Money) -> Self::Output {
        self.try_sub(&other)
    }
}

impl Mul<Decimal> for &Money {
    type Output = Result<Money>;

    fn mul(self, factor: Decimal) -> Self::Output {
        self.try_mul(factor)
    }
}

impl Mul<Decimal> for Money {
    type Output = Result<Money>;

    fn mul(self, factor: Decimal) -> Self::Output {
        self.try_mul(factor)
    }
}

impl Div<Decimal> for &Money {
    type Output = Result<Money>;

    fn div(self, divisor: Decimal) -> Self::Output {
        self.try_div(divisor)
    }
}

impl Div<Decimal> for Money {
    type Output = Result<Money>;

    fn div(self, divisor: Decimal) -> Self::Output {
        self.try_div(divisor)
    }
}

impl Neg for &Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money {
            value: -self.value,
            currency: self.currency.clone(),
            precision: self.precision,
            memo: RefCell::default(),
        }
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        -&self
    }
}
