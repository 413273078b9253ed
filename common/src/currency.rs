//! Currency codes, currency records and currency references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{RateError, Result};
use crate::template::render_template;

/// Number of characters in a currency code.
pub const CURRENCY_CODE_LEN: usize = 3;

/// Default money format template.
pub const DEFAULT_MONEY_FORMAT: &str = "{short_name}{value}";

/// A three character currency code, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a currency code, rejecting anything that is not exactly three
    /// characters once uppercased.
    pub fn new(code: impl AsRef<str>) -> Result<Self> {
        let code = code.as_ref();
        let normalized = code.to_uppercase();
        if normalized.chars().count() != CURRENCY_CODE_LEN {
            return Err(RateError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(normalized))
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Common currencies
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn gbp() -> Self {
        Self("GBP".to_string())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = RateError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for CurrencyCode {
    type Error = RateError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CurrencyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Currency record with display information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    /// Unique currency code.
    pub code: CurrencyCode,
    /// Symbol or short name, e.g. `$`.
    pub short_name: String,
    /// Full name, e.g. `US dollar`.
    pub full_name: String,
    /// Format template with `{code}`, `{short_name}`, `{full_name}` and `{value}` placeholders.
    pub money_format: String,
}

impl Currency {
    /// Create a currency with empty names and the default format.
    pub fn new(code: CurrencyCode) -> Self {
        Self {
            code,
            short_name: String::new(),
            full_name: String::new(),
            money_format: DEFAULT_MONEY_FORMAT.to_string(),
        }
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    pub fn with_money_format(mut self, money_format: impl Into<String>) -> Self {
        self.money_format = money_format.into();
        self
    }

    /// Record used for the default currency when none is registered yet.
    pub fn default_for(code: CurrencyCode) -> Self {
        Self::new(code).with_short_name("$")
    }

    /// Render `value` through `money_format`.
    ///
    /// `{{` and `}}` produce literal braces. Any other placeholder name is an error.
    pub fn format(&self, value: impl fmt::Display) -> Result<String> {
        let value = value.to_string();
        render_template(&self.money_format, |name| match name {
            "code" => Some(self.code.as_str()),
            "short_name" => Some(self.short_name.as_str()),
            "full_name" => Some(self.full_name.as_str()),
            "value" => Some(value.as_str()),
            _ => None,
        })
        .map_err(|e| RateError::InvalidFormat(format!("{} in {:?}", e, self.money_format)))
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Lookup of currency records by code.
pub trait CurrencyRegistry: Send + Sync {
    /// Get the currency with the given code.
    fn currency(&self, code: &CurrencyCode) -> Result<Option<Currency>>;

    /// Get the currency with `currency.code`, registering `currency` if it is missing.
    fn get_or_create_currency(&self, currency: Currency) -> Result<Currency>;
}

/// Either a bare code or an already resolved currency record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrencyRef {
    Code(CurrencyCode),
    Resolved(Currency),
}

impl CurrencyRef {
    /// Get the code without touching any registry.
    pub fn code(&self) -> &CurrencyCode {
        match self {
            CurrencyRef::Code(code) => code,
            CurrencyRef::Resolved(currency) => &currency.code,
        }
    }

    /// Resolve to a currency record.
    pub fn resolve(self, registry: &dyn CurrencyRegistry) -> Result<Currency> {
        match self {
            CurrencyRef::Resolved(currency) => Ok(currency),
            CurrencyRef::Code(code) => registry
                .currency(&code)?
                .ok_or(RateError::UnknownCurrency(code)),
        }
    }
}

impl From<CurrencyCode> for CurrencyRef {
    fn from(code: CurrencyCode) -> Self {
        CurrencyRef::Code(code)
    }
}

impl From<Currency> for CurrencyRef {
    fn from(currency: Currency) -> Self {
        CurrencyRef::Resolved(currency)
    }
}

impl fmt::Display for CurrencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
