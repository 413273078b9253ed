//! Error types for Ratebook.

use chrono::NaiveDate;
use thiserror::Error;

use crate::CurrencyCode;

/// Main error type for rate resolution, caching and money arithmetic.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateError {
    /// No direct, reverse or derivable indirect rate exists.
    #[error("No exchange rate found for {base} to {foreign}")]
    NotFound {
        base: CurrencyCode,
        foreign: CurrencyCode,
    },

    /// The chosen direct or reverse rate is older than a derivable indirect rate.
    #[error(
        "Rate {base} to {foreign} dated {recorded_date} is older than indirect rate dated {indirect_date}"
    )]
    Conflict {
        base: CurrencyCode,
        foreign: CurrencyCode,
        recorded_date: NaiveDate,
        indirect_date: NaiveDate,
    },

    /// Malformed currency reference.
    #[error("Invalid currency code: {0:?}")]
    InvalidCurrency(String),

    /// Currency code with no registered currency record.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(CurrencyCode),

    /// Arithmetic between amounts of different currencies.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch {
        expected: CurrencyCode,
        actual: CurrencyCode,
    },

    /// Caching wrapper called with conflicting or unsupported argument styles.
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// A rate for the same base, foreign and date is already stored.
    #[error("Rate {base} to {foreign} for {date} already exists")]
    UniqueConstraintViolation {
        base: CurrencyCode,
        foreign: CurrencyCode,
        date: NaiveDate,
    },

    /// A rate failed store-boundary validation.
    #[error("Invalid exchange rate: {0}")]
    Validation(String),

    /// A monetary value could not be represented.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A money format template could not be rendered.
    #[error("Invalid money format: {0}")]
    InvalidFormat(String),

    /// Rate store I/O failure.
    #[error("Rate store error: {0}")]
    Store(String),

    /// Cache store I/O failure.
    #[error("Cache store error: {0}")]
    Cache(String),
}

impl RateError {
    /// Check if this error is transient and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RateError::Store(_) | RateError::Cache(_))
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RateError::NotFound { .. } => "NOT_FOUND",
            RateError::Conflict { .. } => "CONFLICT",
            RateError::InvalidCurrency(_) => "INVALID_CURRENCY",
            RateError::UnknownCurrency(_) => "UNKNOWN_CURRENCY",
            RateError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            RateError::InvalidUsage(_) => "INVALID_USAGE",
            RateError::UniqueConstraintViolation { .. } => "UNIQUE_CONSTRAINT_VIOLATION",
            RateError::Validation(_) => "VALIDATION",
            RateError::InvalidAmount(_) => "INVALID_AMOUNT",
            RateError::InvalidFormat(_) => "INVALID_FORMAT",
            RateError::Store(_) => "STORE_ERROR",
            RateError::Cache(_) => "CACHE_ERROR",
        }
    }
}

/// Result type alias for Ratebook operations.
pub type Result<T> = std::result::Result<T, RateError>;
