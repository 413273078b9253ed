//! FX configuration.

use ratebook_common::{
    constants, CurrencyCode, MAX_DECIMAL_DIGITS, RATE_GUARD_DIGITS, RATE_PRECISION,
};
use std::time::Duration;

/// Configuration for rate resolution and caching.
#[derive(Debug, Clone)]
pub struct FxConfig {
    /// Hub currency used to derive indirect rates.
    pub default_currency: CurrencyCode,
    /// Lifetime of cached resolved rates.
    pub cache_ttl: Duration,
    /// Digits carried beyond the stored precision during rate arithmetic.
    pub guard_digits: u32,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            default_currency: CurrencyCode::usd(),
            cache_ttl: constants::rate_cache_ttl(),
            guard_digits: RATE_GUARD_DIGITS,
        }
    }
}

impl FxConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(code) = std::env::var("RATEBOOK_DEFAULT_CURRENCY") {
            if let Ok(code) = CurrencyCode::new(code) {
                config.default_currency = code;
            }
        }

        if let Ok(secs) = std::env::var("RATEBOOK_RATE_CACHE_TTL_SECS") {
            if let Ok(secs) = secs.parse() {
                config.cache_ttl = Duration::from_secs(secs);
            }
        }

        if let Ok(digits) = std::env::var("RATEBOOK_GUARD_DIGITS") {
            if let Ok(digits) = digits.parse() {
                config.guard_digits = digits;
            }
        }

        config
    }

    /// Significant digits used for rate arithmetic.
    pub fn working_digits(&self) -> u32 {
        RATE_PRECISION.saturating_add(self.guard_digits)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_ttl.is_zero() {
            return Err("Rate cache TTL cannot be 0".to_string());
        }

        if self.working_digits() > MAX_DECIMAL_DIGITS {
            return Err(format!(
                "Working precision {} exceeds {} digits",
                self.working_digits(),
                MAX_DECIMAL_DIGITS
            ));
        }

        Ok(())
    }
}
