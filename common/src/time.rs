//! Time utilities and constants for Ratebook.

use chrono::{NaiveDate, Utc};
use std::time::Duration;

/// Caching constants.
pub mod constants {
    use super::Duration;

    /// Lifetime of a cached resolved rate (one day).
    pub fn rate_cache_ttl() -> Duration {
        Duration::from_secs(86_400)
    }
}

/// Source of the current settlement date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Clock backed by the system time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        today()
    }
}

/// Clock pinned to one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Get the current UTC date.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Check if a date lies after `today`.
pub fn is_future(date: NaiveDate, today: NaiveDate) -> bool {
    date > today
}
