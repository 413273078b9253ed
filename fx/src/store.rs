//! Rate store traits and the in-memory implementation.

use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::RwLock;
use ratebook_common::{
    Clock, Currency, CurrencyCode, CurrencyRegistry, ExchangeRate, RateError, RateId, Result,
    SystemClock,
};
use std::sync::Arc;
use tracing::debug;

/// Persistent record of historical exchange rates.
///
/// Implementations enforce at the boundary: `(base, foreign, date)` is unique,
/// the rate is positive, the date is not in the future, and no rate exists in
/// the opposite direction for the same date. Rates are stored rounded to
/// `RATE_PRECISION` places.
pub trait RateStore: Send + Sync {
    /// Most recent rate from `base` to `foreign`. Among rates sharing the latest
    /// date, the one inserted last wins.
    fn latest_rate(&self, base: &CurrencyCode, foreign: &CurrencyCode)
        -> Result<Option<ExchangeRate>>;

    /// Rate from `base` to `foreign` settled on exactly `date`.
    fn rate_on(
        &self,
        base: &CurrencyCode,
        foreign: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>>;

    /// Insert a new rate, returning it as stored.
    ///
    /// Fails with `UniqueConstraintViolation` if a rate for the same base,
    /// foreign and date already exists.
    fn insert_rate(&self, rate: ExchangeRate) -> Result<ExchangeRate>;

    /// Replace a stored rate, matched by id.
    fn update_rate(&self, rate: ExchangeRate) -> Result<ExchangeRate>;
}

/// Rate store and currency registry held in memory.
pub struct MemoryRateStore {
    rates: RwLock<Vec<ExchangeRate>>,
    currencies: DashMap<CurrencyCode, Currency>,
    clock: Arc<dyn Clock>,
}

impl MemoryRateStore {
    /// Create an empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store that judges future dates with `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            rates: RwLock::new(Vec::new()),
            currencies: DashMap::new(),
            clock,
        }
    }

    /// Number of stored rates.
    pub fn len(&self) -> usize {
        self.rates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.read().is_empty()
    }

    /// All stored rates, most recent first.
    pub fn all_rates(&self) -> Vec<ExchangeRate> {
        let mut rates = self.rates.read().clone();
        rates.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
        rates
    }

    /// Check the invariants that involve other rows. `skip` excludes the row
    /// being updated.
    fn check_conflicts(
        rates: &[ExchangeRate],
        rate: &ExchangeRate,
        skip: Option<RateId>,
    ) -> Result<()> {
        let others = rates.iter().filter(|r| skip.is_none() || r.id != skip);

        for existing in others {
            if existing.date != rate.date {
                continue;
            }
            if existing.base == rate.base && existing.foreign == rate.foreign {
                return Err(RateError::UniqueConstraintViolation {
                    base: rate.base.clone(),
                    foreign: rate.foreign.clone(),
                    date: rate.date,
                });
            }
            if existing.base == rate.foreign && existing.foreign == rate.base {
                return Err(RateError::Validation(format!(
                    "reverse rate with id={} for same date already exists",
                    existing.id.unwrap_or_default()
                )));
            }
        }

        Ok(())
    }
}

impl Default for MemoryRateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RateStore for MemoryRateStore {
    fn latest_rate(
        &self,
        base: &CurrencyCode,
        foreign: &CurrencyCode,
    ) -> Result<Option<ExchangeRate>> {
        let rates = self.rates.read();
        Ok(rates
            .iter()
            .filter(|r| &r.base == base && &r.foreign == foreign)
            .max_by_key(|r| (r.date, r.id))
            .cloned())
    }

    fn rate_on(
        &self,
        base: &CurrencyCode,
        foreign: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        let rates = self.rates.read();
        Ok(rates
            .iter()
            .find(|r| &r.base == base && &r.foreign == foreign && r.date == date)
            .cloned())
    }

    fn insert_rate(&self, rate: ExchangeRate) -> Result<ExchangeRate> {
        let mut rate = rate.quantized();
        rate.validate(self.clock.today())?;

        let mut rates = self.rates.write();
        Self::check_conflicts(&rates, &rate, None)?;

        let next_id = rates.iter().filter_map(|r| r.id).max().unwrap_or(0) + 1;
        rate.id = Some(next_id);
        rates.push(rate.clone());

        debug!(id = next_id, rate = %rate, "Inserted exchange rate");
        Ok(rate)
    }

    fn update_rate(&self, rate: ExchangeRate) -> Result<ExchangeRate> {
        let id = rate
            .id
            .ok_or_else(|| RateError::Validation(format!("rate {} has not been saved", rate)))?;
        let rate = rate.quantized();
        rate.validate(self.clock.today())?;

        let mut rates = self.rates.write();
        Self::check_conflicts(&rates, &rate, Some(id))?;

        let slot = rates
            .iter_mut()
            .find(|r| r.id == Some(id))
            .ok_or_else(|| RateError::Validation(format!("no stored rate with id={}", id)))?;
        *slot = rate.clone();

        debug!(id, rate = %rate, "Updated exchange rate");
        Ok(rate)
    }
}

impl CurrencyRegistry for MemoryRateStore {
    fn currency(&self, code: &CurrencyCode) -> Result<Option<Currency>> {
        Ok(self.currencies.get(code).map(|c| c.clone()))
    }

    fn get_or_create_currency(&self, currency: Currency) -> Result<Currency> {
        let entry = self
            .currencies
            .entry(currency.code.clone())
            .or_insert(currency);
        Ok(entry.value().clone())
    }
}
