//! Exchange rate resolution from direct, reverse and indirect rates.

use ratebook_common::{
    round_significant, CurrencyCode, ExchangeRate, RateError, RateQueryResult, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::FxConfig;
use crate::store::RateStore;

/// Finds the best available rate between two currencies.
///
/// Candidates are the latest direct rate, the latest reverse rate and an
/// indirect rate derived through the default currency. A derived rate that
/// ends up being returned is persisted first; that is the only write the
/// resolver performs.
pub struct RateResolver {
    store: Arc<dyn RateStore>,
    default_currency: CurrencyCode,
    working_digits: u32,
}

impl RateResolver {
    /// Create a resolver over `store`.
    pub fn new(store: Arc<dyn RateStore>, config: &FxConfig) -> Self {
        Self {
            store,
            default_currency: config.default_currency.clone(),
            working_digits: config.working_digits(),
        }
    }

    pub fn default_currency(&self) -> &CurrencyCode {
        &self.default_currency
    }

    /// Resolve the rate used to convert `base` into `foreign`.
    ///
    /// Fails with `NotFound` when no path exists, and with `Conflict` when the
    /// recorded direct or reverse rate is older than the derivable indirect
    /// rate, unless `ignore_conflict` is set, in which case the indirect rate
    /// wins.
    #[instrument(skip(self), fields(base = %base, foreign = %foreign))]
    pub fn resolve(
        &self,
        base: &CurrencyCode,
        foreign: &CurrencyCode,
        ignore_conflict: bool,
    ) -> Result<RateQueryResult> {
        if base == foreign {
            return Err(not_found(base, foreign));
        }

        let direct = self.store.latest_rate(base, foreign)?;
        let reverse = self.store.latest_rate(foreign, base)?;
        let indirect = self.derive_indirect(base, foreign)?;

        let Some(indirect) = indirect else {
            return match (direct, reverse) {
                (Some(direct), _) => Ok(RateQueryResult::direct(direct)),
                (None, Some(reverse)) => Ok(RateQueryResult::reverse(reverse)),
                (None, None) => Err(not_found(base, foreign)),
            };
        };

        let chosen = match (direct, reverse) {
            (Some(direct), _) => RateQueryResult::direct(direct),
            (None, Some(reverse)) => RateQueryResult::reverse(reverse),
            (None, None) => {
                debug!(rate = %indirect, "Only an indirect rate is available");
                return self.persist_indirect(indirect).map(RateQueryResult::direct);
            }
        };

        if chosen.rate.date < indirect.date {
            if !ignore_conflict {
                return Err(RateError::Conflict {
                    base: base.clone(),
                    foreign: foreign.clone(),
                    recorded_date: chosen.rate.date,
                    indirect_date: indirect.date,
                });
            }
            warn!(
                stale = %chosen.rate,
                indirect = %indirect,
                "Recorded rate is older than indirect rate, using indirect rate"
            );
            return self.persist_indirect(indirect).map(RateQueryResult::direct);
        }

        Ok(chosen)
    }

    /// Resolve and return the multiplier from `base` to `foreign`, inverting
    /// reverse rates. Identical currencies convert at one.
    pub fn get_rate(
        &self,
        base: &CurrencyCode,
        foreign: &CurrencyCode,
        ignore_conflict: bool,
    ) -> Result<Decimal> {
        if base == foreign {
            return Ok(Decimal::ONE);
        }
        self.resolve(base, foreign, ignore_conflict)?
            .effective_rate(self.working_digits)
    }

    /// Derive `base` to `foreign` through the default currency as
    /// `rate(default -> base) / rate(default -> foreign)`, dated at the later
    /// of the two.
    fn derive_indirect(
        &self,
        base: &CurrencyCode,
        foreign: &CurrencyCode,
    ) -> Result<Option<ExchangeRate>> {
        if base == &self.default_currency {
            return Ok(None);
        }

        let Some(to_base) = self.store.latest_rate(&self.default_currency, base)? else {
            return Ok(None);
        };
        let Some(to_foreign) = self.store.latest_rate(&self.default_currency, foreign)? else {
            return Ok(None);
        };

        let rate = to_base.rate.checked_div(to_foreign.rate).ok_or_else(|| {
            RateError::Validation(format!("cannot divide {} by {}", to_base, to_foreign))
        })?;

        Ok(Some(ExchangeRate::new(
            base.clone(),
            foreign.clone(),
            round_significant(rate, self.working_digits),
            to_base.date.max(to_foreign.date),
        )))
    }

    /// Store a derived rate and return the stored row. Losing an insert race
    /// to a concurrent resolver is not an error: the winner's row is used.
    /// When a same-day reverse rate prevents storing it, the quantized
    /// derived rate is returned without an id.
    fn persist_indirect(&self, rate: ExchangeRate) -> Result<ExchangeRate> {
        match self.store.insert_rate(rate.clone()) {
            Ok(saved) => {
                info!(rate = %saved, "Persisted indirect rate");
                Ok(saved)
            }
            Err(RateError::UniqueConstraintViolation { .. }) => {
                warn!(rate = %rate, "Indirect rate already stored by a concurrent writer");
                self.store
                    .rate_on(&rate.base, &rate.foreign, rate.date)?
                    .ok_or_else(|| not_found(&rate.base, &rate.foreign))
            }
            Err(RateError::Validation(reason)) => {
                // A reverse row on the same date blocks storing the derived
                // direction. The derived rate is still the answer, unsaved.
                if self
                    .store
                    .rate_on(&rate.foreign, &rate.base, rate.date)?
                    .is_none()
                {
                    return Err(RateError::Validation(reason));
                }
                warn!(rate = %rate, "Same-day reverse rate exists, indirect rate not stored");
                Ok(rate.quantized())
            }
            Err(e) => Err(e),
        }
    }
}

fn not_found(base: &CurrencyCode, foreign: &CurrencyCode) -> RateError {
    RateError::NotFound {
        base: base.clone(),
        foreign: foreign.clone(),
    }
}
