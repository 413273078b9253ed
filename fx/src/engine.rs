//! FX engine wiring the rate store, resolver and caches together.

use std::fmt;
use std::sync::Arc;

use ratebook_common::{
    Currency, CurrencyCode, CurrencyRef, CurrencyRegistry, ExchangeRate, Money, RateError,
    RateQueryResult, RateSource, Result,
};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::cache::{CacheInvalidatingStore, RateCache};
use crate::cache_store::SharedCacheStore;
use crate::config::FxConfig;
use crate::resolver::RateResolver;
use crate::store::RateStore;

/// The main FX engine.
pub struct FxEngine {
    store: Arc<dyn RateStore>,
    currencies: Arc<dyn CurrencyRegistry>,
    resolver: Arc<RateResolver>,
    cache: RateCache,
    config: FxConfig,
}

impl FxEngine {
    /// Create an engine over the given stores.
    ///
    /// Every rate written through the engine, including derived indirect
    /// rates, invalidates the cached rates of its pair. The default currency
    /// is registered if it is missing.
    pub fn new(
        rates: Arc<dyn RateStore>,
        currencies: Arc<dyn CurrencyRegistry>,
        cache_store: SharedCacheStore,
        config: FxConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RateError::InvalidUsage(format!("invalid configuration: {}", e)))?;

        let store: Arc<dyn RateStore> =
            Arc::new(CacheInvalidatingStore::new(rates, cache_store.clone()));
        let resolver = Arc::new(RateResolver::new(store.clone(), &config));
        let cache = RateCache::new(resolver.clone(), cache_store, config.cache_ttl);

        let engine = Self {
            store,
            currencies,
            resolver,
            cache,
            config,
        };

        let default = engine.default_currency()?;
        info!(default_currency = %default.code, "FX engine ready");

        Ok(engine)
    }

    pub fn config(&self) -> &FxConfig {
        &self.config
    }

    /// The hub currency record, created with `$` as symbol if missing.
    pub fn default_currency(&self) -> Result<Currency> {
        self.currencies
            .get_or_create_currency(Currency::default_for(self.config.default_currency.clone()))
    }

    /// Register a currency, keeping an existing record with the same code.
    pub fn register_currency(&self, currency: Currency) -> Result<Currency> {
        self.currencies.get_or_create_currency(currency)
    }

    /// Look up a registered currency.
    pub fn currency(&self, code: &CurrencyCode) -> Result<Currency> {
        CurrencyRef::Code(code.clone()).resolve(self.currencies.as_ref())
    }

    /// Record a new rate.
    #[instrument(skip(self, rate), fields(rate = %rate))]
    pub fn record_rate(&self, rate: ExchangeRate) -> Result<ExchangeRate> {
        let saved = self.store.insert_rate(rate)?;
        info!(id = ?saved.id, "Recorded exchange rate");
        Ok(saved)
    }

    /// Replace a recorded rate.
    #[instrument(skip(self, rate), fields(rate = %rate))]
    pub fn update_rate(&self, rate: ExchangeRate) -> Result<ExchangeRate> {
        let saved = self.store.update_rate(rate)?;
        info!(id = ?saved.id, "Updated exchange rate");
        Ok(saved)
    }

    /// Resolve the rate record used to convert `from` into `to`.
    #[instrument(skip(self, from, to), fields(from = %from, to = %to))]
    pub fn resolve_rate(
        &self,
        from: impl Into<CurrencyRef> + fmt::Display,
        to: impl Into<CurrencyRef> + fmt::Display,
        ignore_conflict: bool,
    ) -> Result<RateQueryResult> {
        let from = from.into().resolve(self.currencies.as_ref())?;
        let to = to.into().resolve(self.currencies.as_ref())?;
        self.resolver.resolve(&from.code, &to.code, ignore_conflict)
    }

    /// Uncached rate from `from` to `to`.
    pub fn get_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        ignore_conflict: bool,
    ) -> Result<Decimal> {
        self.resolver.get_rate(from, to, ignore_conflict)
    }

    /// Rate from `from` to `to` through the shared cache.
    pub fn cached_rate(&self, from: &CurrencyCode, to: &CurrencyCode) -> Result<Decimal> {
        self.cache.cached_rate(from, to)
    }

    /// Convert `amount` into `target` through the shared cache.
    pub fn convert(&self, amount: &Money, target: impl AsRef<str>) -> Result<Money> {
        amount.convert_to(target, &self.cache)
    }

    /// Render `value` with the currency's format template.
    pub fn format(
        &self,
        currency: impl Into<CurrencyRef>,
        value: impl fmt::Display,
    ) -> Result<String> {
        currency
            .into()
            .resolve(self.currencies.as_ref())?
            .format(value)
    }

    pub fn rate_cache(&self) -> &RateCache {
        &self.cache
    }
}

impl RateSource for FxEngine {
    fn rate(&self, base: &CurrencyCode, foreign: &CurrencyCode) -> Result<Decimal> {
        self.cache.cached_rate(base, foreign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_store::MemoryCacheStore;
    use crate::store::MemoryRateStore;
    use chrono::{Duration, NaiveDate};
    use ratebook_common::FixedClock;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2013, 6, d).unwrap()
    }

    fn code(c: &str) -> CurrencyCode {
        CurrencyCode::new(c).unwrap()
    }

    fn setup() -> (Arc<MemoryRateStore>, FxEngine) {
        let store = Arc::new(MemoryRateStore::with_clock(Arc::new(FixedClock(day(13)))));
        let engine = FxEngine::new(
            store.clone(),
            store.clone(),
            Arc::new(MemoryCacheStore::new()),
            FxConfig::default(),
        )
        .unwrap();
        for c in ["EUR", "GBP", "UAH"] {
            engine.register_currency(Currency::new(code(c))).unwrap();
        }
        (store, engine)
    }

    #[test]
    fn test_default_currency_bootstrap() {
        let (_, engine) = setup();
        let usd = engine.currency(&CurrencyCode::usd()).unwrap();
        assert_eq!(usd.short_name, "$");
        assert_eq!(engine.format(CurrencyCode::usd(), "1.50").unwrap(), "$1.50");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = Arc::new(MemoryRateStore::new());
        let config = FxConfig {
            cache_ttl: std::time::Duration::ZERO,
            ..Default::default()
        };
        let result = FxEngine::new(
            store.clone(),
            store,
            Arc::new(MemoryCacheStore::new()),
            config,
        );
        assert!(matches!(result, Err(RateError::InvalidUsage(_))));
    }

    #[test]
    fn test_convert_with_reverse_rate() {
        let (_, engine) = setup();
        engine
            .record_rate(ExchangeRate::new(code("EUR"), code("USD"), dec!(1.3), day(13)))
            .unwrap();

        let usd = Money::new(1245.22, "USD").unwrap();
        let eur = engine.convert(&usd, "EUR").unwrap();

        assert_eq!(eur, Money::new("957.86154", "EUR").unwrap());
    }

    #[test]
    fn test_convert_round_trip_within_one_unit() {
        let (_, engine) = setup();
        engine
            .record_rate(ExchangeRate::new(
                code("USD"),
                code("EUR"),
                Decimal::ONE / dec!(1.3),
                day(13),
            ))
            .unwrap();

        for value in ["153123", "12", "0.07", "1245.22"] {
            let usd = Money::new(value, "USD").unwrap();
            let eur = engine.convert(&usd, "EUR").unwrap();
            let back = engine.convert(&eur, "USD").unwrap();
            assert!((back.value() - usd.value()).abs() <= dec!(0.00001));
        }
    }

    #[test]
    fn test_resolve_rate_by_code_and_record() {
        let (_, engine) = setup();
        engine
            .record_rate(ExchangeRate::new(CurrencyCode::usd(), code("EUR"), dec!(1.5), day(10)))
            .unwrap();
        engine
            .record_rate(ExchangeRate::new(CurrencyCode::usd(), code("GBP"), dec!(1.2), day(12)))
            .unwrap();

        let eur = engine.currency(&code("EUR")).unwrap();
        let result = engine.resolve_rate(eur, code("GBP"), false).unwrap();
        assert_eq!(result.rate.rate, dec!(1.25));
        assert_eq!(result.rate.date, day(12));
        assert!(result.rate.is_saved());

        assert_eq!(
            engine.resolve_rate(code("XAU"), code("GBP"), false),
            Err(RateError::UnknownCurrency(code("XAU")))
        );
    }

    #[test]
    fn test_conflict_then_override() {
        let (_, engine) = setup();
        engine
            .record_rate(ExchangeRate::new(code("EUR"), code("GBP"), dec!(0.9), day(1)))
            .unwrap();
        engine
            .record_rate(ExchangeRate::new(CurrencyCode::usd(), code("EUR"), dec!(1.5), day(10)))
            .unwrap();
        engine
            .record_rate(ExchangeRate::new(CurrencyCode::usd(), code("GBP"), dec!(1.2), day(10)))
            .unwrap();

        assert!(matches!(
            engine.resolve_rate(code("EUR"), code("GBP"), false),
            Err(RateError::Conflict { .. })
        ));
        assert!(matches!(
            engine.cached_rate(&code("EUR"), &code("GBP")),
            Err(RateError::Conflict { .. })
        ));

        assert_eq!(
            engine.get_rate(&code("EUR"), &code("GBP"), true).unwrap(),
            dec!(1.25)
        );
        assert_eq!(
            engine.cached_rate(&code("EUR"), &code("GBP")).unwrap(),
            dec!(1.25)
        );
    }

    #[test]
    fn test_recording_invalidates_cached_rate() {
        let (_, engine) = setup();
        engine
            .record_rate(ExchangeRate::new(code("EUR"), code("GBP"), dec!(0.9), day(1)))
            .unwrap();
        assert_eq!(
            engine.cached_rate(&code("GBP"), &code("EUR")).unwrap(),
            dec!(1.11111111111111)
        );

        engine
            .record_rate(ExchangeRate::new(code("EUR"), code("GBP"), dec!(0.8), day(2)))
            .unwrap();
        assert_eq!(
            engine.cached_rate(&code("GBP"), &code("EUR")).unwrap(),
            dec!(1.25)
        );
    }

    #[test]
    fn test_invalid_rates_rejected() {
        let (store, engine) = setup();
        let tomorrow = day(13) + Duration::days(1);

        assert!(matches!(
            engine.record_rate(ExchangeRate::new(code("EUR"), code("GBP"), dec!(0.9), tomorrow)),
            Err(RateError::Validation(_))
        ));

        engine
            .record_rate(ExchangeRate::new(code("EUR"), code("GBP"), dec!(0.9), day(5)))
            .unwrap();
        assert!(matches!(
            engine.record_rate(ExchangeRate::new(code("GBP"), code("EUR"), dec!(1.1), day(5))),
            Err(RateError::Validation(_))
        ));
        assert!(matches!(
            engine.record_rate(ExchangeRate::new(code("EUR"), code("GBP"), dec!(0.95), day(5))),
            Err(RateError::UniqueConstraintViolation { .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_engine_as_rate_source() {
        let (_, engine) = setup();
        engine
            .record_rate(ExchangeRate::new(CurrencyCode::usd(), code("UAH"), dec!(8.1), day(13)))
            .unwrap();

        let money = Money::new(10, "USD").unwrap();
        assert_eq!(
            money.convert_to("UAH", &engine).unwrap(),
            Money::new(81, "UAH").unwrap()
        );
        assert_eq!(
            money.convert_to("USD", &engine).unwrap(),
            money
        );
    }
}
