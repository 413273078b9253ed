//! Shared TTL cache of resolved rates and its invalidation on rate writes.

use chrono::NaiveDate;
use ratebook_common::{CurrencyCode, ExchangeRate, RateSource, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::cache_store::SharedCacheStore;
use crate::cached::{CallArgs, SimpleCache};
use crate::resolver::RateResolver;
use crate::store::RateStore;

/// Key template for cached rates, `{0}` is the base and `{1}` the foreign code.
pub const RATES_CACHE_KEY: &str = "{0}_{1}_rate";

/// Key template for cached rates requested by name.
pub const RATES_CACHE_KEY_NAMED: &str = "{base}_{foreign}_rate";

/// Cache key of the rate from `base` to `foreign`. Keys are directional.
pub fn rate_cache_key(base: &CurrencyCode, foreign: &CurrencyCode) -> String {
    format!("{}_{}_rate", base, foreign)
}

/// Delete the cached rates for both directions of a pair.
pub fn invalidate_pair(
    cache: &SharedCacheStore,
    base: &CurrencyCode,
    foreign: &CurrencyCode,
) -> Result<()> {
    cache.delete(&rate_cache_key(base, foreign))?;
    cache.delete(&rate_cache_key(foreign, base))?;
    debug!(base = %base, foreign = %foreign, "Invalidated cached rates");
    Ok(())
}

/// Read-through cache in front of a `RateResolver`.
pub struct RateCache {
    resolver: Arc<RateResolver>,
    cache: SimpleCache,
}

impl RateCache {
    /// Create a rate cache storing results in `store` for `ttl`.
    pub fn new(resolver: Arc<RateResolver>, store: SharedCacheStore, ttl: Duration) -> Self {
        Self {
            resolver,
            cache: SimpleCache::new(store, RATES_CACHE_KEY, ttl)
                .with_kwargs_key_format(RATES_CACHE_KEY_NAMED),
        }
    }

    /// Rate from `base` to `foreign`, served from cache when present.
    /// Identical currencies convert at one without touching any store.
    pub fn cached_rate(&self, base: &CurrencyCode, foreign: &CurrencyCode) -> Result<Decimal> {
        if base == foreign {
            return Ok(Decimal::ONE);
        }
        self.cache
            .get_or_compute(&CallArgs::positional([base, foreign]), || {
                self.resolver.get_rate(base, foreign, false)
            })
    }

    /// Drop the cached rates for both directions of a pair.
    pub fn invalidate(&self, base: &CurrencyCode, foreign: &CurrencyCode) -> Result<()> {
        self.cache
            .invalidate(&CallArgs::positional([base, foreign]))?;
        self.cache
            .invalidate(&CallArgs::positional([foreign, base]))
    }

    pub fn resolver(&self) -> &RateResolver {
        &self.resolver
    }
}

impl RateSource for RateCache {
    fn rate(&self, base: &CurrencyCode, foreign: &CurrencyCode) -> Result<Decimal> {
        self.cached_rate(base, foreign)
    }
}

/// Rate store decorator that invalidates both cache directions of every rate
/// it creates or updates.
pub struct CacheInvalidatingStore {
    inner: Arc<dyn RateStore>,
    cache: SharedCacheStore,
}

impl CacheInvalidatingStore {
    pub fn new(inner: Arc<dyn RateStore>, cache: SharedCacheStore) -> Self {
        Self { inner, cache }
    }
}

impl RateStore for CacheInvalidatingStore {
    fn latest_rate(
        &self,
        base: &CurrencyCode,
        foreign: &CurrencyCode,
    ) -> Result<Option<ExchangeRate>> {
        self.inner.latest_rate(base, foreign)
    }

    fn rate_on(
        &self,
        base: &CurrencyCode,
        foreign: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Option<ExchangeRate>> {
        self.inner.rate_on(base, foreign, date)
    }

    fn insert_rate(&self, rate: ExchangeRate) -> Result<ExchangeRate> {
        let saved = self.inner.insert_rate(rate)?;
        invalidate_pair(&self.cache, &saved.base, &saved.foreign)?;
        Ok(saved)
    }

    fn update_rate(&self, rate: ExchangeRate) -> Result<ExchangeRate> {
        let saved = self.inner.update_rate(rate)?;
        invalidate_pair(&self.cache, &saved.base, &saved.foreign)?;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_store::{CacheStore, MemoryCacheStore};
    use crate::config::FxConfig;
    use crate::store::MemoryRateStore;
    use ratebook_common::{FixedClock, RateError};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn code(c: &str) -> CurrencyCode {
        CurrencyCode::new(c).unwrap()
    }

    /// Cache store that counts reads.
    struct CountingCacheStore {
        inner: MemoryCacheStore,
        gets: AtomicUsize,
    }

    impl CacheStore for CountingCacheStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
            self.inner.set(key, value, ttl)
        }

        fn delete(&self, key: &str) -> Result<()> {
            self.inner.delete(key)
        }
    }

    struct Fixture {
        rates: Arc<MemoryRateStore>,
        cache_store: Arc<CountingCacheStore>,
        store: CacheInvalidatingStore,
        cache: RateCache,
    }

    fn setup() -> Fixture {
        let rates = Arc::new(MemoryRateStore::with_clock(Arc::new(FixedClock(day(20)))));
        let cache_store = Arc::new(CountingCacheStore {
            inner: MemoryCacheStore::new(),
            gets: AtomicUsize::new(0),
        });
        let store = CacheInvalidatingStore::new(rates.clone(), cache_store.clone());
        let resolver = Arc::new(RateResolver::new(
            Arc::new(CacheInvalidatingStore::new(rates.clone(), cache_store.clone())),
            &FxConfig::default(),
        ));
        let cache = RateCache::new(resolver, cache_store.clone(), Duration::from_secs(60));
        Fixture {
            rates,
            cache_store,
            store,
            cache,
        }
    }

    #[test]
    fn test_rate_cache_key_is_directional() {
        assert_eq!(rate_cache_key(&code("USD"), &code("EUR")), "USD_EUR_rate");
        assert_eq!(rate_cache_key(&code("EUR"), &code("USD")), "EUR_USD_rate");
    }

    #[test]
    fn test_cached_rate_reads_through() {
        let f = setup();
        f.store
            .insert_rate(ExchangeRate::new(code("EUR"), code("USD"), dec!(1.3), day(1)))
            .unwrap();

        let rate = f.cache.cached_rate(&code("USD"), &code("EUR")).unwrap();
        assert_eq!(rate, dec!(0.769230769230769));
        assert!(f.cache_store.inner.contains_key("USD_EUR_rate"));

        // A rate changed behind the cache's back is not seen until invalidation.
        f.rates
            .insert_rate(ExchangeRate::new(code("EUR"), code("USD"), dec!(1.25), day(2)))
            .unwrap();
        assert_eq!(f.cache.cached_rate(&code("USD"), &code("EUR")).unwrap(), rate);

        f.cache.invalidate(&code("EUR"), &code("USD")).unwrap();
        assert_eq!(
            f.cache.cached_rate(&code("USD"), &code("EUR")).unwrap(),
            dec!(0.8)
        );
    }

    #[test]
    fn test_writes_invalidate_both_directions() {
        let f = setup();
        f.store
            .insert_rate(ExchangeRate::new(code("EUR"), code("GBP"), dec!(0.85), day(1)))
            .unwrap();

        f.cache.cached_rate(&code("EUR"), &code("GBP")).unwrap();
        f.cache.cached_rate(&code("GBP"), &code("EUR")).unwrap();
        assert!(f.cache_store.inner.contains_key("EUR_GBP_rate"));
        assert!(f.cache_store.inner.contains_key("GBP_EUR_rate"));

        let mut saved = f
            .store
            .insert_rate(ExchangeRate::new(code("GBP"), code("EUR"), dec!(1.2), day(2)))
            .unwrap();
        assert!(!f.cache_store.inner.contains_key("EUR_GBP_rate"));
        assert!(!f.cache_store.inner.contains_key("GBP_EUR_rate"));

        f.cache.cached_rate(&code("EUR"), &code("GBP")).unwrap();
        saved.rate = dec!(1.25);
        f.store.update_rate(saved).unwrap();
        assert!(!f.cache_store.inner.contains_key("EUR_GBP_rate"));
        assert_eq!(
            f.cache.cached_rate(&code("EUR"), &code("GBP")).unwrap(),
            dec!(0.85)
        );
    }

    #[test]
    fn test_persisted_indirect_rate_invalidates() {
        let f = setup();
        f.store
            .insert_rate(ExchangeRate::new(code("USD"), code("EUR"), dec!(1.5), day(1)))
            .unwrap();
        f.store
            .insert_rate(ExchangeRate::new(code("USD"), code("GBP"), dec!(1.2), day(1)))
            .unwrap();
        f.cache_store
            .set("GBP_EUR_rate", b"\"9\"".to_vec(), Duration::from_secs(60))
            .unwrap();

        assert_eq!(
            f.cache.cached_rate(&code("EUR"), &code("GBP")).unwrap(),
            dec!(1.25)
        );
        // Persisting EUR to GBP removed the opposite direction's entry.
        assert!(!f.cache_store.inner.contains_key("GBP_EUR_rate"));
    }

    #[test]
    fn test_identical_currencies_skip_cache() {
        let f = setup();
        assert_eq!(
            f.cache.cached_rate(&code("EUR"), &code("EUR")).unwrap(),
            Decimal::ONE
        );
        assert_eq!(f.cache_store.gets.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let f = setup();
        assert!(matches!(
            f.cache.cached_rate(&code("EUR"), &code("GBP")),
            Err(RateError::NotFound { .. })
        ));
        assert!(f.cache_store.inner.is_empty());
    }

    #[test]
    fn test_money_memo_hits_cache_store_once() {
        let f = setup();
        f.store
            .insert_rate(ExchangeRate::new(code("EUR"), code("USD"), dec!(1.3), day(1)))
            .unwrap();

        let money = ratebook_common::Money::new(1245.22, "USD").unwrap();
        let first = money.convert_to("EUR", &f.cache).unwrap();
        let second = money.convert_to("EUR", &f.cache).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.value(), dec!(957.86154));
        assert_eq!(f.cache_store.gets.load(Ordering::SeqCst), 1);
    }
}
