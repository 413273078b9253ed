//! Generic read-through caching of function results.

use ratebook_common::{render_template, RateError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache_store::SharedCacheStore;

/// Arguments of a cached call, either all positional or all keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    positional: Vec<String>,
    keyword: Vec<(String, String)>,
}

impl CallArgs {
    /// Positional arguments, referenced as `{0}`, `{1}`... in key templates.
    pub fn positional<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            positional: args.into_iter().map(|a| a.to_string()).collect(),
            keyword: Vec::new(),
        }
    }

    /// Keyword arguments, referenced as `{name}` in key templates.
    pub fn keyword<I, K, V>(args: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        Self {
            positional: Vec::new(),
            keyword: args
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Add one more positional argument.
    pub fn arg(mut self, value: impl ToString) -> Self {
        self.positional.push(value.to_string());
        self
    }

    /// Add one more keyword argument.
    pub fn kwarg(mut self, name: impl ToString, value: impl ToString) -> Self {
        self.keyword.push((name.to_string(), value.to_string()));
        self
    }

    fn positional_value(&self, name: &str) -> Option<&str> {
        let index: usize = name.parse().ok()?;
        self.positional.get(index).map(String::as_str)
    }

    fn keyword_value(&self, name: &str) -> Option<&str> {
        self.keyword
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Read-through cache keyed by a template rendered from the call arguments.
pub struct SimpleCache {
    store: SharedCacheStore,
    key_format: String,
    kwargs_key_format: Option<String>,
    ttl: Duration,
}

impl SimpleCache {
    /// Cache whose keys are rendered from positional arguments with `key_format`.
    pub fn new(store: SharedCacheStore, key_format: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key_format: key_format.into(),
            kwargs_key_format: None,
            ttl,
        }
    }

    /// Also accept keyword calls, rendered with `kwargs_key_format`.
    pub fn with_kwargs_key_format(mut self, kwargs_key_format: impl Into<String>) -> Self {
        self.kwargs_key_format = Some(kwargs_key_format.into());
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Build the cache key for a call.
    pub fn key(&self, args: &CallArgs) -> Result<String> {
        let has_positional = !args.positional.is_empty();
        let has_keyword = !args.keyword.is_empty();

        if has_positional && has_keyword {
            return Err(RateError::InvalidUsage(
                "cached call accepts positional or keyword arguments, not both".to_string(),
            ));
        }

        if has_keyword {
            let template = self.kwargs_key_format.as_deref().ok_or_else(|| {
                RateError::InvalidUsage(
                    "cached call without a keyword key format does not accept keyword arguments"
                        .to_string(),
                )
            })?;
            return render_key(template, |name| args.keyword_value(name));
        }

        render_key(&self.key_format, |name| args.positional_value(name))
    }

    /// Return the cached value for `args`, computing and storing it on a miss.
    ///
    /// Presence is decided by the store returning an entry, never by the
    /// cached value itself, so zero-like results are served from cache too.
    /// An entry that no longer decodes is recomputed and overwritten.
    pub fn get_or_compute<T, F>(&self, args: &CallArgs, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        let key = self.key(args)?;

        if let Some(bytes) = self.store.get(&key)? {
            match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
            }
        } else {
            debug!(key = %key, "Cache miss");
        }

        let value = compute()?;
        let bytes = serde_json::to_vec(&value)
            .map_err(|e| RateError::Cache(format!("failed to encode {}: {}", key, e)))?;
        self.store.set(&key, bytes, self.ttl)?;
        Ok(value)
    }

    /// Remove the entry for `args`.
    pub fn invalidate(&self, args: &CallArgs) -> Result<()> {
        let key = self.key(args)?;
        self.store.delete(&key)
    }
}

fn render_key<'a, F>(template: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<&'a str>,
{
    render_template(template, lookup)
        .map_err(|e| RateError::InvalidUsage(format!("{} in key format {:?}", e, template)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_store::{CacheStore, MemoryCacheStore};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::cell::Cell;
    use std::sync::Arc;

    fn cache(store: Arc<MemoryCacheStore>) -> SimpleCache {
        SimpleCache::new(store, "{0}_{1}_rate", Duration::from_secs(60))
    }

    #[test]
    fn test_positional_key() {
        let cache = cache(Arc::new(MemoryCacheStore::new()));
        let key = cache.key(&CallArgs::positional(["USD", "EUR"])).unwrap();
        assert_eq!(key, "USD_EUR_rate");
    }

    #[test]
    fn test_keyword_key() {
        let cache = cache(Arc::new(MemoryCacheStore::new()))
            .with_kwargs_key_format("{base}_{foreign}_rate");
        let args = CallArgs::keyword([("foreign", "EUR"), ("base", "USD")]);
        assert_eq!(cache.key(&args).unwrap(), "USD_EUR_rate");
    }

    #[test]
    fn test_mixed_arguments_rejected() {
        let cache = cache(Arc::new(MemoryCacheStore::new()))
            .with_kwargs_key_format("{base}_{foreign}_rate");
        let args = CallArgs::positional(["USD"]).kwarg("foreign", "EUR");
        assert!(matches!(cache.key(&args), Err(RateError::InvalidUsage(_))));
    }

    #[test]
    fn test_keyword_without_format_rejected() {
        let cache = cache(Arc::new(MemoryCacheStore::new()));
        let args = CallArgs::keyword([("base", "USD"), ("foreign", "EUR")]);
        let result: Result<Decimal> = cache.get_or_compute(&args, || Ok(Decimal::ONE));
        assert!(matches!(result, Err(RateError::InvalidUsage(_))));
    }

    #[test]
    fn test_missing_argument_rejected() {
        let cache = cache(Arc::new(MemoryCacheStore::new()));
        assert!(matches!(
            cache.key(&CallArgs::positional(["USD"])),
            Err(RateError::InvalidUsage(_))
        ));
    }

    #[test]
    fn test_read_through() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = cache(store.clone());
        let args = CallArgs::positional(["USD", "EUR"]);
        let calls = Cell::new(0);

        for _ in 0..3 {
            let value: Decimal = cache
                .get_or_compute(&args, || {
                    calls.set(calls.get() + 1);
                    Ok(dec!(0.76923))
                })
                .unwrap();
            assert_eq!(value, dec!(0.76923));
        }

        assert_eq!(calls.get(), 1);
        assert!(store.contains_key("USD_EUR_rate"));
    }

    #[test]
    fn test_zero_value_is_served_from_cache() {
        let cache = cache(Arc::new(MemoryCacheStore::new()));
        let args = CallArgs::positional(["USD", "EUR"]);
        let calls = Cell::new(0);

        for _ in 0..2 {
            let value: Decimal = cache
                .get_or_compute(&args, || {
                    calls.set(calls.get() + 1);
                    Ok(Decimal::ZERO)
                })
                .unwrap();
            assert!(value.is_zero());
        }

        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = cache(store.clone());
        let args = CallArgs::positional(["USD", "EUR"]);

        let result: Result<Decimal> = cache.get_or_compute(&args, || {
            Err(RateError::Store("timeout".to_string()))
        });
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_undecodable_entry_is_recomputed() {
        let store = Arc::new(MemoryCacheStore::new());
        store
            .set("USD_EUR_rate", b"not json".to_vec(), Duration::from_secs(60))
            .unwrap();
        let cache = cache(store.clone());

        let value: Decimal = cache
            .get_or_compute(&CallArgs::positional(["USD", "EUR"]), || Ok(dec!(1.5)))
            .unwrap();
        assert_eq!(value, dec!(1.5));
        assert_eq!(
            store.get("USD_EUR_rate").unwrap(),
            Some(serde_json::to_vec(&dec!(1.5)).unwrap())
        );
    }

    #[test]
    fn test_invalidate() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = cache(store.clone());
        let args = CallArgs::positional(["USD", "EUR"]);
        let _: Decimal = cache.get_or_compute(&args, || Ok(dec!(1.5))).unwrap();

        cache.invalidate(&args).unwrap();
        assert!(!store.contains_key("USD_EUR_rate"));
    }
}
