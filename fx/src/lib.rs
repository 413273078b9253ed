//! Ratebook FX
//!
//! Exchange rate resolution over a sparse history of recorded rates.
//!
//! # Features
//!
//! - Direct, reverse and indirect (through a default currency) rate resolution
//! - Staleness conflict detection between recorded and derived rates
//! - Shared TTL cache of resolved rates, invalidated on every rate write
//! - Generic read-through caching keyed by call arguments
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ratebook_common::{CurrencyCode, ExchangeRate, Money};
//! use ratebook_fx::{FxConfig, FxEngine, MemoryCacheStore, MemoryRateStore};
//!
//! let store = Arc::new(MemoryRateStore::new());
//! let engine = FxEngine::new(
//!     store.clone(),
//!     store,
//!     Arc::new(MemoryCacheStore::new()),
//!     FxConfig::default(),
//! )?;
//!
//! engine.record_rate(ExchangeRate::new(eur, CurrencyCode::usd(), dec!(1.3), today))?;
//!
//! let usd = Money::new("1245.22", "USD")?;
//! let eur = engine.convert(&usd, "EUR")?;
//! ```

pub mod engine;
pub mod store;
pub mod resolver;
pub mod cache;
pub mod cache_store;
pub mod cached;
pub mod config;

pub use engine::FxEngine;
pub use store::{MemoryRateStore, RateStore};
pub use resolver::RateResolver;
pub use cache::{rate_cache_key, CacheInvalidatingStore, RateCache};
pub use cache_store::{CacheStore, CacheStoreConfig, MemoryCacheStore};
pub use cached::{CallArgs, SimpleCache};
pub use config::FxConfig;
