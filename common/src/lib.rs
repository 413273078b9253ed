//! Ratebook Common Types
//!
//! Shared types for exchange rate resolution: currency codes and records,
//! exchange rate records, the `Money` value type and the error enum.

pub mod currency;
pub mod rate;
pub mod money;
pub mod error;
pub mod template;
pub mod time;

pub use currency::*;
pub use rate::*;
pub use money::*;
pub use error::*;
pub use template::*;
pub use time::*;
