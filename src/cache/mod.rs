//! Result caching: validators deciding reuse, and the store seam results live in.

pub mod store;
pub mod validators;

pub use store::{CacheStore, CachedResult, InMemoryCacheStore};
pub use validators::{CacheContext, CacheValidator};
