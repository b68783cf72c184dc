//! Cache module for API responses
//!
//! This module provides an expiring key/value cache over a durable store and a
//! cache-aside fetch helper. Entries carry an absolute expiry and are evicted
//! lazily when read after it; write failures never reach the caller.

mod manager;
mod store;

pub use manager::{
    get_json, CacheEntry, CacheError, ExpiringCache, FetchError, DEFAULT_TTL_MINUTES,
    INVOICE_CACHE_PREFIXES,
};
pub use store::{Clock, DurableStore, FileStore, MemoryStore, StoreError, SystemClock};
