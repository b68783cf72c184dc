//! Expiring cache with cache-aside fetch
//!
//! Provides an `ExpiringCache` that stores JSON values in a [`DurableStore`]
//! together with an expiry timestamp. Reads past the expiry evict the entry,
//! writes are best-effort, and [`ExpiringCache::fetch_with_cache`] layers a
//! read-through over any JSON endpoint.

use std::sync::Arc;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::store::{Clock, DurableStore, MemoryStore, StoreError, SystemClock};

/// Default time-to-live for cache entries in minutes
pub const DEFAULT_TTL_MINUTES: u64 = 15;

/// Key prefixes used for invoice listing, folder and supplier responses
pub const INVOICE_CACHE_PREFIXES: [&str; 3] = ["invoice-", "folder-", "supplier-"];

const MS_PER_MINUTE: i64 = 60_000;

/// Wrapper stored under each cache key
///
/// The expiry is persisted as `expiration` (epoch milliseconds); `expiresAtEpochMs`
/// is accepted when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached data
    pub data: T,
    /// When the entry stops being served, in epoch milliseconds
    #[serde(rename = "expiration", alias = "expiresAtEpochMs")]
    pub expires_at_ms: i64,
}

/// Failure writing a cache entry
#[derive(Debug, Error)]
pub enum CacheError {
    /// The value could not be serialized
    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The durable store refused the write
    #[error("Failed to store cache entry: {0}")]
    Store(#[from] StoreError),
}

/// Failure reading through the cache from the remote source
#[derive(Debug, Error)]
pub enum FetchError {
    /// The endpoint answered with a non-2xx status
    #[error("HTTP error! status: {status} ({url})")]
    Status { status: u16, url: String },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body was not valid JSON
    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FetchError {
    /// Status code for HTTP status failures
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Http(e) => e.status().map(|s| s.as_u16()),
            FetchError::Parse(_) => None,
        }
    }
}

/// Key/value cache with time-based expiration
///
/// Entries are written with an expiry of `now + ttl` and are never returned
/// once `expiry <= now`; an expired entry is removed when it is read (there is
/// no background sweep). Writes never fail the caller: storage or
/// serialization problems are logged and dropped.
///
/// Concurrent `fetch_with_cache` calls for the same key are not coalesced:
/// both miss and both hit the network, and the last write wins.
#[derive(Clone)]
pub struct ExpiringCache {
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    http: Client,
    default_ttl_minutes: u64,
}

impl std::fmt::Debug for ExpiringCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache")
            .field("entries", &self.store.len())
            .field("default_ttl_minutes", &self.default_ttl_minutes)
            .finish()
    }
}

impl ExpiringCache {
    /// Creates a cache over `store` using the wall clock and a default HTTP client
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            http: Client::new(),
            default_ttl_minutes: DEFAULT_TTL_MINUTES,
        }
    }

    /// Creates a cache over an unbounded in-process store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Replaces the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the HTTP client used by [`ExpiringCache::fetch_with_cache`]
    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Sets the TTL used by [`ExpiringCache::fetch`] and [`ExpiringCache::put_default`]
    pub fn with_default_ttl(mut self, ttl_minutes: u64) -> Self {
        self.default_ttl_minutes = ttl_minutes;
        self
    }

    pub fn default_ttl_minutes(&self) -> u64 {
        self.default_ttl_minutes
    }

    /// The underlying durable store
    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    fn expiry_for(&self, ttl_minutes: u64) -> i64 {
        let ttl_ms = i64::try_from(ttl_minutes)
            .unwrap_or(i64::MAX)
            .saturating_mul(MS_PER_MINUTE);
        self.clock.now_ms().saturating_add(ttl_ms)
    }

    /// Writes `data` under `key`, reporting failures
    pub fn try_put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        data: &T,
        ttl_minutes: u64,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            data,
            expires_at_ms: self.expiry_for(ttl_minutes),
        };
        let json = serde_json::to_string(&entry)?;
        self.store.set_item(key, &json)?;
        debug!(key, ttl_minutes, "Cached data");
        Ok(())
    }

    /// Writes `data` under `key`, overwriting any previous entry
    ///
    /// Failures (for example a full store) are logged and swallowed.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl_minutes: u64) {
        if let Err(e) = self.try_put(key, data, ttl_minutes) {
            error!(key, error = %e, "Error saving to cache");
        }
    }

    /// [`ExpiringCache::put`] with the default TTL
    pub fn put_default<T: Serialize + ?Sized>(&self, key: &str, data: &T) {
        self.put(key, data, self.default_ttl_minutes);
    }

    /// Reads the entry for `key`
    ///
    /// Returns `None` when the entry is missing, malformed or expired. Expired
    /// entries are removed from the store.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_as(key)
    }

    /// Reads the entry for `key` and deserializes its data as `T`
    ///
    /// Data that does not fit `T` is treated like a malformed entry.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.store.get_item(key)?;

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Malformed cache entry, treating as miss");
                return None;
            }
        };

        if entry.expires_at_ms <= self.clock.now_ms() {
            self.store.remove_item(key);
            debug!(key, "Cache expired");
            return None;
        }

        debug!(key, "Retrieved data from cache");
        Some(entry.data)
    }

    /// Removes the entry for `key`
    pub fn clear(&self, key: &str) {
        self.store.remove_item(key);
        debug!(key, "Cleared cache");
    }

    /// Removes every key starting with one of `prefixes`, returning how many were removed
    pub fn clear_by_prefixes<S: AsRef<str>>(&self, prefixes: &[S]) -> usize {
        let keys_to_remove: Vec<String> = (0..self.store.len())
            .filter_map(|index| self.store.key(index))
            .filter(|key| prefixes.iter().any(|p| key.starts_with(p.as_ref())))
            .collect();

        for key in &keys_to_remove {
            self.store.remove_item(key);
        }

        info!(count = keys_to_remove.len(), "Cleared cache items by prefix");
        keys_to_remove.len()
    }

    /// Removes cached invoice, folder and supplier responses
    pub fn clear_invoice_cache(&self) -> usize {
        self.clear_by_prefixes(&INVOICE_CACHE_PREFIXES)
    }

    /// Returns the cached value for `key`, or GETs `url` and caches the JSON body
    ///
    /// With `force_refresh` the cache is bypassed for the read but still
    /// refreshed on success. Non-2xx responses, transport errors and invalid
    /// JSON are returned to the caller; the cache write itself never fails the call.
    pub async fn fetch_with_cache(
        &self,
        url: &str,
        key: &str,
        ttl_minutes: u64,
        force_refresh: bool,
    ) -> Result<Value, FetchError> {
        if !force_refresh {
            if let Some(cached) = self.get(key) {
                return Ok(cached);
            }
        }

        let data = self.fetch_json(url).await.inspect_err(|e| {
            error!(url, key, error = %e, "Error fetching data");
        })?;

        self.put(key, &data, ttl_minutes);
        Ok(data)
    }

    /// [`ExpiringCache::fetch_with_cache`] with the default TTL and no forced refresh
    pub async fn fetch(&self, url: &str, key: &str) -> Result<Value, FetchError> {
        self.fetch_with_cache(url, key, self.default_ttl_minutes, false)
            .await
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        get_json(&self.http, url).await
    }
}

/// GETs `url` and parses the body as JSON, failing on non-2xx statuses
pub async fn get_json(http: &Client, url: &str) -> Result<Value, FetchError> {
    debug!(url, "Fetching from server");
    let response = http.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}
