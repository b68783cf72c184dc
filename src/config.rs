//! Runtime configuration from environment variables

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::cache::{DurableStore, ExpiringCache, FileStore, MemoryStore, DEFAULT_TTL_MINUTES};

/// Typical per-origin local storage quota
pub const DEFAULT_CACHE_CAPACITY_BYTES: usize = 5 * 1024 * 1024;

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .unwrap_or(default)
}

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    Duration::from_millis(env_u64(key, default_millis))
}

/// Settings shared by the cache, the email client and the CLI
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the invoice server
    pub api_url: String,
    /// Directory for the on-disk cache; `None` uses the XDG cache directory
    pub cache_dir: Option<PathBuf>,
    /// Default cache TTL in minutes
    pub cache_ttl_minutes: u64,
    /// Maximum bytes the cache may occupy
    pub cache_capacity_bytes: usize,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// Delay the server waits between mailbox searches, in seconds
    pub search_delay_secs: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5000".to_string(),
            cache_dir: None,
            cache_ttl_minutes: DEFAULT_TTL_MINUTES,
            cache_capacity_bytes: DEFAULT_CACHE_CAPACITY_BYTES,
            request_timeout: Duration::from_secs(30),
            search_delay_secs: 0.5,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: env_string("INVOICEDESK_API_URL", &defaults.api_url),
            cache_dir: env::var("INVOICEDESK_CACHE_DIR").ok().map(PathBuf::from),
            cache_ttl_minutes: env_u64("INVOICEDESK_CACHE_TTL_MINUTES", defaults.cache_ttl_minutes),
            cache_capacity_bytes: env_usize(
                "INVOICEDESK_CACHE_CAPACITY_BYTES",
                defaults.cache_capacity_bytes,
            ),
            request_timeout: env_duration_millis("INVOICEDESK_REQUEST_TIMEOUT_MS", 30_000),
            search_delay_secs: env_f64("INVOICEDESK_SEARCH_DELAY_SECS", defaults.search_delay_secs),
        }
    }

    /// Fetch delay is double the search delay
    pub fn fetch_delay_secs(&self) -> f64 {
        self.search_delay_secs * 2.0
    }

    /// Absolute URL for an API path such as `/api/invoices`
    ///
    /// Values that already carry a scheme are returned unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// HTTP client with the configured timeout
    pub fn http_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("invoicedesk/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    /// Durable store for the cache: the configured or XDG directory, else in-memory
    pub fn store(&self) -> Arc<dyn DurableStore> {
        let file_store = match &self.cache_dir {
            Some(dir) => Some(FileStore::with_dir(dir.clone())),
            None => FileStore::new(),
        };

        match file_store {
            Some(store) => Arc::new(store.with_capacity(self.cache_capacity_bytes)),
            None => Arc::new(MemoryStore::with_capacity(self.cache_capacity_bytes)),
        }
    }

    /// Cache wired to the configured store, TTL and HTTP client
    pub fn cache(&self) -> Result<ExpiringCache, reqwest::Error> {
        Ok(ExpiringCache::new(self.store())
            .with_client(self.http_client()?)
            .with_default_ttl(self.cache_ttl_minutes))
    }
}
