//! Integration tests for cache-aside reads against a live HTTP endpoint

mod common;

use std::sync::Arc;

use common::MockServer;
use invoicedesk::cache::{DurableStore, ExpiringCache, FetchError, MemoryStore};
use serde_json::json;

const INVOICES: &str = r#"{"success": true, "invoices": [{"id": 1, "invoice_number": "R100"}]}"#;

#[tokio::test]
async fn test_miss_fetches_and_caches_body() {
    let server = MockServer::fixed(200, INVOICES).await;
    let store = Arc::new(MemoryStore::new());
    let cache = ExpiringCache::new(store.clone());

    let value = cache
        .fetch_with_cache(&server.url("/api/invoices"), "invoice-list", 15, false)
        .await
        .expect("Fetch should succeed");

    assert_eq!(value["invoices"][0]["invoice_number"], json!("R100"));
    assert_eq!(server.hits(), 1);
    assert!(store.get_item("invoice-list").is_some());
    assert_eq!(server.requests()[0].method, "GET");
    assert_eq!(server.requests()[0].path, "/api/invoices");
}

#[tokio::test]
async fn test_second_read_is_served_from_cache() {
    let server = MockServer::fixed(200, INVOICES).await;
    let cache = ExpiringCache::in_memory();
    let url = server.url("/api/invoices");

    let first = cache.fetch_with_cache(&url, "invoice-list", 15, false).await.unwrap();
    let second = cache.fetch_with_cache(&url, "invoice-list", 15, false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(server.hits(), 1, "Fresh entry must not trigger a request");
}

#[tokio::test]
async fn test_force_refresh_always_hits_network_and_updates_cache() {
    let server = MockServer::fixed(200, r#"{"version": 2}"#).await;
    let cache = ExpiringCache::in_memory();
    cache.put("supplier-list", &json!({"version": 1}), 15);

    let value = cache
        .fetch_with_cache(&server.url("/api/suppliers"), "supplier-list", 15, true)
        .await
        .unwrap();

    assert_eq!(value, json!({"version": 2}));
    assert_eq!(server.hits(), 1);
    assert_eq!(cache.get("supplier-list"), Some(json!({"version": 2})));
}

#[tokio::test]
async fn test_non_success_status_is_reported_and_not_cached() {
    let server = MockServer::fixed(404, r#"{"error": "not found"}"#).await;
    let cache = ExpiringCache::in_memory();

    let err = cache
        .fetch_with_cache(&server.url("/api/invoices/999"), "invoice-999", 15, false)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
    assert_eq!(err.status(), Some(404));
    assert!(cache.get("invoice-999").is_none());
}

#[tokio::test]
async fn test_invalid_json_body_is_a_parse_error() {
    let server = MockServer::fixed(200, "<html>maintenance</html>").await;
    let cache = ExpiringCache::in_memory();

    let err = cache
        .fetch_with_cache(&server.url("/api/invoices"), "invoice-list", 15, false)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Parse(_)));
    assert!(cache.get("invoice-list").is_none());
}

#[tokio::test]
async fn test_full_store_does_not_break_reads() {
    let server = MockServer::fixed(200, INVOICES).await;
    let store = Arc::new(MemoryStore::with_capacity(8));
    let cache = ExpiringCache::new(store.clone());
    let url = server.url("/api/invoices");

    let value = cache.fetch_with_cache(&url, "invoice-list", 15, false).await;
    assert!(value.is_ok(), "Cache write failure must not fail the read");
    assert!(store.is_empty());

    // Nothing was cached, so the next read goes to the server again
    cache.fetch_with_cache(&url, "invoice-list", 15, false).await.unwrap();
    assert_eq!(server.hits(), 2);
}

#[tokio::test]
async fn test_concurrent_misses_are_not_coalesced() {
    let server = MockServer::fixed(200, INVOICES).await;
    let cache = ExpiringCache::in_memory();
    let url = server.url("/api/invoices");

    let (a, b) = futures::future::join(
        cache.fetch_with_cache(&url, "invoice-list", 15, false),
        cache.fetch_with_cache(&url, "invoice-list", 15, false),
    )
    .await;

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(server.hits(), 2);
    assert!(cache.get("invoice-list").is_some());
}
