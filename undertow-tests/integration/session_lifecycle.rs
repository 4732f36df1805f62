//! Session resolution across the hot, warm and cold tiers

use std::sync::Arc;
use std::time::Duration;

use undertow_core::{ErrorCategory, MetadataStore};
use undertow_sim::InMemoryContentEngine;

use crate::common::{Harness, key_of};

const UNKNOWN_MAGNET: &str = "magnet:?xt=urn:btih:fedcba9876543210fedcba9876543210fedcba98";

#[tokio::test]
async fn test_repeated_resolves_share_one_session() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");
    let key = key_of(&magnet);

    harness.service.list_files(&magnet).await.unwrap();
    let first = Arc::clone(harness.service.cache().peek(&key).unwrap().session());

    harness.service.summary(&magnet).await.unwrap();
    harness.service.list_files(&magnet).await.unwrap();
    let second = Arc::clone(harness.service.cache().peek(&key).unwrap().session());

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.engine.counters().resolves(), 1);
    assert_eq!(harness.engine.counters().rehydrates(), 0);
}

#[tokio::test]
async fn test_concurrent_resolves_start_one_fetch() {
    let harness = Harness::with(
        InMemoryContentEngine::new().with_info_delay(Duration::from_millis(50)),
        |_| {},
    );
    let magnet = harness.register_movie("Sintel");

    let requests = (0..8).map(|_| harness.service.list_files(&magnet));
    let results = futures::future::join_all(requests).await;

    assert!(results.iter().all(|result| result.is_ok()));
    assert_eq!(harness.engine.counters().resolves(), 1);
    assert_eq!(harness.service.cache().len(), 1);
}

#[tokio::test]
async fn test_capacity_evicts_least_recently_used() {
    let harness = Harness::with(InMemoryContentEngine::new(), |config| {
        config.cache.capacity = 2;
    });
    let first = harness.register_movie("First");
    let second = harness.register_movie("Second");
    let third = harness.register_movie("Third");

    harness.service.list_files(&first).await.unwrap();
    harness.service.list_files(&second).await.unwrap();
    // Touch the first session so the second becomes least recent
    harness.service.status(&first, None).unwrap();
    harness.service.list_files(&third).await.unwrap();

    let cache = harness.service.cache();
    assert_eq!(cache.len(), 2);
    assert!(cache.contains(&key_of(&first)));
    assert!(!cache.contains(&key_of(&second)));
    assert!(cache.contains(&key_of(&third)));

    assert!(!harness.engine.is_active(&key_of(&second)));
    assert_eq!(harness.engine.counters().releases(), 1);
}

#[tokio::test]
async fn test_evicted_session_comes_back_warm() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");
    let key = key_of(&magnet);

    harness.service.list_files(&magnet).await.unwrap();
    assert!(harness.metadata.contains(&key));

    assert!(harness.service.cache().remove(&key));
    let listing = harness.service.list_files(&magnet).await.unwrap();

    assert_eq!(listing.files.len(), 2);
    assert_eq!(harness.engine.counters().resolves(), 1);
    assert_eq!(harness.engine.counters().rehydrates(), 1);
    assert!(harness.engine.is_active(&key));
}

#[tokio::test]
async fn test_corrupt_metadata_falls_back_to_fetch() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");
    let key = key_of(&magnet);

    harness.metadata.put(&key, b"not metadata").await.unwrap();
    harness.service.list_files(&magnet).await.unwrap();

    assert_eq!(harness.engine.counters().rehydrates(), 1);
    assert_eq!(harness.engine.counters().resolves(), 1);
    assert_ne!(
        harness.metadata.get(&key).await.unwrap().as_deref(),
        Some(&b"not metadata"[..])
    );
}

#[tokio::test]
async fn test_metadata_read_failure_falls_back_to_fetch() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");
    harness.metadata.set_fail_gets(true);

    harness.service.list_files(&magnet).await.unwrap();

    assert_eq!(harness.engine.counters().resolves(), 1);
    assert_eq!(harness.engine.counters().rehydrates(), 0);
}

#[tokio::test]
async fn test_unreachable_content_times_out_and_releases() {
    let harness = Harness::new();

    let error = harness.service.list_files(UNKNOWN_MAGNET).await.unwrap_err();

    assert_eq!(error.category(), ErrorCategory::Timeout);
    assert_eq!(harness.engine.counters().releases(), 1);
    assert!(!harness.engine.is_active(&key_of(UNKNOWN_MAGNET)));
    assert!(harness.service.cache().is_empty());
}

#[tokio::test]
async fn test_metadata_write_failure_does_not_fail_resolution() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");
    harness.metadata.set_fail_puts(true);

    let listing = harness.service.list_files(&magnet).await.unwrap();

    assert_eq!(listing.files.len(), 2);
    assert_eq!(harness.metadata.put_calls(), 1);
    assert!(harness.metadata.is_empty());
    assert!(harness.service.cache().contains(&key_of(&magnet)));
}

#[tokio::test]
async fn test_shutdown_cancels_pending_fetch() {
    let harness = Harness::with(InMemoryContentEngine::new(), |config| {
        config.cache.info_timeout = Duration::from_secs(30);
    });

    let service = Arc::clone(&harness.service);
    let pending = tokio::spawn(async move { service.list_files(UNKNOWN_MAGNET).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.service.shutdown();

    let error = pending.await.unwrap().unwrap_err();
    assert_eq!(error.category(), ErrorCategory::ShuttingDown);
    assert_eq!(harness.engine.counters().releases(), 1);
}

#[tokio::test]
async fn test_invalid_descriptor_is_rejected() {
    let harness = Harness::new();

    let error = harness.service.list_files("https://example.com").await.unwrap_err();

    assert_eq!(error.category(), ErrorCategory::InvalidInput);
    assert_eq!(harness.engine.counters().resolves(), 0);
}

#[tokio::test]
async fn test_status_never_resolves() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");

    let error = harness.service.status(&magnet, None).unwrap_err();
    assert_eq!(error.category(), ErrorCategory::NotFound);
    assert_eq!(harness.engine.counters().resolves(), 0);

    harness.service.list_files(&magnet).await.unwrap();
    let report = harness.service.status(&magnet, Some(0)).unwrap();

    assert_eq!(report.name, "Sintel");
    assert_eq!(report.total_bytes, report.bytes_completed);
    assert_eq!(report.streaming_file_size, Some(1000));
    assert_eq!(report.files.len(), 2);
}
