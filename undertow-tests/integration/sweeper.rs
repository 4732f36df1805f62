//! Inactivity sweeping of cached sessions

use std::sync::Arc;
use std::time::Duration;

use undertow_core::InactivitySweeper;
use undertow_sim::InMemoryContentEngine;

use crate::common::{Harness, key_of};

#[tokio::test]
async fn test_only_strictly_idle_sessions_are_swept() {
    let harness = Harness::new();
    let magnet = harness.register_movie("Sintel");
    let key = key_of(&magnet);
    harness.service.list_files(&magnet).await.unwrap();

    let threshold = Duration::from_secs(60);
    let sweeper = InactivitySweeper::new(
        Arc::clone(harness.service.cache()),
        harness.metadata.clone(),
        threshold,
        Duration::from_secs(1),
    );
    let last_access = harness
        .service
        .cache()
        .peek(&key)
        .unwrap()
        .last_accessed_at();

    assert!(sweeper.sweep_at(last_access + threshold).await.is_empty());
    assert!(harness.service.cache().contains(&key));

    let swept = sweeper
        .sweep_at(last_access + threshold + Duration::from_millis(1))
        .await;
    assert_eq!(swept, vec![key.clone()]);
    assert!(!harness.service.cache().contains(&key));
    assert!(!harness.metadata.contains(&key));
    assert!(!harness.engine.is_active(&key));
}

#[tokio::test]
async fn test_zero_threshold_disables_sweeping() {
    let harness = Harness::with(InMemoryContentEngine::new(), |config| {
        config.cache.max_idle = Duration::ZERO;
    });
    let magnet = harness.register_movie("Sintel");
    harness.service.list_files(&magnet).await.unwrap();

    assert!(harness.service.spawn_sweeper().is_none());

    let sweeper = InactivitySweeper::new(
        Arc::clone(harness.service.cache()),
        harness.metadata.clone(),
        Duration::ZERO,
        Duration::from_millis(10),
    );
    let far_future = std::time::Instant::now() + Duration::from_secs(86_400);
    assert!(sweeper.sweep_at(far_future).await.is_empty());
    assert_eq!(harness.service.cache().len(), 1);
}

#[tokio::test]
async fn test_background_sweeper_evicts_idle_sessions() {
    let harness = Harness::with(InMemoryContentEngine::new(), |config| {
        config.cache.max_idle = Duration::from_millis(100);
        config.cache.sweep_interval = Duration::from_millis(25);
    });
    let magnet = harness.register_movie("Sintel");
    harness.service.list_files(&magnet).await.unwrap();

    let task = harness.service.spawn_sweeper().unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(harness.service.cache().is_empty());
    assert_eq!(harness.engine.counters().releases(), 1);

    harness.service.shutdown();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .unwrap()
        .unwrap();
}
