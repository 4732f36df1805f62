//! Periodic eviction of idle sessions

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::lru_cache::SessionCache;
use crate::metadata::MetadataStore;
use crate::session::SessionKey;

/// Evicts sessions idle longer than `max_idle` and forgets their metadata.
pub struct InactivitySweeper {
    cache: Arc<SessionCache>,
    metadata: Arc<dyn MetadataStore>,
    max_idle: Duration,
    interval: Duration,
}

impl InactivitySweeper {
    pub fn new(
        cache: Arc<SessionCache>,
        metadata: Arc<dyn MetadataStore>,
        max_idle: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            metadata,
            max_idle,
            interval,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.max_idle.is_zero()
    }

    /// Keys idle strictly longer than the threshold at `now`.
    pub fn collect_idle(&self, now: Instant) -> Vec<SessionKey> {
        if !self.is_enabled() {
            return Vec::new();
        }

        self.cache
            .entries()
            .into_iter()
            .filter(|(_, entry)| entry.idle_for(now) > self.max_idle)
            .map(|(key, _)| key)
            .collect()
    }

    /// Runs one sweep pass as of `now`, returning the evicted keys.
    pub async fn sweep_at(&self, now: Instant) -> Vec<SessionKey> {
        let idle = self.collect_idle(now);
        let mut swept = Vec::with_capacity(idle.len());

        for key in idle {
            // An entry touched since the scan stays: re-check before acting
            let still_idle = self
                .cache
                .peek(&key)
                .is_some_and(|entry| entry.idle_for(now) > self.max_idle);
            if !still_idle {
                continue;
            }

            tracing::info!("Sweeping session {} idle for over {:?}", key, self.max_idle);
            self.cache.remove(&key);

            if let Err(e) = self.metadata.delete(&key).await {
                tracing::warn!("Failed to delete metadata for swept session {}: {}", key, e);
            }
            swept.push(key);
        }

        swept
    }

    /// Spawns the periodic sweep task. Returns `None` when sweeping is
    /// disabled by a zero threshold.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            tracing::info!("Inactivity sweeper disabled");
            return None;
        }

        tracing::info!(
            "Inactivity sweeper running every {:?}, evicting after {:?} idle",
            self.interval,
            self.max_idle
        );

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let swept = self.sweep_at(Instant::now()).await;
                        if !swept.is_empty() {
                            tracing::debug!("Sweep evicted {} sessions", swept.len());
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Inactivity sweeper stopping");
                        break;
                    }
                }
            }
        }))
    }
}
