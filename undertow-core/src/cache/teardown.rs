//! Eviction teardown: engine release plus derived file cleanup.

use std::sync::Arc;

use super::entry::CacheEntry;
use super::lru_cache::EvictionListener;
use crate::engine::ContentEngine;
use crate::session::SessionKey;
use crate::subtitles::SubtitlePipeline;

/// Eviction listener that releases the session in the engine, then drops
/// every derived artifact and extraction job of that session.
pub struct SessionTeardown {
    engine: Arc<dyn ContentEngine>,
    subtitles: Arc<SubtitlePipeline>,
}

impl SessionTeardown {
    pub fn new(engine: Arc<dyn ContentEngine>, subtitles: Arc<SubtitlePipeline>) -> Self {
        Self { engine, subtitles }
    }
}

impl EvictionListener for SessionTeardown {
    fn on_evict(&self, key: &SessionKey, entry: &CacheEntry) {
        self.engine.release(entry.session().handle());
        let removed = self.subtitles.cleanup_session(key);
        tracing::debug!(
            "Released session {} and removed {} derived files",
            key,
            removed
        );
    }
}
