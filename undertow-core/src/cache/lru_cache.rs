//! Bounded LRU map of live sessions

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::entry::CacheEntry;
use crate::session::SessionKey;

/// Receives entries leaving the cache.
///
/// Called synchronously by the mutation that evicted the entry, after the
/// cache lock has been released.
pub trait EvictionListener: Send + Sync {
    fn on_evict(&self, key: &SessionKey, entry: &CacheEntry);
}

/// Listener that does nothing, for caches whose entries own no resources.
#[derive(Debug, Default)]
pub struct NoopEvictionListener;

impl EvictionListener for NoopEvictionListener {
    fn on_evict(&self, _key: &SessionKey, _entry: &CacheEntry) {}
}

/// Session cache bounded by entry count.
pub struct SessionCache {
    entries: Mutex<LruCache<SessionKey, Arc<CacheEntry>>>,
    listener: Arc<dyn EvictionListener>,
}

impl SessionCache {
    /// Creates a cache holding at most `capacity` sessions (minimum one).
    pub fn new(capacity: usize, listener: Arc<dyn EvictionListener>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            listener,
        }
    }

    /// Returns the entry, marking it most recently used and touching its
    /// access time.
    pub fn get(&self, key: &SessionKey) -> Option<Arc<CacheEntry>> {
        let entry = self.entries.lock().get(key).cloned()?;
        entry.touch();
        Some(entry)
    }

    /// Returns the entry without changing recency or access time.
    pub fn peek(&self, key: &SessionKey) -> Option<Arc<CacheEntry>> {
        self.entries.lock().peek(key).cloned()
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.entries.lock().contains(key)
    }

    /// Inserts an entry, evicting the least recently used one on overflow.
    pub fn insert(&self, key: SessionKey, entry: CacheEntry) -> Arc<CacheEntry> {
        let entry = Arc::new(entry);
        let displaced = self.entries.lock().push(key, Arc::clone(&entry));

        if let Some((evicted_key, evicted)) = displaced
            && !Arc::ptr_eq(evicted.session(), entry.session())
        {
            tracing::info!(
                "Evicting session {} ({})",
                evicted_key,
                evicted.session().display_name()
            );
            self.listener.on_evict(&evicted_key, &evicted);
        }

        entry
    }

    /// Removes an entry, running the eviction listener. Returns whether the
    /// key was cached.
    pub fn remove(&self, key: &SessionKey) -> bool {
        let removed = self.entries.lock().pop(key);
        match removed {
            Some(entry) => {
                tracing::info!("Removing session {}", key);
                self.listener.on_evict(key, &entry);
                true
            }
            None => false,
        }
    }

    /// Evicts every entry, least recently used first.
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            std::iter::from_fn(|| entries.pop_lru()).collect()
        };

        for (key, entry) in drained {
            tracing::info!("Evicting session {} on shutdown", key);
            self.listener.on_evict(&key, &entry);
        }
    }

    /// Snapshot of all entries, most recently used first.
    pub fn entries(&self) -> Vec<(SessionKey, Arc<CacheEntry>)> {
        self.entries
            .lock()
            .iter()
            .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::session::test_support;

    #[derive(Default)]
    struct RecordingListener {
        evicted: Mutex<Vec<SessionKey>>,
    }

    impl EvictionListener for RecordingListener {
        fn on_evict(&self, key: &SessionKey, _entry: &CacheEntry) {
            self.evicted.lock().push(key.clone());
        }
    }

    fn entry(n: u8) -> (SessionKey, CacheEntry) {
        let session = test_support::session(n, vec![("file.bin", Bytes::from_static(b"x"))]);
        (test_support::key(n), CacheEntry::new(session))
    }

    #[test]
    fn test_insert_past_capacity_evicts_least_recently_used() {
        let listener = Arc::new(RecordingListener::default());
        let cache = SessionCache::new(2, listener.clone());

        let (k1, e1) = entry(1);
        let (k2, e2) = entry(2);
        let (k3, e3) = entry(3);
        cache.insert(k1.clone(), e1);
        cache.insert(k2.clone(), e2);

        // Access k1 so k2 becomes the LRU entry
        assert!(cache.get(&k1).is_some());

        cache.insert(k3.clone(), e3);

        assert_eq!(cache.len(), 2);
        assert_eq!(*listener.evicted.lock(), vec![k2.clone()]);
        assert!(cache.contains(&k1));
        assert!(!cache.contains(&k2));
        assert!(cache.contains(&k3));
    }

    #[test]
    fn test_remove_runs_listener_once() {
        let listener = Arc::new(RecordingListener::default());
        let cache = SessionCache::new(2, listener.clone());
        let (k1, e1) = entry(1);
        cache.insert(k1.clone(), e1);

        assert!(cache.remove(&k1));
        assert!(!cache.remove(&k1));
        assert_eq!(listener.evicted.lock().len(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_peek_does_not_promote() {
        let listener = Arc::new(RecordingListener::default());
        let cache = SessionCache::new(2, listener.clone());
        let (k1, e1) = entry(1);
        let (k2, e2) = entry(2);
        let (k3, e3) = entry(3);
        cache.insert(k1.clone(), e1);
        cache.insert(k2, e2);

        assert!(cache.peek(&k1).is_some());
        cache.insert(k3, e3);

        assert_eq!(*listener.evicted.lock(), vec![k1]);
    }

    #[test]
    fn test_clear_evicts_everything() {
        let listener = Arc::new(RecordingListener::default());
        let cache = SessionCache::new(3, listener.clone());
        for n in 1..=3 {
            let (key, entry) = entry(n);
            cache.insert(key, entry);
        }

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(listener.evicted.lock().len(), 3);
        assert_eq!(listener.evicted.lock()[0], test_support::key(1));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = SessionCache::new(0, Arc::new(NoopEvictionListener));
        assert_eq!(cache.capacity(), 1);
    }
}
