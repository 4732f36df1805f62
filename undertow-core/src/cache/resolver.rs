//! Tiered session resolution: hot cache, warm metadata, cold engine fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::entry::CacheEntry;
use super::lru_cache::SessionCache;
use crate::engine::{ContentEngine, ContentHandle, EngineError};
use crate::metadata::MetadataStore;
use crate::session::{Descriptor, Session, SessionKey};

/// Errors from session resolution.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Timed out after {after:?} waiting for content info of {key}")]
    Timeout { key: SessionKey, after: Duration },

    #[error("Resolution of {key} cancelled by shutdown")]
    Cancelled { key: SessionKey },

    #[error("Content engine failed to resolve {key}: {source}")]
    Engine {
        key: SessionKey,
        #[source]
        source: EngineError,
    },
}

/// Releases a half-resolved handle unless it was handed over to the cache.
struct PendingHandle<'a> {
    engine: &'a dyn ContentEngine,
    handle: Option<Arc<dyn ContentHandle>>,
}

impl<'a> PendingHandle<'a> {
    fn new(engine: &'a dyn ContentEngine, handle: Arc<dyn ContentHandle>) -> Self {
        Self {
            engine,
            handle: Some(handle),
        }
    }

    fn handle(&self) -> Option<&Arc<dyn ContentHandle>> {
        self.handle.as_ref()
    }

    fn into_inner(mut self) -> Option<Arc<dyn ContentHandle>> {
        self.handle.take()
    }
}

impl Drop for PendingHandle<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!("Releasing unresolved handle {}", handle.key());
            self.engine.release(&handle);
        }
    }
}

/// Per-key gate plus the number of resolutions currently holding or
/// waiting on it.
struct Gate {
    lock: Arc<tokio::sync::Mutex<()>>,
    users: usize,
}

type GateMap = parking_lot::Mutex<HashMap<SessionKey, Gate>>;

/// A caller's claim on a per-key gate. Dropping it, including when the
/// resolve future is abandoned mid-wait, removes the gate once unused.
struct GateTicket<'a> {
    gates: &'a GateMap,
    key: SessionKey,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> GateTicket<'a> {
    fn claim(gates: &'a GateMap, key: &SessionKey) -> Self {
        let mut map = gates.lock();
        let gate = map.entry(key.clone()).or_insert_with(|| Gate {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            users: 0,
        });
        gate.users += 1;
        Self {
            gates,
            key: key.clone(),
            lock: Arc::clone(&gate.lock),
        }
    }
}

impl Drop for GateTicket<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock();
        let unused = gates.get_mut(&self.key).is_some_and(|gate| {
            gate.users = gate.users.saturating_sub(1);
            gate.users == 0
        });
        if unused {
            gates.remove(&self.key);
        }
    }
}

/// Resolves descriptors into cached sessions.
///
/// Concurrent resolutions of one key are serialized by a per-key gate so at
/// most one cold fetch runs per key; later callers find the session in the
/// hot tier once the gate opens.
pub struct SessionResolver {
    cache: Arc<SessionCache>,
    engine: Arc<dyn ContentEngine>,
    metadata: Arc<dyn MetadataStore>,
    gates: GateMap,
    info_timeout: Duration,
    shutdown: CancellationToken,
}

impl SessionResolver {
    pub fn new(
        cache: Arc<SessionCache>,
        engine: Arc<dyn ContentEngine>,
        metadata: Arc<dyn MetadataStore>,
        info_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache,
            engine,
            metadata,
            gates: parking_lot::Mutex::new(HashMap::new()),
            info_timeout,
            shutdown,
        }
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Hot-tier lookup only. Touches the entry when found.
    pub fn lookup(&self, key: &SessionKey) -> Option<Arc<CacheEntry>> {
        self.cache.get(key)
    }

    /// Returns the cached session for a descriptor, resolving it if needed.
    ///
    /// # Errors
    /// - `ResolveError::Timeout` - Content info did not arrive in time
    /// - `ResolveError::Cancelled` - Shutdown started during the cold wait
    /// - `ResolveError::Engine` - Engine refused the descriptor
    pub async fn resolve(&self, descriptor: &Descriptor) -> Result<Arc<Session>, ResolveError> {
        let key = descriptor.key();

        if let Some(entry) = self.cache.get(key) {
            tracing::debug!("Hot hit for {}", key);
            return Ok(Arc::clone(entry.session()));
        }

        let ticket = GateTicket::claim(&self.gates, key);
        let _guard = ticket.lock.lock().await;
        self.resolve_gated(descriptor).await
    }

    async fn resolve_gated(&self, descriptor: &Descriptor) -> Result<Arc<Session>, ResolveError> {
        let key = descriptor.key();

        if let Some(entry) = self.cache.get(key) {
            tracing::debug!("Hot hit for {} after waiting on concurrent resolve", key);
            return Ok(Arc::clone(entry.session()));
        }

        if let Some(session) = self.resolve_warm(key).await {
            return Ok(session);
        }

        self.resolve_cold(descriptor).await
    }

    async fn resolve_warm(&self, key: &SessionKey) -> Option<Arc<Session>> {
        let metadata = match self.metadata.get(key).await {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Metadata lookup for {} failed, falling back to fetch: {}", key, e);
                return None;
            }
        };

        let handle = match self.engine.rehydrate(&metadata).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Rehydrating {} failed, falling back to fetch: {}", key, e);
                return None;
            }
        };

        if handle.key() != *key {
            tracing::warn!(
                "Persisted metadata for {} describes {}, ignoring it",
                key,
                handle.key()
            );
            self.engine.release(&handle);
            return None;
        }

        tracing::info!("Warm hit for {}", key);
        Some(self.admit(key, handle))
    }

    async fn resolve_cold(&self, descriptor: &Descriptor) -> Result<Arc<Session>, ResolveError> {
        let key = descriptor.key();
        tracing::info!("Cold resolve for {}", key);

        let handle = self
            .engine
            .resolve_descriptor(descriptor)
            .await
            .map_err(|source| ResolveError::Engine {
                key: key.clone(),
                source,
            })?;

        let pending = PendingHandle::new(self.engine.as_ref(), handle);
        if let Some(handle) = pending.handle() {
            tokio::select! {
                _ = handle.wait_info() => {}
                _ = tokio::time::sleep(self.info_timeout) => {
                    tracing::warn!("Timed out waiting for content info of {}", key);
                    return Err(ResolveError::Timeout {
                        key: key.clone(),
                        after: self.info_timeout,
                    });
                }
                _ = self.shutdown.cancelled() => {
                    return Err(ResolveError::Cancelled { key: key.clone() });
                }
            }
        }

        let Some(handle) = pending.into_inner() else {
            return Err(ResolveError::Cancelled { key: key.clone() });
        };

        match handle.serialize_metadata() {
            Ok(metadata) => {
                if let Err(e) = self.metadata.put(key, &metadata).await {
                    tracing::warn!("Failed to persist metadata for {}: {}", key, e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize metadata for {}: {}", key, e),
        }

        Ok(self.admit(key, handle))
    }

    fn admit(&self, key: &SessionKey, handle: Arc<dyn ContentHandle>) -> Arc<Session> {
        let session = Arc::new(Session::from_handle(handle));
        tracing::info!(
            "Session {} ready: {} ({} files, {} bytes)",
            key,
            session.display_name(),
            session.files().len(),
            session.total_size()
        );
        self.cache
            .insert(key.clone(), CacheEntry::new(Arc::clone(&session)));
        session
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.gates.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::cache::lru_cache::NoopEvictionListener;
    use crate::metadata::MetadataError;
    use crate::session::test_support::StaticHandle;

    const URI: &str = "magnet:?xt=urn:btih:0101010101010101010101010101010101010101&dn=One";

    #[derive(Default)]
    struct CountingEngine {
        never_ready: bool,
        resolve_calls: AtomicUsize,
        rehydrate_calls: AtomicUsize,
        release_calls: AtomicUsize,
    }

    struct StallingHandle(StaticHandle);

    #[async_trait]
    impl ContentHandle for StallingHandle {
        fn key(&self) -> SessionKey {
            self.0.key()
        }
        async fn wait_info(&self) {
            std::future::pending::<()>().await
        }
        fn display_name(&self) -> String {
            self.0.display_name()
        }
        fn files(&self) -> Vec<crate::session::FileDescriptor> {
            self.0.files()
        }
        async fn open_reader(
            &self,
            file_index: usize,
        ) -> Result<Box<dyn crate::engine::FileReader>, EngineError> {
            self.0.open_reader(file_index).await
        }
        fn progress(&self) -> crate::session::ProgressSnapshot {
            self.0.progress()
        }
        fn serialize_metadata(&self) -> Result<Vec<u8>, EngineError> {
            self.0.serialize_metadata()
        }
    }

    fn static_handle(key: SessionKey) -> StaticHandle {
        StaticHandle {
            key,
            files: vec![("movie.mkv".to_string(), Bytes::from_static(b"data"))],
        }
    }

    #[async_trait]
    impl ContentEngine for CountingEngine {
        async fn resolve_descriptor(
            &self,
            descriptor: &Descriptor,
        ) -> Result<Arc<dyn ContentHandle>, EngineError> {
            self.resolve_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let handle = static_handle(descriptor.key().clone());
            if self.never_ready {
                Ok(Arc::new(StallingHandle(handle)))
            } else {
                Ok(Arc::new(handle))
            }
        }

        async fn rehydrate(&self, metadata: &[u8]) -> Result<Arc<dyn ContentHandle>, EngineError> {
            self.rehydrate_calls.fetch_add(1, Ordering::SeqCst);
            let hex = std::str::from_utf8(metadata).map_err(|e| EngineError::InvalidMetadata {
                reason: e.to_string(),
            })?;
            let key = SessionKey::from_hex(hex).map_err(|e| EngineError::InvalidMetadata {
                reason: e.to_string(),
            })?;
            Ok(Arc::new(static_handle(key)))
        }

        fn release(&self, _handle: &Arc<dyn ContentHandle>) {
            self.release_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MapStore {
        entries: parking_lot::Mutex<HashMap<SessionKey, Vec<u8>>>,
        fail_puts: bool,
    }

    #[async_trait]
    impl MetadataStore for MapStore {
        async fn get(&self, key: &SessionKey) -> Result<Option<Vec<u8>>, MetadataError> {
            Ok(self.entries.lock().get(key).cloned())
        }

        async fn put(&self, key: &SessionKey, metadata: &[u8]) -> Result<(), MetadataError> {
            if self.fail_puts {
                return Err(MetadataError::Unavailable {
                    reason: "disk full".to_string(),
                });
            }
            self.entries.lock().insert(key.clone(), metadata.to_vec());
            Ok(())
        }

        async fn delete(&self, key: &SessionKey) -> Result<(), MetadataError> {
            self.entries.lock().remove(key);
            Ok(())
        }
    }

    fn resolver(
        engine: Arc<CountingEngine>,
        store: Arc<MapStore>,
        timeout: Duration,
    ) -> SessionResolver {
        let cache = Arc::new(SessionCache::new(2, Arc::new(NoopEvictionListener)));
        SessionResolver::new(cache, engine, store, timeout, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_repeated_resolve_returns_same_session() {
        let engine = Arc::new(CountingEngine::default());
        let store = Arc::new(MapStore::default());
        let resolver = resolver(engine.clone(), store.clone(), Duration::from_secs(1));
        let descriptor = Descriptor::parse(URI).unwrap();

        let first = resolver.resolve(&descriptor).await.unwrap();
        let second = resolver.resolve(&descriptor).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.resolve_calls.load(Ordering::SeqCst), 1);
        assert!(store.entries.lock().contains_key(descriptor.key()));
        assert_eq!(resolver.gate_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_fetch() {
        let engine = Arc::new(CountingEngine::default());
        let resolver = Arc::new(resolver(
            engine.clone(),
            Arc::new(MapStore::default()),
            Duration::from_secs(1),
        ));
        let descriptor = Descriptor::parse(URI).unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                let descriptor = descriptor.clone();
                tokio::spawn(async move { resolver.resolve(&descriptor).await.unwrap() })
            })
            .collect();

        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.unwrap());
        }

        assert_eq!(engine.resolve_calls.load(Ordering::SeqCst), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(resolver.gate_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_resolves_release_gate() {
        let engine = Arc::new(CountingEngine {
            never_ready: true,
            ..Default::default()
        });
        let resolver = resolver(
            engine.clone(),
            Arc::new(MapStore::default()),
            Duration::from_secs(30),
        );
        let descriptor = Descriptor::parse(URI).unwrap();

        // One caller holds the gate while the other waits on it; both give up
        let holder = tokio::time::timeout(Duration::from_millis(150), resolver.resolve(&descriptor));
        let waiter = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(resolver.gate_count(), 1);
            tokio::time::timeout(Duration::from_millis(50), resolver.resolve(&descriptor)).await
        };
        let (held, waited) = futures::join!(holder, waiter);

        assert!(held.is_err());
        assert!(waited.is_err());
        assert_eq!(resolver.gate_count(), 0);
        assert_eq!(engine.release_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_warm_path_skips_engine_fetch() {
        let engine = Arc::new(CountingEngine::default());
        let store = Arc::new(MapStore::default());
        let descriptor = Descriptor::parse(URI).unwrap();
        store.entries.lock().insert(
            descriptor.key().clone(),
            descriptor.key().as_str().as_bytes().to_vec(),
        );

        let resolver = resolver(engine.clone(), store, Duration::from_secs(1));
        let session = resolver.resolve(&descriptor).await.unwrap();

        assert_eq!(session.key(), descriptor.key());
        assert_eq!(engine.rehydrate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.resolve_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_falls_back_to_cold() {
        let engine = Arc::new(CountingEngine::default());
        let store = Arc::new(MapStore::default());
        let descriptor = Descriptor::parse(URI).unwrap();
        store
            .entries
            .lock()
            .insert(descriptor.key().clone(), b"not hex".to_vec());

        let resolver = resolver(engine.clone(), store, Duration::from_secs(1));
        assert!(resolver.resolve(&descriptor).await.is_ok());
        assert_eq!(engine.resolve_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cold_timeout_releases_handle() {
        let engine = Arc::new(CountingEngine {
            never_ready: true,
            ..Default::default()
        });
        let resolver = resolver(
            engine.clone(),
            Arc::new(MapStore::default()),
            Duration::from_millis(50),
        );
        let descriptor = Descriptor::parse(URI).unwrap();

        let result = resolver.resolve(&descriptor).await;

        assert!(matches!(result, Err(ResolveError::Timeout { .. })));
        assert_eq!(engine.release_calls.load(Ordering::SeqCst), 1);
        assert!(resolver.cache().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_cold_wait() {
        let engine = Arc::new(CountingEngine {
            never_ready: true,
            ..Default::default()
        });
        let shutdown = CancellationToken::new();
        let cache = Arc::new(SessionCache::new(2, Arc::new(NoopEvictionListener)));
        let resolver = SessionResolver::new(
            cache,
            engine.clone(),
            Arc::new(MapStore::default()),
            Duration::from_secs(30),
            shutdown.clone(),
        );
        let descriptor = Descriptor::parse(URI).unwrap();

        shutdown.cancel();
        let result = resolver.resolve(&descriptor).await;

        assert!(matches!(result, Err(ResolveError::Cancelled { .. })));
        assert_eq!(engine.release_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_persist_failure_does_not_fail_resolve() {
        let engine = Arc::new(CountingEngine::default());
        let store = Arc::new(MapStore {
            fail_puts: true,
            ..Default::default()
        });
        let resolver = resolver(engine, store.clone(), Duration::from_secs(1));
        let descriptor = Descriptor::parse(URI).unwrap();

        assert!(resolver.resolve(&descriptor).await.is_ok());
        assert!(store.entries.lock().is_empty());
    }
}
