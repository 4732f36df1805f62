//! Simulated content engine

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use undertow_core::engine::FileReader;
use undertow_core::{
    ContentEngine, ContentHandle, Descriptor, EngineError, FileDescriptor, ProgressSnapshot,
    SessionKey,
};

use crate::content::{ContentSource, SimulatedContent};

/// Calls observed by the engine, for tier assertions in tests.
#[derive(Debug, Default)]
pub struct EngineCounters {
    pub resolve_calls: AtomicUsize,
    pub rehydrate_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
}

impl EngineCounters {
    pub fn resolves(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn rehydrates(&self) -> usize {
        self.rehydrate_calls.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedContent {
    key: String,
    name: String,
    files: Vec<PersistedFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedFile {
    path: String,
    size: u64,
}

/// Content engine backed by a fixed catalog.
///
/// Descriptors whose key is not in the catalog resolve to handles that never
/// learn their info, which is how an unreachable swarm looks to callers.
pub struct InMemoryContentEngine {
    catalog: RwLock<HashMap<SessionKey, Arc<SimulatedContent>>>,
    active: Mutex<HashSet<SessionKey>>,
    info_delay: Duration,
    download_speed: u64,
    peer_count: usize,
    counters: Arc<EngineCounters>,
}

impl Default for InMemoryContentEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryContentEngine {
    /// Engine with instant info and fully available content.
    pub fn new() -> Self {
        Self {
            catalog: RwLock::new(HashMap::new()),
            active: Mutex::new(HashSet::new()),
            info_delay: Duration::ZERO,
            download_speed: 0,
            peer_count: 8,
            counters: Arc::new(EngineCounters::default()),
        }
    }

    /// Delay between resolving a descriptor and its info becoming known.
    pub fn with_info_delay(mut self, delay: Duration) -> Self {
        self.info_delay = delay;
        self
    }

    /// Simulated download rate in bytes per second; zero means complete.
    pub fn with_download_speed(mut self, bytes_per_second: u64) -> Self {
        self.download_speed = bytes_per_second;
        self
    }

    /// Adds content to the catalog and returns its magnet link.
    pub fn register(&self, content: SimulatedContent) -> String {
        let magnet = content.magnet_link();
        tracing::debug!(
            "Registered simulated content {} ({}, {} files)",
            content.key,
            content.name,
            content.files.len()
        );
        self.catalog
            .write()
            .insert(content.key.clone(), Arc::new(content));
        magnet
    }

    pub fn counters(&self) -> Arc<EngineCounters> {
        Arc::clone(&self.counters)
    }

    /// Whether a handle for `key` is resolved and not yet released.
    pub fn is_active(&self, key: &SessionKey) -> bool {
        self.active.lock().contains(key)
    }

    fn handle_for(
        &self,
        key: SessionKey,
        content: Option<Arc<SimulatedContent>>,
        ready: bool,
    ) -> Arc<SimulatedHandle> {
        let (ready_tx, _) = watch::channel(ready);
        self.active.lock().insert(key.clone());
        Arc::new(SimulatedHandle {
            key,
            content,
            ready: Arc::new(ready_tx),
            started_at: Instant::now(),
            download_speed: self.download_speed,
            peer_count: self.peer_count,
        })
    }
}

#[async_trait]
impl ContentEngine for InMemoryContentEngine {
    async fn resolve_descriptor(
        &self,
        descriptor: &Descriptor,
    ) -> Result<Arc<dyn ContentHandle>, EngineError> {
        self.counters.resolve_calls.fetch_add(1, Ordering::SeqCst);

        let content = self.catalog.read().get(descriptor.key()).cloned();
        let known = content.is_some();
        let handle = self.handle_for(descriptor.key().clone(), content, false);

        if known {
            let ready = Arc::clone(&handle.ready);
            let delay = self.info_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                ready.send_replace(true);
            });
        } else {
            tracing::debug!("No simulated content for {}, info will never arrive", descriptor.key());
        }

        Ok(handle)
    }

    async fn rehydrate(&self, metadata: &[u8]) -> Result<Arc<dyn ContentHandle>, EngineError> {
        self.counters.rehydrate_calls.fetch_add(1, Ordering::SeqCst);

        let persisted: PersistedContent =
            serde_json::from_slice(metadata).map_err(|e| EngineError::InvalidMetadata {
                reason: e.to_string(),
            })?;
        let key = SessionKey::from_hex(&persisted.key).map_err(|e| EngineError::InvalidMetadata {
            reason: e.to_string(),
        })?;

        let content = self.catalog.read().get(&key).cloned().ok_or_else(|| {
            EngineError::InvalidMetadata {
                reason: format!("no content for {key}"),
            }
        })?;

        Ok(self.handle_for(key, Some(content), true))
    }

    fn release(&self, handle: &Arc<dyn ContentHandle>) {
        self.counters.release_calls.fetch_add(1, Ordering::SeqCst);
        self.active.lock().remove(&handle.key());
        tracing::debug!("Released simulated handle {}", handle.key());
    }
}

/// Handle to one simulated content item.
pub struct SimulatedHandle {
    key: SessionKey,
    content: Option<Arc<SimulatedContent>>,
    ready: Arc<watch::Sender<bool>>,
    started_at: Instant,
    download_speed: u64,
    peer_count: usize,
}

impl SimulatedHandle {
    fn bytes_completed(&self, total: u64) -> u64 {
        if self.download_speed == 0 {
            return total;
        }
        let elapsed = self.started_at.elapsed().as_secs_f64();
        ((elapsed * self.download_speed as f64) as u64).min(total)
    }
}

#[async_trait]
impl ContentHandle for SimulatedHandle {
    fn key(&self) -> SessionKey {
        self.key.clone()
    }

    async fn wait_info(&self) {
        let mut ready = self.ready.subscribe();
        let known = ready.wait_for(|ready| *ready).await.is_ok();
        if !known {
            std::future::pending::<()>().await;
        }
    }

    fn display_name(&self) -> String {
        self.content
            .as_ref()
            .map(|content| content.name.clone())
            .unwrap_or_else(|| self.key.to_string())
    }

    fn files(&self) -> Vec<FileDescriptor> {
        self.content
            .as_ref()
            .map(|content| content.descriptors())
            .unwrap_or_default()
    }

    async fn open_reader(&self, file_index: usize) -> Result<Box<dyn FileReader>, EngineError> {
        let files = self.content.as_ref().map(|c| c.files.as_slice()).unwrap_or_default();
        let file = files.get(file_index).ok_or(EngineError::FileIndexOutOfRange {
            index: file_index,
            file_count: files.len(),
        })?;

        match &file.source {
            ContentSource::Memory(data) => Ok(Box::new(Cursor::new(data.clone()))),
            ContentSource::Disk { path, .. } => {
                let file = tokio::fs::File::open(path).await?;
                Ok(Box::new(file))
            }
        }
    }

    fn progress(&self) -> ProgressSnapshot {
        let sizes: Vec<u64> = self.files().iter().map(|file| file.size).collect();
        let total_bytes: u64 = sizes.iter().sum();
        let bytes_completed = self.bytes_completed(total_bytes);

        // Files complete in order
        let mut budget = bytes_completed;
        let files_completed = sizes
            .iter()
            .map(|size| {
                let done = budget.min(*size);
                budget -= done;
                done
            })
            .collect();

        ProgressSnapshot {
            bytes_completed,
            total_bytes,
            peer_count: if bytes_completed < total_bytes { self.peer_count } else { 0 },
            files_completed,
        }
    }

    fn serialize_metadata(&self) -> Result<Vec<u8>, EngineError> {
        let content = self.content.as_ref().ok_or_else(|| EngineError::Unavailable {
            reason: format!("info for {} is not known", self.key),
        })?;

        let persisted = PersistedContent {
            key: self.key.to_string(),
            name: content.name.clone(),
            files: content
                .files
                .iter()
                .map(|file| PersistedFile {
                    path: file.path.clone(),
                    size: file.source.size(),
                })
                .collect(),
        };

        serde_json::to_vec(&persisted).map_err(|e| EngineError::Unavailable {
            reason: e.to_string(),
        })
    }
}
