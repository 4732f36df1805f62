//! Shared harness for integration tests

use std::sync::Arc;

use axum::Router;
use bytes::Bytes;
use tempfile::TempDir;
use undertow_core::{MediaService, UndertowConfig};
use undertow_sim::{InMemoryContentEngine, InMemoryMetadataStore, SimulatedContent};
use undertow_web::{AppState, router};

pub const MOVIE_SIZE: usize = 1000;

/// Media service wired to a simulated engine and an in-memory metadata
/// store, with derived files under a scratch directory.
pub struct Harness {
    pub dir: TempDir,
    pub engine: Arc<InMemoryContentEngine>,
    pub metadata: Arc<InMemoryMetadataStore>,
    pub service: Arc<MediaService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(InMemoryContentEngine::new(), |_| {})
    }

    pub fn with(engine: InMemoryContentEngine, configure: impl FnOnce(&mut UndertowConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UndertowConfig::for_testing(dir.path().to_path_buf());
        configure(&mut config);

        let engine = Arc::new(engine);
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let service = Arc::new(MediaService::new(
            config,
            engine.clone(),
            metadata.clone(),
        ));

        Self {
            dir,
            engine,
            metadata,
            service,
        }
    }

    /// Registers a movie of `MOVIE_SIZE` bytes plus a sidecar subtitle and
    /// returns the magnet link.
    pub fn register_movie(&self, name: &str) -> String {
        self.engine.register(movie(name))
    }

    pub fn router(&self) -> Router {
        router(AppState::new(Arc::clone(&self.service)))
    }

    /// Names of files currently in the download directory.
    pub fn derived_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn movie_bytes() -> Bytes {
    Bytes::from((0..MOVIE_SIZE).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

pub const SAMPLE_SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n";

pub fn movie(name: &str) -> SimulatedContent {
    SimulatedContent::new(name)
        .with_memory_file(format!("{name}/{name}.mp4"), movie_bytes())
        .with_memory_file(format!("{name}/{name}.srt"), Bytes::from_static(SAMPLE_SRT.as_bytes()))
}

pub fn key_of(magnet: &str) -> undertow_core::SessionKey {
    undertow_core::Descriptor::parse(magnet).unwrap().key().clone()
}
