//! Media service facade used by the HTTP layer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{InactivitySweeper, SessionCache, SessionResolver, SessionTeardown};
use crate::config::UndertowConfig;
use crate::engine::ContentEngine;
use crate::metadata::{FileMetadataStore, MetadataStore};
use crate::session::{Descriptor, Metainfo, Session, SessionError, metainfo};
use crate::status::{ContentSummary, FileListing, StatusReport};
use crate::streaming::{StreamResponse, open_stream};
use crate::subtitles::{ExtractionPaths, JobStatus, SubtitlePipeline};
use crate::{Result, UndertowError};

/// Owns the session cache, resolver, subtitle pipeline and sweeper, and
/// exposes one method per HTTP operation.
pub struct MediaService {
    config: UndertowConfig,
    cache: Arc<SessionCache>,
    resolver: SessionResolver,
    subtitles: Arc<SubtitlePipeline>,
    metadata: Arc<dyn MetadataStore>,
    http: reqwest::Client,
    shutdown: CancellationToken,
}

impl MediaService {
    pub fn new(
        config: UndertowConfig,
        engine: Arc<dyn ContentEngine>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let subtitles = Arc::new(SubtitlePipeline::from_config(&config));
        let teardown = SessionTeardown::new(Arc::clone(&engine), Arc::clone(&subtitles));
        let cache = Arc::new(SessionCache::new(config.cache.capacity, Arc::new(teardown)));
        let shutdown = CancellationToken::new();
        let resolver = SessionResolver::new(
            Arc::clone(&cache),
            engine,
            Arc::clone(&metadata),
            config.cache.info_timeout,
            shutdown.clone(),
        );

        Self {
            config,
            cache,
            resolver,
            subtitles,
            metadata,
            http: reqwest::Client::new(),
            shutdown,
        }
    }

    /// Creates the download directory and a file-backed metadata store
    /// inside it.
    ///
    /// # Errors
    /// - `UndertowError::Io` - Download directory could not be created
    /// - `UndertowError::Metadata` - Metadata directory could not be created
    pub async fn open(config: UndertowConfig, engine: Arc<dyn ContentEngine>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage.download_dir).await?;
        let store = FileMetadataStore::open(config.storage.metadata_dir())
            .await?
            .with_temp_suffix(config.storage.temp_file_suffix);
        Ok(Self::new(config, engine, Arc::new(store)))
    }

    pub fn config(&self) -> &UndertowConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    pub fn subtitles(&self) -> &Arc<SubtitlePipeline> {
        &self.subtitles
    }

    /// Fails when the subtitle extraction tool cannot be found.
    ///
    /// # Errors
    /// - `UndertowError::Configuration` - Tool missing from `PATH`
    pub fn verify_tools(&self) -> Result<()> {
        let path = self
            .subtitles
            .extractor()
            .verify_installation()
            .map_err(|e| UndertowError::Configuration {
                reason: e.to_string(),
            })?;
        tracing::info!("Using extraction tool at {}", path.display());
        Ok(())
    }

    async fn resolve(&self, uri: &str) -> Result<(Descriptor, Arc<Session>)> {
        let descriptor = Descriptor::parse(uri)?;
        let session = self.resolver.resolve(&descriptor).await?;
        Ok((descriptor, session))
    }

    /// Converts an uploaded metainfo file into a magnet link.
    ///
    /// # Errors
    /// - `MetainfoError::Invalid` - Body is not a usable metainfo file
    pub fn magnet_from_metainfo(&self, bytes: &[u8]) -> Result<String> {
        let metainfo = Metainfo::parse(bytes)?;
        tracing::debug!("Parsed metainfo for {} ({})", metainfo.name(), metainfo.key());
        Ok(metainfo.magnet_link())
    }

    /// Downloads a metainfo file and converts it into a magnet link.
    ///
    /// # Errors
    /// - `MetainfoError::Fetch` - Request failed
    /// - `MetainfoError::UpstreamStatus` - Server did not answer 200
    /// - `MetainfoError::Invalid` - Downloaded body is not a usable metainfo file
    pub async fn magnet_from_url(&self, url: &str) -> Result<String> {
        let bytes =
            metainfo::fetch_metainfo(&self.http, url, self.config.server.fetch_timeout).await?;
        self.magnet_from_metainfo(&bytes)
    }

    pub async fn list_files(&self, uri: &str) -> Result<FileListing> {
        let (_, session) = self.resolve(uri).await?;
        Ok(FileListing::from_session(&session))
    }

    pub async fn summary(&self, uri: &str) -> Result<ContentSummary> {
        let (_, session) = self.resolve(uri).await?;
        Ok(ContentSummary::from_session(&session))
    }

    pub async fn stream(
        &self,
        uri: &str,
        file_index: Option<usize>,
        range: Option<&str>,
    ) -> Result<StreamResponse> {
        let (_, session) = self.resolve(uri).await?;
        Ok(open_stream(&session, file_index, range, self.config.streaming.chunk_size).await?)
    }

    /// Status of an already cached session. Never triggers resolution.
    ///
    /// # Errors
    /// - `SessionError::InvalidDescriptor` - Malformed descriptor
    /// - `SessionError::NotCached` - Session is not in the cache
    pub fn status(&self, uri: &str, file_index: Option<usize>) -> Result<StatusReport> {
        let descriptor = Descriptor::parse(uri)?;
        let entry = self
            .resolver
            .lookup(descriptor.key())
            .ok_or_else(|| SessionError::NotCached {
                key: descriptor.key().clone(),
            })?;

        Ok(StatusReport::build(
            &entry,
            file_index,
            Instant::now(),
            self.config.cache.speed_sample_interval,
        ))
    }

    /// Converts an SRT file and returns the artifact key to fetch it by.
    pub async fn convert_subtitle(&self, uri: &str, file_path: &str) -> Result<String> {
        let (_, session) = self.resolve(uri).await?;
        Ok(self.subtitles.convert(&session, file_path).await?)
    }

    pub async fn fetch_artifact(&self, key: &str) -> Result<Vec<u8>> {
        Ok(self.subtitles.fetch_artifact(key).await?)
    }

    /// Starts extraction and returns the log and output names immediately.
    pub async fn start_extraction(&self, uri: &str, file_index: usize) -> Result<ExtractionPaths> {
        let (descriptor, session) = self.resolve(uri).await?;
        Ok(self
            .subtitles
            .start_extraction(&session, descriptor.uri(), file_index)?)
    }

    pub async fn extraction_status(&self, log_name: &str) -> Result<JobStatus> {
        Ok(self.subtitles.extraction_status(log_name).await?)
    }

    pub fn artifact_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.subtitles.artifact_path(name)?)
    }

    /// Starts the inactivity sweeper. Returns `None` when disabled.
    pub fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let sweeper = Arc::new(InactivitySweeper::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.metadata),
            self.config.cache.max_idle,
            self.config.cache.sweep_interval,
        ));
        sweeper.spawn(self.shutdown.clone())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancels pending resolutions, stops the sweeper and evicts every
    /// cached session.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down, evicting {} sessions", self.cache.len());
        self.shutdown.cancel();
        self.cache.clear();
    }
}
