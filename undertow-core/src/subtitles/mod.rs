//! Subtitle pipeline: SRT conversion, embedded track extraction and the
//! derived files both produce.

pub mod artifacts;
pub mod convert;
pub mod extraction;

use std::path::PathBuf;

pub use artifacts::{ArtifactStore, ExtractionPaths};
pub use extraction::{ExtractionProgress, JobState, JobStatus, SubtitleExtractor};
use tokio::io::AsyncReadExt;

use crate::config::{SubtitleConfig, UndertowConfig};
use crate::engine::EngineError;
use crate::session::{Session, SessionKey};

/// Errors from subtitle conversion, extraction and artifact access.
#[derive(Debug, thiserror::Error)]
pub enum SubtitleError {
    #[error("Subtitle file not found in content: {path}")]
    SourceNotFound { path: String },

    #[error("Subtitle file not found or no longer active: {key}")]
    ArtifactNotFound { key: String },

    #[error("No file at index {index} ({file_count} files)")]
    FileIndexOutOfRange { index: usize, file_count: usize },

    #[error("Invalid file name: {name}")]
    InvalidArtifactName { name: String },

    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Content engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Derived subtitle files of all cached sessions.
pub struct SubtitlePipeline {
    artifacts: ArtifactStore,
    extractor: SubtitleExtractor,
}

impl SubtitlePipeline {
    pub fn new(
        dir: impl Into<PathBuf>,
        config: &SubtitleConfig,
        stream_base_url: impl Into<String>,
    ) -> Self {
        Self {
            artifacts: ArtifactStore::new(dir),
            extractor: SubtitleExtractor::new(config.tool.clone(), stream_base_url),
        }
    }

    pub fn from_config(config: &UndertowConfig) -> Self {
        Self::new(
            config.storage.download_dir.clone(),
            &config.subtitles,
            config.server.loopback_url(),
        )
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn extractor(&self) -> &SubtitleExtractor {
        &self.extractor
    }

    /// Converts an SRT file of the session to WebVTT and returns its key.
    ///
    /// An existing file under the same key is reused as is.
    ///
    /// # Errors
    /// - `SubtitleError::SourceNotFound` - No file with that exact path
    /// - `SubtitleError::Engine` - Reader could not be opened
    /// - `SubtitleError::Io` - Reading the source or writing the output failed
    pub async fn convert(&self, session: &Session, source_path: &str) -> Result<String, SubtitleError> {
        let (index, _) = session
            .find_file(source_path)
            .ok_or_else(|| SubtitleError::SourceNotFound {
                path: source_path.to_string(),
            })?;

        let name = ArtifactStore::converted_name(session.key(), source_path);
        let path = self.artifacts.path_of(&name);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!("Converted subtitle {} already exists", name);
            self.artifacts.register(name.clone(), path);
            return Ok(name);
        }

        let mut reader = session.open_reader(index).await?;
        let mut srt = Vec::new();
        reader
            .read_to_end(&mut srt)
            .await
            .map_err(|source| SubtitleError::Io {
                path: PathBuf::from(source_path),
                source,
            })?;

        let vtt = convert::srt_to_vtt(&String::from_utf8_lossy(&srt));
        tokio::fs::write(&path, vtt)
            .await
            .map_err(|source| SubtitleError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!("Converted {} of {} to {}", source_path, session.key(), name);
        self.artifacts.register(name.clone(), path);
        Ok(name)
    }

    /// Reads a registered converted subtitle.
    ///
    /// # Errors
    /// - `SubtitleError::ArtifactNotFound` - Key unknown or evicted
    /// - `SubtitleError::Io` - File vanished or is unreadable
    pub async fn fetch_artifact(&self, key: &str) -> Result<Vec<u8>, SubtitleError> {
        let path = self
            .artifacts
            .lookup(key)
            .ok_or_else(|| SubtitleError::ArtifactNotFound {
                key: key.to_string(),
            })?;

        tokio::fs::read(&path)
            .await
            .map_err(|source| SubtitleError::Io { path, source })
    }

    /// Launches extraction of the first subtitle track of a file.
    ///
    /// # Errors
    /// - `SubtitleError::FileIndexOutOfRange` - No file at `file_index`
    /// - `SubtitleError::ToolUnavailable` - Extraction tool missing
    /// - `SubtitleError::Io` - Log file could not be created
    pub fn start_extraction(
        &self,
        session: &Session,
        descriptor_uri: &str,
        file_index: usize,
    ) -> Result<ExtractionPaths, SubtitleError> {
        if session.file(file_index).is_none() {
            return Err(SubtitleError::FileIndexOutOfRange {
                index: file_index,
                file_count: session.files().len(),
            });
        }

        let paths = self.artifacts.extraction_paths(session.key(), file_index);
        self.extractor
            .start(descriptor_uri, session.key(), file_index, paths)
    }

    /// Infers job status from an extraction log.
    ///
    /// # Errors
    /// - `SubtitleError::InvalidArtifactName` - Unsafe log name
    /// - `SubtitleError::ArtifactNotFound` - No such log
    /// - `SubtitleError::Io` - Log unreadable
    pub async fn extraction_status(&self, log_name: &str) -> Result<JobStatus, SubtitleError> {
        let path = self.artifacts.resolve_by_name(log_name)?;
        let log = tokio::fs::read(&path)
            .await
            .map_err(|source| SubtitleError::Io { path, source })?;
        Ok(JobStatus::from_log(&String::from_utf8_lossy(&log)))
    }

    /// Validated path of any derived file, for fetch-by-name.
    pub fn artifact_path(&self, name: &str) -> Result<PathBuf, SubtitleError> {
        self.artifacts.resolve_by_name(name)
    }

    /// Cancels the session's extraction jobs and deletes its derived files.
    /// Returns the number of files removed.
    pub fn cleanup_session(&self, key: &SessionKey) -> usize {
        let cancelled = self.extractor.cancel_session(key);
        if cancelled > 0 {
            tracing::info!("Cancelled {} extraction jobs of {}", cancelled, key);
        }
        self.artifacts.cleanup_session(key)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::session::test_support;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n";

    fn pipeline(dir: &TempDir) -> SubtitlePipeline {
        SubtitlePipeline::new(dir.path(), &SubtitleConfig::default(), "http://127.0.0.1:3000")
    }

    #[tokio::test]
    async fn test_convert_writes_and_registers() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(&temp_dir);
        let session = test_support::session(
            1,
            vec![("movie.mkv", Bytes::from_static(b"video")), ("movie.en.srt", Bytes::from_static(SRT.as_bytes()))],
        );

        let key = pipeline.convert(&session, "movie.en.srt").await.unwrap();

        let bytes = pipeline.fetch_artifact(&key).await.unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "WEBVTT\n\n00:00:01.000 --> 00:00:02.000\nHello\n\n"
        );
    }

    #[tokio::test]
    async fn test_convert_reuses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(&temp_dir);
        let session =
            test_support::session(1, vec![("sub.srt", Bytes::from_static(SRT.as_bytes()))]);

        let first = pipeline.convert(&session, "sub.srt").await.unwrap();
        let path = pipeline.artifacts().path_of(&first);
        std::fs::write(&path, "sentinel").unwrap();

        let second = pipeline.convert(&session, "sub.srt").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "sentinel");
    }

    #[tokio::test]
    async fn test_convert_unknown_path() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(&temp_dir);
        let session = test_support::session(1, vec![("sub.srt", Bytes::from_static(b""))]);

        let result = pipeline.convert(&session, "other.srt").await;
        assert!(matches!(result, Err(SubtitleError::SourceNotFound { .. })));
        assert!(matches!(
            pipeline.fetch_artifact("nothing.vtt").await,
            Err(SubtitleError::ArtifactNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_extraction_rejects_bad_index() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(&temp_dir);
        let session = test_support::session(1, vec![("movie.mkv", Bytes::from_static(b"v"))]);

        let result = pipeline.start_extraction(&session, "magnet:?xt=urn:btih:00", 4);
        assert!(matches!(
            result,
            Err(SubtitleError::FileIndexOutOfRange { index: 4, file_count: 1 })
        ));
    }

    #[tokio::test]
    async fn test_extraction_status_reads_log() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(&temp_dir);
        let paths = pipeline
            .artifacts()
            .extraction_paths(&test_support::key(1), 0);
        std::fs::write(&paths.log_path, "noise\n\nExtraction finished successfully.").unwrap();

        let status = pipeline.extraction_status(&paths.log_name).await.unwrap();
        assert_eq!(status, JobStatus::Succeeded);
        assert!(matches!(
            pipeline.extraction_status("../etc/passwd").await,
            Err(SubtitleError::InvalidArtifactName { .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_drops_converted_subtitles() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = pipeline(&temp_dir);
        let session =
            test_support::session(1, vec![("sub.srt", Bytes::from_static(SRT.as_bytes()))]);
        let key = pipeline.convert(&session, "sub.srt").await.unwrap();

        assert_eq!(pipeline.cleanup_session(session.key()), 1);
        assert!(pipeline.fetch_artifact(&key).await.is_err());
        assert!(!pipeline.artifacts().path_of(&key).exists());
    }
}
