//! Centralized configuration for Undertow.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Undertow components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub cache: CacheConfig,
    pub streaming: StreamingConfig,
    pub subtitles: SubtitleConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

/// Session cache, resolver and sweeper configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of live sessions kept in memory
    pub capacity: usize,
    /// How long a cold resolution may wait for content info
    pub info_timeout: Duration,
    /// Period of the inactivity sweeper
    pub sweep_interval: Duration,
    /// Idle duration after which a session is swept (zero disables sweeping)
    pub max_idle: Duration,
    /// Minimum spacing between two download speed samples
    pub speed_sample_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 2, // each entry holds live network and disk resources
            info_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(300), // 5 minutes
            max_idle: Duration::from_secs(1800),      // 30 minutes
            speed_sample_interval: Duration::from_millis(500),
        }
    }
}

/// Byte-range delivery configuration.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Size of each chunk copied from a session reader to the client
    pub chunk_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512 * 1024, // 512 KiB
        }
    }
}

/// Subtitle extraction configuration.
#[derive(Debug, Clone)]
pub struct SubtitleConfig {
    /// Name or path of the transcoding tool used for extraction
    pub tool: String,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            tool: "ffmpeg".to_string(),
        }
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Upper bound on downloading a metainfo file by URL
    pub fetch_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Base URL the extraction tool uses to read back from this server.
    pub fn loopback_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

/// On-disk layout configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding derived files and the metadata store
    pub download_dir: PathBuf,
    /// Name of the metadata store directory inside the download directory
    pub metadata_dir_name: &'static str,
    /// Temporary file suffix used for atomic metadata writes
    pub temp_file_suffix: &'static str,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("."),
            metadata_dir_name: "metadata",
            temp_file_suffix: ".tmp",
        }
    }
}

impl StorageConfig {
    /// Directory of the durable metadata store.
    pub fn metadata_dir(&self) -> PathBuf {
        self.download_dir.join(self.metadata_dir_name)
    }
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("UNDERTOW_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            config.server.port = port;
        }

        if let Ok(dir) = std::env::var("UNDERTOW_DOWNLOAD_DIR") {
            config.storage.download_dir = PathBuf::from(dir);
        }

        if let Ok(capacity) = std::env::var("UNDERTOW_CACHE_CAPACITY")
            && let Ok(capacity) = capacity.parse::<usize>()
            && capacity > 0
        {
            config.cache.capacity = capacity;
        }

        if let Ok(seconds) = std::env::var("UNDERTOW_CLEANUP_INACTIVE_AFTER")
            && let Ok(seconds) = seconds.parse::<u64>()
        {
            config.cache.max_idle = Duration::from_secs(seconds);
        }

        if let Ok(tool) = std::env::var("UNDERTOW_FFMPEG") {
            config.subtitles.tool = tool;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing(download_dir: PathBuf) -> Self {
        Self {
            cache: CacheConfig {
                info_timeout: Duration::from_millis(200),
                sweep_interval: Duration::from_millis(50),
                ..Default::default()
            },
            storage: StorageConfig {
                download_dir,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Whether the inactivity sweeper should run at all.
    pub fn sweeper_enabled(&self) -> bool {
        !self.cache.max_idle.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = UndertowConfig::default();

        assert_eq!(config.cache.capacity, 2);
        assert_eq!(config.cache.info_timeout, Duration::from_secs(30));
        assert_eq!(config.cache.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.cache.max_idle, Duration::from_secs(1800));
        assert_eq!(config.streaming.chunk_size, 524_288);
        assert_eq!(config.subtitles.tool, "ffmpeg");
        assert_eq!(config.server.port, 3000);
        assert!(config.sweeper_enabled());
    }

    #[test]
    fn test_metadata_dir_layout() {
        let config = UndertowConfig::for_testing(PathBuf::from("/tmp/undertow"));
        assert_eq!(
            config.storage.metadata_dir(),
            PathBuf::from("/tmp/undertow/metadata")
        );
        assert_eq!(config.server.loopback_url(), "http://127.0.0.1:3000");
    }

    #[test]
    fn test_zero_idle_disables_sweeper() {
        let mut config = UndertowConfig::default();
        config.cache.max_idle = Duration::ZERO;
        assert!(!config.sweeper_enabled());
    }
}
