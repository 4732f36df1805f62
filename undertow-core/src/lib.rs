//! Undertow Core - session lifecycle, range streaming and subtitle pipeline
//!
//! This crate keeps a small working set of content sessions resolved through
//! an external content engine, serves their files as seekable byte ranges and
//! derives subtitle artifacts whose lifetime is tied to the owning session.

pub mod cache;
pub mod config;
pub mod engine;
pub mod metadata;
pub mod service;
pub mod session;
pub mod status;
pub mod streaming;
pub mod subtitles;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use cache::{CacheEntry, InactivitySweeper, ResolveError, SessionCache, SessionResolver};
pub use config::UndertowConfig;
pub use engine::{ContentEngine, ContentHandle, EngineError, FileReader};
pub use metadata::{FileMetadataStore, MetadataError, MetadataStore};
pub use service::MediaService;
pub use session::{
    Descriptor, FileDescriptor, Metainfo, MetainfoError, ProgressSnapshot, Session, SessionError,
    SessionKey,
};
pub use streaming::{StreamResponse, StreamingError};
pub use subtitles::{JobState, JobStatus, SubtitleError, SubtitlePipeline};

/// Core errors that can bubble up from any Undertow subsystem.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    #[error("Metainfo error: {0}")]
    Metainfo(#[from] MetainfoError),

    #[error("Metadata store error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used by the HTTP surface to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed descriptor, missing parameter or unsafe name.
    InvalidInput,
    /// Unknown file, artifact or uncached session.
    NotFound,
    /// Cold-path resolution exceeded its bound.
    Timeout,
    /// Requested range lies outside the file.
    RangeNotSatisfiable,
    /// External tool needed by the call is missing.
    ToolUnavailable,
    /// The process is shutting down.
    ShuttingDown,
    /// A remote server answered a fetch with this non-success status.
    Upstream { status: u16 },
    /// Anything else.
    Internal,
}

impl UndertowError {
    /// Classifies the error for boundary translation.
    pub fn category(&self) -> ErrorCategory {
        match self {
            UndertowError::Session(e) => match e {
                SessionError::NotCached { .. } => ErrorCategory::NotFound,
                SessionError::InvalidDescriptor { .. } | SessionError::InvalidKey { .. } => {
                    ErrorCategory::InvalidInput
                }
            },
            UndertowError::Resolve(e) => match e {
                ResolveError::Timeout { .. } => ErrorCategory::Timeout,
                ResolveError::Cancelled { .. } => ErrorCategory::ShuttingDown,
                ResolveError::Engine { .. } => ErrorCategory::Internal,
            },
            UndertowError::Streaming(e) => match e {
                StreamingError::NoFiles { .. } | StreamingError::FileNotFound { .. } => {
                    ErrorCategory::NotFound
                }
                StreamingError::RangeNotSatisfiable { .. } => ErrorCategory::RangeNotSatisfiable,
                StreamingError::Engine(_) | StreamingError::Io(_) => ErrorCategory::Internal,
            },
            UndertowError::Subtitle(e) => match e {
                SubtitleError::SourceNotFound { .. }
                | SubtitleError::ArtifactNotFound { .. }
                | SubtitleError::FileIndexOutOfRange { .. } => ErrorCategory::NotFound,
                SubtitleError::InvalidArtifactName { .. } => ErrorCategory::InvalidInput,
                SubtitleError::ToolUnavailable { .. } => ErrorCategory::ToolUnavailable,
                SubtitleError::Engine(_) | SubtitleError::Io { .. } => ErrorCategory::Internal,
            },
            UndertowError::Metainfo(e) => match e {
                MetainfoError::Invalid { .. } => ErrorCategory::InvalidInput,
                MetainfoError::UpstreamStatus { status, .. } => ErrorCategory::Upstream {
                    status: *status,
                },
                MetainfoError::Fetch { .. } => ErrorCategory::Internal,
            },
            UndertowError::Metadata(_)
            | UndertowError::Configuration { .. }
            | UndertowError::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Checks if this error is due to caller input rather than a server fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::InvalidInput | ErrorCategory::NotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_error_categories() {
        let invalid = UndertowError::from(SessionError::InvalidDescriptor {
            reason: "not a magnet".to_string(),
        });
        assert_eq!(invalid.category(), ErrorCategory::InvalidInput);
        assert!(invalid.is_user_error());

        let key = SessionKey::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
        let timeout = UndertowError::from(ResolveError::Timeout {
            key,
            after: Duration::from_secs(30),
        });
        assert_eq!(timeout.category(), ErrorCategory::Timeout);
        assert!(!timeout.is_user_error());

        let missing = UndertowError::from(SubtitleError::ArtifactNotFound {
            key: "abc.vtt".to_string(),
        });
        assert_eq!(missing.category(), ErrorCategory::NotFound);
    }
}
