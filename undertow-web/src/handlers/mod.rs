//! HTTP request handlers organized by functionality

pub mod content;
pub mod error;
pub mod metainfo;
pub mod streaming;
pub mod subtitles;

pub use content::{files, metadata, status};
pub use error::ApiError;
pub use metainfo::{fetch_torrent_url, upload_torrent};
pub use streaming::stream;
pub use subtitles::{
    download_subtitle, extract_subtitles, extraction_status, serve_artifact, stream_vtt,
};

/// Returns a required query parameter or a 400.
pub(crate) fn required<'a>(
    value: &'a Option<String>,
    name: &'static str,
) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingParameter { name })
}

/// Parses an optional file index, treating unparsable input as absent.
pub(crate) fn lenient_index(value: &Option<String>) -> Option<usize> {
    value.as_deref().and_then(|value| value.parse().ok())
}
