//! Range-aware delivery of session files over HTTP.

pub mod range;
pub mod reader;

pub use range::{ByteRange, parse_range_header};
pub use reader::{StreamResponse, open_stream};

use crate::engine::EngineError;
use crate::session::SessionKey;

/// Errors from the streaming reader.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    #[error("Session {key} has no files")]
    NoFiles { key: SessionKey },

    #[error("No file at index {index}")]
    FileNotFound { index: usize },

    #[error("Range not satisfiable for file of {total_size} bytes")]
    RangeNotSatisfiable { total_size: u64 },

    #[error("Content engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// MIME type for a file name, by extension.
pub fn content_type(file_name: &str) -> &'static str {
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mov") => "video/quicktime",
        Some("m4v") => "video/x-m4v",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("m4a") => "audio/mp4",
        Some("vtt") => "text/vtt; charset=utf-8",
        Some("srt") => "application/x-subrip",
        Some("ass") => "text/x-ssa",
        Some("log") | Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_table() {
        assert_eq!(content_type("Movie.MKV"), "video/x-matroska");
        assert_eq!(content_type("dir/clip.mp4"), "video/mp4");
        assert_eq!(content_type("subs.vtt"), "text/vtt; charset=utf-8");
        assert_eq!(content_type("archive.rar"), "application/octet-stream");
        assert_eq!(content_type("README"), "application/octet-stream");
    }
}
