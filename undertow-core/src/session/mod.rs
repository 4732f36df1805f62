//! Content sessions and the identifiers used to find them.

pub mod descriptor;
pub mod metainfo;

use std::fmt;
use std::sync::Arc;

pub use descriptor::Descriptor;
pub use metainfo::{Metainfo, MetainfoError};
use serde::Serialize;

use crate::engine::{ContentHandle, EngineError, FileReader};

/// Stable content fingerprint used as the cache key.
///
/// Always stored as lowercase hex so the same content never produces two
/// distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    /// Creates a key from a hex-encoded fingerprint.
    ///
    /// # Errors
    /// - `SessionError::InvalidKey` - Empty input or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, SessionError> {
        if hex_str.is_empty() || hex_str.len() % 2 != 0 {
            return Err(SessionError::InvalidKey {
                key: hex_str.to_string(),
            });
        }
        hex::decode(hex_str).map_err(|_| SessionError::InvalidKey {
            key: hex_str.to_string(),
        })?;
        Ok(Self(hex_str.to_ascii_lowercase()))
    }

    /// Creates a key from raw fingerprint bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file inside a content item. Immutable once content info is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    pub path: String,
    pub size: u64,
}

impl FileDescriptor {
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Last path component, used for response headers.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }

    /// Whether the file is an SRT subtitle that can be converted.
    pub fn is_subtitle(&self) -> bool {
        self.path.to_ascii_lowercase().ends_with(".srt")
    }
}

/// Transfer progress reported by the content engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub bytes_completed: u64,
    pub total_bytes: u64,
    pub peer_count: usize,
    /// Bytes completed per file, in file-list order
    pub files_completed: Vec<u64>,
}

/// A resolved content item with known file layout.
///
/// The file list is captured once, when the engine reports info as known,
/// and never changes afterwards.
pub struct Session {
    key: SessionKey,
    display_name: String,
    files: Vec<FileDescriptor>,
    total_size: u64,
    handle: Arc<dyn ContentHandle>,
}

impl Session {
    /// Snapshots a handle whose info is known into a session.
    pub fn from_handle(handle: Arc<dyn ContentHandle>) -> Self {
        let files = handle.files();
        let total_size = files.iter().map(|file| file.size).sum();
        Self {
            key: handle.key(),
            display_name: handle.display_name(),
            files,
            total_size,
            handle,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn handle(&self) -> &Arc<dyn ContentHandle> {
        &self.handle
    }

    pub fn file(&self, index: usize) -> Option<&FileDescriptor> {
        self.files.get(index)
    }

    /// Picks the requested file, falling back to the largest one.
    ///
    /// Returns `None` only when the session has no files.
    pub fn select_file(&self, index: Option<usize>) -> Option<(usize, &FileDescriptor)> {
        if let Some(index) = index
            && let Some(file) = self.files.get(index)
        {
            return Some((index, file));
        }

        self.files
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, file)| file.size)
    }

    /// Finds a file by its exact path.
    pub fn find_file(&self, path: &str) -> Option<(usize, &FileDescriptor)> {
        self.files
            .iter()
            .enumerate()
            .find(|(_, file)| file.path == path)
    }

    /// Opens a seekable reader over one file.
    ///
    /// # Errors
    /// - `EngineError::FileIndexOutOfRange` - No file at `index`
    /// - `EngineError::Io` - The engine could not open the file
    pub async fn open_reader(&self, index: usize) -> Result<Box<dyn FileReader>, EngineError> {
        self.handle.open_reader(index).await
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.handle.progress()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("files", &self.files.len())
            .field("total_size", &self.total_size)
            .finish()
    }
}

/// Errors raised while interpreting caller-supplied identifiers.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid content descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Invalid session key: {key}")]
    InvalidKey { key: String },

    #[error("Content {key} not found or not active")]
    NotCached { key: SessionKey },
}
