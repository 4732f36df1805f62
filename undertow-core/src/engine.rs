//! Content engine abstraction.
//!
//! The engine owns the transfer protocol. Undertow only needs to turn a
//! descriptor into a handle, wait until the handle knows its file layout,
//! read files at arbitrary offsets and tear the handle down again.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek};

use crate::session::{Descriptor, FileDescriptor, ProgressSnapshot, SessionKey};

/// Seekable async reader over one file of a content item.
pub trait FileReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> FileReader for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

/// Live handle to a content item inside the engine.
#[async_trait]
pub trait ContentHandle: Send + Sync {
    fn key(&self) -> SessionKey;

    /// Completes once the file list is known. Never completes for content
    /// the engine cannot locate; callers bound the wait themselves.
    async fn wait_info(&self);

    fn display_name(&self) -> String;

    /// File layout. Only meaningful after `wait_info` completed.
    fn files(&self) -> Vec<FileDescriptor>;

    /// Opens a reader that blocks on data the engine has not fetched yet.
    async fn open_reader(&self, file_index: usize) -> Result<Box<dyn FileReader>, EngineError>;

    fn progress(&self) -> ProgressSnapshot;

    /// Opaque blob that lets `ContentEngine::rehydrate` rebuild this handle
    /// without a network round trip.
    fn serialize_metadata(&self) -> Result<Vec<u8>, EngineError>;
}

/// Resolves descriptors into handles and releases them.
#[async_trait]
pub trait ContentEngine: Send + Sync {
    /// Starts resolving a descriptor. Returns immediately; info arrives later.
    async fn resolve_descriptor(
        &self,
        descriptor: &Descriptor,
    ) -> Result<Arc<dyn ContentHandle>, EngineError>;

    /// Rebuilds a handle from persisted metadata. Info is known on return.
    async fn rehydrate(&self, metadata: &[u8]) -> Result<Arc<dyn ContentHandle>, EngineError>;

    /// Drops the engine's resources for a handle. Runs inside eviction
    /// callbacks, so it must not block on I/O.
    fn release(&self, handle: &Arc<dyn ContentHandle>);
}

/// Errors reported by content engine implementations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine rejected descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    #[error("Invalid persisted metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("File index {index} out of range ({file_count} files)")]
    FileIndexOutOfRange { index: usize, file_count: usize },

    #[error("Engine unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
