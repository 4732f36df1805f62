//! Durable mapping from session key to the engine's metadata blob.

pub mod file_store;

use async_trait::async_trait;
pub use file_store::FileMetadataStore;

use crate::session::SessionKey;

/// Key-value store consulted by the warm resolution tier.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Returns `None` when nothing is stored for `key`.
    async fn get(&self, key: &SessionKey) -> Result<Option<Vec<u8>>, MetadataError>;

    async fn put(&self, key: &SessionKey, metadata: &[u8]) -> Result<(), MetadataError>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &SessionKey) -> Result<(), MetadataError>;
}

/// Errors from metadata store backends.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Metadata store I/O failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata store unavailable: {reason}")]
    Unavailable { reason: String },
}
