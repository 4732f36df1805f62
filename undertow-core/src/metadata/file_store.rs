//! One-file-per-key metadata store

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{MetadataError, MetadataStore};
use crate::session::SessionKey;

const METADATA_EXTENSION: &str = "meta";

/// Stores each blob at `<dir>/<key>.meta`, written through a temporary file
/// and a rename so readers never observe a partial blob.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    dir: PathBuf,
    temp_suffix: String,
}

impl FileMetadataStore {
    /// Opens the store, creating its directory when missing.
    ///
    /// # Errors
    /// - `MetadataError::Io` - Directory could not be created
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, MetadataError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| MetadataError::Io {
                key: dir.display().to_string(),
                source,
            })?;

        Ok(Self {
            dir,
            temp_suffix: ".tmp".to_string(),
        })
    }

    /// Overrides the temporary file suffix used for atomic writes.
    pub fn with_temp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.temp_suffix = suffix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{key}.{METADATA_EXTENSION}"))
    }

    fn io_error(key: &SessionKey) -> impl FnOnce(std::io::Error) -> MetadataError + '_ {
        move |source| MetadataError::Io {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<Vec<u8>>, MetadataError> {
        match fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error(key)(e)),
        }
    }

    async fn put(&self, key: &SessionKey, metadata: &[u8]) -> Result<(), MetadataError> {
        let path = self.entry_path(key);
        let temp_path = self
            .dir
            .join(format!("{key}.{METADATA_EXTENSION}{}", self.temp_suffix));

        fs::write(&temp_path, metadata)
            .await
            .map_err(Self::io_error(key))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(Self::io_error(key))?;

        tracing::debug!("Persisted metadata for {} ({} bytes)", key, metadata.len());
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), MetadataError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error(key)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn key() -> SessionKey {
        SessionKey::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMetadataStore::open(temp_dir.path().join("metadata"))
            .await
            .unwrap();

        assert!(store.get(&key()).await.unwrap().is_none());

        store.put(&key(), b"blob").await.unwrap();
        assert_eq!(store.get(&key()).await.unwrap().as_deref(), Some(&b"blob"[..]));
        assert!(
            temp_dir
                .path()
                .join("metadata/0123456789abcdef0123456789abcdef01234567.meta")
                .exists()
        );

        store.delete(&key()).await.unwrap();
        assert!(store.get(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMetadataStore::open(temp_dir.path()).await.unwrap();

        store.put(&key(), b"first").await.unwrap();
        store.put(&key(), b"second").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".meta"));
        assert_eq!(store.get(&key()).await.unwrap().unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileMetadataStore::open(temp_dir.path()).await.unwrap();
        assert!(store.delete(&key()).await.is_ok());
    }
}
