//! Derived-file naming, registry and per-session cleanup

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::SubtitleError;
use crate::session::SessionKey;

/// Output and log locations of one extraction job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPaths {
    pub output_name: String,
    pub output_path: PathBuf,
    pub log_name: String,
    pub log_path: PathBuf,
}

/// Derived files of all sessions, stored flat in one directory.
///
/// Every name starts with `<session key>_`, which is what per-session
/// cleanup matches on.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
    registered: Mutex<HashMap<String, PathBuf>>,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            registered: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<key>_<sha256(key + source_path)>.vtt`
    pub fn converted_name(key: &SessionKey, source_path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        hasher.update(source_path.as_bytes());
        format!("{}_{}.vtt", key, hex::encode(hasher.finalize()))
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn extraction_paths(&self, key: &SessionKey, file_index: usize) -> ExtractionPaths {
        let output_name = format!("{key}_{file_index}.ass");
        let log_name = format!("{key}_{file_index}.log");
        ExtractionPaths {
            output_path: self.dir.join(&output_name),
            log_path: self.dir.join(&log_name),
            output_name,
            log_name,
        }
    }

    /// Records a converted artifact so it can be fetched by key.
    pub fn register(&self, name: String, path: PathBuf) {
        self.registered.lock().insert(name, path);
    }

    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        self.registered.lock().get(name).cloned()
    }

    /// Resolves a caller-supplied file name to a path inside the directory.
    ///
    /// # Errors
    /// - `SubtitleError::InvalidArtifactName` - Empty, contains a separator or `..`
    /// - `SubtitleError::ArtifactNotFound` - No such file
    pub fn resolve_by_name(&self, name: &str) -> Result<PathBuf, SubtitleError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(SubtitleError::InvalidArtifactName {
                name: name.to_string(),
            });
        }

        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(SubtitleError::ArtifactNotFound {
                key: name.to_string(),
            });
        }
        Ok(path)
    }

    /// Deletes every registered and on-disk artifact of a session.
    ///
    /// Runs inside eviction callbacks, so it stays synchronous. Failures are
    /// logged and skipped. Returns the number of files removed.
    pub fn cleanup_session(&self, key: &SessionKey) -> usize {
        let prefix = format!("{key}_");
        let mut removed = 0;

        let registered: Vec<PathBuf> = {
            let mut registered = self.registered.lock();
            let names: Vec<String> = registered
                .keys()
                .filter(|name| name.starts_with(&prefix))
                .cloned()
                .collect();
            names
                .iter()
                .filter_map(|name| registered.remove(name))
                .collect()
        };

        for path in registered {
            removed += remove_logged(&path);
        }

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot scan {} for artifacts: {}", self.dir.display(), e);
                return removed;
            }
        };

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name.starts_with(&prefix) && (name.ends_with(".ass") || name.ends_with(".log")) {
                removed += remove_logged(&entry.path());
            }
        }

        removed
    }
}

fn remove_logged(path: &Path) -> usize {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Deleted derived file {}", path.display());
            1
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
        Err(e) => {
            tracing::warn!("Failed to delete derived file {}: {}", path.display(), e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn key(n: u8) -> SessionKey {
        SessionKey::from_bytes(&[n; 20])
    }

    #[test]
    fn test_converted_name_is_deterministic() {
        let a = ArtifactStore::converted_name(&key(1), "Show/ep1.srt");
        let b = ArtifactStore::converted_name(&key(1), "Show/ep1.srt");
        let c = ArtifactStore::converted_name(&key(1), "Show/ep2.srt");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(&format!("{}_", key(1))));
        assert!(a.ends_with(".vtt"));
        // 40 hex key + '_' + 64 hex digest + ".vtt"
        assert_eq!(a.len(), 40 + 1 + 64 + 4);
    }

    #[test]
    fn test_extraction_paths_are_positional() {
        let store = ArtifactStore::new("/data");
        let paths = store.extraction_paths(&key(2), 3);
        assert_eq!(paths.output_name, format!("{}_3.ass", key(2)));
        assert_eq!(paths.log_path, PathBuf::from(format!("/data/{}_3.log", key(2))));
    }

    #[test]
    fn test_resolve_by_name_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());

        for name in ["", "../secret", "a/b.log", "a\\b.log", ".."] {
            assert!(matches!(
                store.resolve_by_name(name),
                Err(SubtitleError::InvalidArtifactName { .. })
            ));
        }
        assert!(matches!(
            store.resolve_by_name("missing.log"),
            Err(SubtitleError::ArtifactNotFound { .. })
        ));

        std::fs::write(temp_dir.path().join("present.log"), b"x").unwrap();
        assert!(store.resolve_by_name("present.log").is_ok());
    }

    #[test]
    fn test_cleanup_only_touches_own_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp_dir.path());

        let own_vtt = ArtifactStore::converted_name(&key(1), "a.srt");
        let other_vtt = ArtifactStore::converted_name(&key(2), "a.srt");
        for name in [&own_vtt, &other_vtt] {
            let path = store.path_of(name);
            std::fs::write(&path, b"WEBVTT\n\n").unwrap();
            store.register(name.clone(), path);
        }
        let own = store.extraction_paths(&key(1), 0);
        let other = store.extraction_paths(&key(2), 0);
        for path in [&own.output_path, &own.log_path, &other.output_path, &other.log_path] {
            std::fs::write(path, b"data").unwrap();
        }

        let removed = store.cleanup_session(&key(1));

        assert_eq!(removed, 3);
        assert!(store.lookup(&own_vtt).is_none());
        assert!(!store.path_of(&own_vtt).exists());
        assert!(!own.output_path.exists());
        assert!(!own.log_path.exists());

        assert!(store.lookup(&other_vtt).is_some());
        assert!(store.path_of(&other_vtt).exists());
        assert!(other.output_path.exists());
        assert!(other.log_path.exists());
    }
}
