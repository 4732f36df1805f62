//! Content items served by the simulated engine

use std::path::PathBuf;

use bytes::Bytes;
use sha1::{Digest, Sha1};
use undertow_core::{FileDescriptor, SessionKey};

/// Where a simulated file's bytes come from.
#[derive(Debug, Clone)]
pub enum ContentSource {
    Memory(Bytes),
    Disk { path: PathBuf, size: u64 },
}

impl ContentSource {
    pub fn size(&self) -> u64 {
        match self {
            ContentSource::Memory(data) => data.len() as u64,
            ContentSource::Disk { size, .. } => *size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedFile {
    pub path: String,
    pub source: ContentSource,
}

/// A content item with a deterministic key derived from its name.
#[derive(Debug, Clone)]
pub struct SimulatedContent {
    pub key: SessionKey,
    pub name: String,
    pub files: Vec<SimulatedFile>,
}

impl SimulatedContent {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: generate_key(&name),
            name,
            files: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: SessionKey) -> Self {
        self.key = key;
        self
    }

    pub fn with_memory_file(mut self, path: impl Into<String>, data: Bytes) -> Self {
        self.files.push(SimulatedFile {
            path: path.into(),
            source: ContentSource::Memory(data),
        });
        self
    }

    pub fn with_disk_file(mut self, path: impl Into<String>, disk_path: PathBuf, size: u64) -> Self {
        self.files.push(SimulatedFile {
            path: path.into(),
            source: ContentSource::Disk {
                path: disk_path,
                size,
            },
        });
        self
    }

    pub fn descriptors(&self) -> Vec<FileDescriptor> {
        self.files
            .iter()
            .map(|file| FileDescriptor::new(file.path.clone(), file.source.size()))
            .collect()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.source.size()).sum()
    }

    /// Magnet URI that resolves to this content.
    pub fn magnet_link(&self) -> String {
        format!(
            "magnet:?xt=urn:btih:{}&dn={}&tr=udp://tracker.example.com:8080/announce",
            self.key,
            urlencoding::encode(&self.name)
        )
    }
}

/// Deterministic 20-byte key for a content name.
pub fn generate_key(name: &str) -> SessionKey {
    let mut hasher = Sha1::new();
    hasher.update(name.as_bytes());
    SessionKey::from_bytes(&hasher.finalize())
}
