//! In-memory metadata store with failure injection

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use undertow_core::{MetadataError, MetadataStore, SessionKey};

#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: Mutex<HashMap<SessionKey, Vec<u8>>>,
    fail_gets: AtomicBool,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn injected(flag: &AtomicBool, operation: &str) -> Result<(), MetadataError> {
        if flag.load(Ordering::SeqCst) {
            return Err(MetadataError::Unavailable {
                reason: format!("injected {operation} failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<Vec<u8>>, MetadataError> {
        Self::injected(&self.fail_gets, "get")?;
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn put(&self, key: &SessionKey, metadata: &[u8]) -> Result<(), MetadataError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_puts, "put")?;
        self.entries.lock().insert(key.clone(), metadata.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), MetadataError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_deletes, "delete")?;
        self.entries.lock().remove(key);
        Ok(())
    }
}
