//! Content-addressed in-memory store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::store::{ContentId, ContentStore, StoreError, Tag};

/// Stores payloads under the url-safe base64 of their sha256, so
/// repeated uploads of the same bytes land on the same address. Tags
/// are accepted and ignored.
#[derive(Clone, Default)]
pub struct MemoryStore {
    payloads: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    puts: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of uploads performed, deduplicated or not.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Flip one byte of a stored payload. Returns false if the address
    /// is vacant or the index is out of range.
    pub fn corrupt(&self, id: &ContentId, index: usize) -> bool {
        let mut payloads = self.payloads.lock();
        match payloads.get_mut(id.as_str()) {
            Some(bytes) if index < bytes.len() => {
                bytes[index] ^= 0xff;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, bytes: Vec<u8>, _tags: &[Tag]) -> Result<ContentId, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let address = URL_SAFE_NO_PAD.encode(Sha256::digest(&bytes));
        self.payloads.lock().insert(address.clone(), bytes);
        Ok(ContentId::new(address))
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        self.payloads
            .lock()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn addresses_are_content_derived() {
        let store = MemoryStore::new();
        let a = store.put(b"payload".to_vec(), &[]).await.unwrap();
        let b = store.put(b"payload".to_vec(), &[]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.put_count(), 2);
        assert_eq!(store.get(&a).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn vacant_address_reports_not_found() {
        let store = MemoryStore::new();
        let err = store.get(&ContentId::new("missing")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
