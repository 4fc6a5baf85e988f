//! In-memory content store.
//!
//! Thread-safe via `RwLock`. Counts writes and bytes written so that tests
//! can assert that deduplicated uploads never reach the store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use artifact_core::{Digest, MediaType};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::{digests_from_keys, ContentStore, StoreError, StoreKey};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    media_type: Option<MediaType>,
}

/// A [`ContentStore`] backed by a map.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    prefix: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    writes: AtomicUsize,
    bytes_written: AtomicU64,
}

impl MemoryContentStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Place an object without counting it as a write.
    pub fn seed(&self, digest: &Digest, data: impl Into<Bytes>) {
        let key = self.key_for(digest);
        self.objects.write().insert(
            key.into(),
            StoredObject {
                data: data.into(),
                media_type: None,
            },
        );
    }

    pub fn get(&self, digest: &Digest) -> Option<Bytes> {
        let key = self.key_for(digest);
        self.objects.read().get(key.as_str()).map(|o| o.data.clone())
    }

    pub fn media_type(&self, digest: &Digest) -> Option<MediaType> {
        let key = self.key_for(digest);
        self.objects
            .read()
            .get(key.as_str())
            .and_then(|o| o.media_type.clone())
    }

    /// Number of `put` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Total bytes passed to `put` so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn exists(&self, digest: &Digest) -> Result<bool, StoreError> {
        let key = self.key_for(digest);
        Ok(self.objects.read().contains_key(key.as_str()))
    }

    async fn list_known_digests(&self, prefix: &str) -> Result<BTreeSet<Digest>, StoreError> {
        let objects = self.objects.read();
        Ok(digests_from_keys(prefix, objects.keys().map(String::as_str)))
    }

    async fn put(
        &self,
        digest: &Digest,
        data: Bytes,
        media_type: Option<&MediaType>,
    ) -> Result<StoreKey, StoreError> {
        let key = self.key_for(digest);
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.bytes_written
            .fetch_add(data.len() as u64, Ordering::SeqCst);
        self.objects.write().insert(
            key.as_str().to_string(),
            StoredObject {
                data,
                media_type: media_type.cloned(),
            },
        );
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_core::AlgorithmRegistry;

    #[tokio::test]
    async fn put_then_exists_and_list() {
        let registry = AlgorithmRegistry::builtin();
        let store = MemoryContentStore::new("artifacts/");
        let digest = registry.default_builder().finish();

        assert!(!store.exists(&digest).await.unwrap());
        let media_type = MediaType::new("text/plain").unwrap();
        let key = store
            .put(&digest, Bytes::from_static(b""), Some(&media_type))
            .await
            .unwrap();
        assert!(key.as_str().starts_with("artifacts/1220"));
        assert!(store.exists(&digest).await.unwrap());
        assert_eq!(store.media_type(&digest), Some(media_type));

        let listed = store.list_known_digests("artifacts/").await.unwrap();
        assert_eq!(listed.into_iter().collect::<Vec<_>>(), vec![digest]);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn seeded_objects_are_not_counted() {
        let registry = AlgorithmRegistry::builtin();
        let store = MemoryContentStore::new("p/");
        let digest = registry.digest(registry.default_algorithm().code(), b"hello").unwrap();
        store.seed(&digest, Bytes::from_static(b"hello"));
        assert!(store.exists(&digest).await.unwrap());
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.bytes_written(), 0);
        assert_eq!(store.get(&digest).as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn listing_skips_foreign_keys() {
        let store = MemoryContentStore::new("p/");
        store.objects.write().insert(
            "p/not-a-multihash".to_string(),
            StoredObject {
                data: Bytes::new(),
                media_type: None,
            },
        );
        assert!(store.list_known_digests("p/").await.unwrap().is_empty());
    }
}
