//! # Filesystem Content Store
//!
//! Objects live at `<root>/<key>`, where a `/` in the key prefix becomes a
//! directory. The media type, when known, is kept in a `<key>.type` sidecar.
//!
//! Writes go to a temp file in the destination directory and are renamed
//! into place, so a reader never sees a partially written object. The
//! sidecar is written before the object: once an object exists, its media
//! type does too.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use artifact_core::{Digest, MediaType};
use async_trait::async_trait;
use bytes::Bytes;

use crate::{digests_from_keys, ContentStore, StoreError, StoreKey};

const MEDIA_TYPE_SUFFIX: &str = ".type";

/// A [`ContentStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
    prefix: String,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the object stored under `key`.
    pub fn object_path(&self, key: &StoreKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// The media type recorded for `digest`, if any.
    pub async fn media_type(&self, digest: &Digest) -> Result<Option<MediaType>, StoreError> {
        let key = self.key_for(digest);
        let sidecar = sidecar_path(&self.object_path(&key));
        match tokio::fs::read_to_string(&sidecar).await {
            Ok(text) => MediaType::new(text.trim()).map(Some).map_err(|e| StoreError::Read {
                key: key.to_string(),
                reason: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Read {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn write_blocking(
        &self,
        digest: &Digest,
        media_type: Option<&MediaType>,
        fill: impl FnOnce(&mut File) -> std::io::Result<()> + Send + 'static,
    ) -> Result<StoreKey, StoreError> {
        let key = self.key_for(digest);
        let path = self.object_path(&key);
        let media_type = media_type.map(|m| m.as_str().to_string());
        let write_error = |reason: String| StoreError::Write {
            key: key.to_string(),
            reason,
        };

        tokio::task::spawn_blocking(move || write_object(&path, media_type.as_deref(), fill))
            .await
            .map_err(|e| write_error(e.to_string()))?
            .map_err(|e| write_error(e.to_string()))?;

        tracing::debug!(key = %key, "Wrote object");
        Ok(key)
    }
}

fn sidecar_path(object: &Path) -> PathBuf {
    let mut name = object.as_os_str().to_owned();
    name.push(MEDIA_TYPE_SUFFIX);
    PathBuf::from(name)
}

/// Fill a temp file in the directory of `dest`, then rename it into place.
fn write_atomic(
    dest: &Path,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    fill(tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Write the media type sidecar, then the object.
fn write_object(
    path: &Path,
    media_type: Option<&str>,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    if let Some(media_type) = media_type {
        write_atomic(&sidecar_path(path), |f| f.write_all(media_type.as_bytes()))?;
    }
    write_atomic(path, fill)
}

/// Every file below `dir`, as `/`-separated paths relative to `root`.
fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            walk(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            let key: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            out.push(key.join("/"));
        }
    }
    Ok(())
}

#[async_trait]
impl ContentStore for FsContentStore {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn exists(&self, digest: &Digest) -> Result<bool, StoreError> {
        let key = self.key_for(digest);
        tokio::fs::try_exists(self.object_path(&key))
            .await
            .map_err(|e| StoreError::Read {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn list_known_digests(&self, prefix: &str) -> Result<BTreeSet<Digest>, StoreError> {
        let root = self.root.clone();
        let listing_error = |reason: String| StoreError::Listing {
            prefix: prefix.to_string(),
            reason,
        };

        let keys = tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            walk(&root, &root, &mut keys).map(|()| keys)
        })
        .await
        .map_err(|e| listing_error(e.to_string()))?
        .map_err(|e| listing_error(e.to_string()))?;

        let objects = keys
            .iter()
            .map(String::as_str)
            .filter(|key| !key.ends_with(MEDIA_TYPE_SUFFIX));
        Ok(digests_from_keys(prefix, objects))
    }

    async fn put(
        &self,
        digest: &Digest,
        data: Bytes,
        media_type: Option<&MediaType>,
    ) -> Result<StoreKey, StoreError> {
        self.write_blocking(digest, media_type, move |f| f.write_all(&data))
            .await
    }

    async fn put_file(
        &self,
        digest: &Digest,
        source: &Path,
        media_type: Option<&MediaType>,
    ) -> Result<StoreKey, StoreError> {
        let source = source.to_path_buf();
        self.write_blocking(digest, media_type, move |f| {
            let mut src = File::open(&source)?;
            std::io::copy(&mut src, f).map(|_| ())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_core::AlgorithmRegistry;

    #[tokio::test]
    async fn put_writes_object_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path(), "artifacts/");
        let registry = AlgorithmRegistry::builtin();
        let digest = registry.digest(registry.default_algorithm().code(), b"scan").unwrap();
        let media_type = MediaType::new("image/png").unwrap();

        assert!(!store.exists(&digest).await.unwrap());
        let key = store
            .put(&digest, Bytes::from_static(b"scan"), Some(&media_type))
            .await
            .unwrap();

        assert!(store.exists(&digest).await.unwrap());
        assert_eq!(std::fs::read(store.object_path(&key)).unwrap(), b"scan");
        assert_eq!(store.media_type(&digest).await.unwrap(), Some(media_type));
    }

    #[tokio::test]
    async fn listing_recovers_digests_and_ignores_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path(), "artifacts/");
        let registry = AlgorithmRegistry::builtin();
        let a = registry.digest(registry.default_algorithm().code(), b"a").unwrap();
        let b = registry.digest(registry.default_algorithm().code(), b"b").unwrap();
        let text = MediaType::new("text/plain").unwrap();
        store.put(&a, Bytes::from_static(b"a"), Some(&text)).await.unwrap();
        store.put(&b, Bytes::from_static(b"b"), None).await.unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), b"x").unwrap();

        let listed = store.list_known_digests("artifacts/").await.unwrap();
        assert_eq!(listed, BTreeSet::from([a, b]));
    }

    #[tokio::test]
    async fn listing_empty_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().join("missing"), "artifacts/");
        assert!(store.list_known_digests("artifacts/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rewriting_same_digest_is_harmless() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path(), "");
        let registry = AlgorithmRegistry::builtin();
        let digest = registry.digest(registry.default_algorithm().code(), b"same").unwrap();
        let first = store.put(&digest, Bytes::from_static(b"same"), None).await.unwrap();
        let second = store.put(&digest, Bytes::from_static(b"same"), None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_known_digests("").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn put_file_copies_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path().join("store"), "artifacts/");
        let registry = AlgorithmRegistry::builtin();
        let digest = registry.digest(registry.default_algorithm().code(), b"archive").unwrap();
        let source = dir.path().join("download");
        std::fs::write(&source, b"archive").unwrap();

        let key = store.put_file(&digest, &source, None).await.unwrap();
        assert_eq!(std::fs::read(store.object_path(&key)).unwrap(), b"archive");
        assert_eq!(store.media_type(&digest).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_sidecar_leaves_no_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsContentStore::new(dir.path(), "artifacts/");
        let registry = AlgorithmRegistry::builtin();
        let digest = registry.digest(registry.default_algorithm().code(), b"scan").unwrap();
        let media_type = MediaType::new("image/png").unwrap();

        // A directory where the sidecar should go makes its rename fail.
        let object = store.object_path(&store.key_for(&digest));
        std::fs::create_dir_all(sidecar_path(&object)).unwrap();

        let result = store
            .put(&digest, Bytes::from_static(b"scan"), Some(&media_type))
            .await;
        assert!(matches!(result, Err(StoreError::Write { .. })));
        assert!(!store.exists(&digest).await.unwrap());
    }
}
