//! # artifact-store: Content-Addressed Object Store
//!
//! The logical contract over an external content-addressed namespace.
//! Every object is stored under a [`StoreKey`] derived from its [`Digest`],
//! so identical content is stored once no matter how many submissions
//! reference it.
//!
//! | Implementation | Existence check | Listing | Writes |
//! |----------------|-----------------|---------|--------|
//! | [`MemoryContentStore`] | map lookup | yes | in memory, counted |
//! | [`FsContentStore`] | file lookup | yes | temp file + rename, streamed from disk |
//! | [`ProbedStore`] | HEAD + `Repr-Digest` | no | delegated |
//!
//! Stores do not skip redundant writes themselves. Deciding what to skip is
//! the caller's job, using [`ContentStore::exists`] or
//! [`ContentStore::list_known_digests`].

pub mod error;
pub mod fs;
pub mod key;
pub mod memory;
pub mod probe;

use std::collections::BTreeSet;
use std::path::Path;

use artifact_core::{Digest, MediaType};
use async_trait::async_trait;
use bytes::Bytes;

pub use error::StoreError;
pub use fs::FsContentStore;
pub use key::StoreKey;
pub use memory::MemoryContentStore;
pub use probe::{ProbedStore, ReprDigestProbe};

/// A content-addressed blob store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Namespace prefix every key of this store starts with.
    fn prefix(&self) -> &str;

    /// The key `digest` is stored under.
    fn key_for(&self, digest: &Digest) -> StoreKey {
        StoreKey::new(self.prefix(), digest)
    }

    /// Whether [`list_known_digests`](Self::list_known_digests) is available.
    fn supports_listing(&self) -> bool {
        true
    }

    /// Whether an object is stored under the key for `digest`.
    async fn exists(&self, digest: &Digest) -> Result<bool, StoreError>;

    /// Every digest stored under `prefix`.
    ///
    /// Keys that do not decode as a multihash are skipped.
    async fn list_known_digests(&self, prefix: &str) -> Result<BTreeSet<Digest>, StoreError>;

    /// Store `data` under the key for `digest`.
    ///
    /// Writing the same digest twice leaves the store unchanged in effect.
    async fn put(
        &self,
        digest: &Digest,
        data: Bytes,
        media_type: Option<&MediaType>,
    ) -> Result<StoreKey, StoreError>;

    /// Store the contents of the local file at `source` under the key for
    /// `digest`.
    ///
    /// The default reads the whole file and calls [`put`](Self::put).
    /// Stores that can stream from disk override it.
    async fn put_file(
        &self,
        digest: &Digest,
        source: &Path,
        media_type: Option<&MediaType>,
    ) -> Result<StoreKey, StoreError> {
        let data = tokio::fs::read(source).await.map_err(|e| StoreError::Write {
            key: self.key_for(digest).to_string(),
            reason: format!("reading {}: {e}", source.display()),
        })?;
        self.put(digest, Bytes::from(data), media_type).await
    }
}

/// Decode listed keys into digests, skipping foreign objects.
pub(crate) fn digests_from_keys<'k>(
    prefix: &str,
    keys: impl IntoIterator<Item = &'k str>,
) -> BTreeSet<Digest> {
    let mut digests = BTreeSet::new();
    for key in keys {
        match StoreKey::parse(prefix, key) {
            Some(Ok(digest)) => {
                digests.insert(digest);
            }
            Some(Err(e)) => tracing::warn!(key, "Skipping object that is not a multihash: {e}"),
            None => {}
        }
    }
    digests
}
