//! Digest-derived object keys.

use std::fmt;

use artifact_core::{Digest, DigestError};

/// The object key a digest is stored under: `prefix ++ hex(multihash)`.
///
/// There is no separator between prefix and hash, so identical content
/// always maps to the same key regardless of which submission carried it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn new(prefix: &str, digest: &Digest) -> Self {
        Self(format!("{prefix}{}", digest.encode()))
    }

    /// Recover the digest from a key under `prefix`.
    ///
    /// Returns `None` if the key is not under `prefix`.
    pub fn parse(prefix: &str, key: &str) -> Option<Result<Digest, DigestError>> {
        key.strip_prefix(prefix).map(Digest::decode)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoreKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<StoreKey> for String {
    fn from(key: StoreKey) -> String {
        key.0
    }
}
