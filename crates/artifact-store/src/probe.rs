//! # Public-URL Existence Probe
//!
//! For stores that expose objects over HTTP but offer no listing API,
//! existence is checked by issuing `HEAD <base>/<key>` with a
//! `Want-Repr-Digest` header and comparing the `Repr-Digest` that comes back.
//!
//! | Response | Result |
//! |----------|--------|
//! | `404` | absent |
//! | `2xx`, matching `Repr-Digest` | present |
//! | `2xx`, missing or different `Repr-Digest` | [`StoreError::ProbeMismatch`] |
//! | anything else | [`StoreError::ProbeStatus`] |
//!
//! Only a definite `404` counts as absent. Every other unexpected answer is
//! an error so that an object is never re-uploaded on a guess.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use artifact_core::{AlgorithmRegistry, Digest, MediaType};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use url::Url;

use crate::{ContentStore, StoreError, StoreKey};

const WANT_REPR_DIGEST: &str = "Want-Repr-Digest";
const REPR_DIGEST: &str = "Repr-Digest";

/// Checks object existence against a public endpoint.
#[derive(Debug, Clone)]
pub struct ReprDigestProbe {
    client: reqwest::Client,
    base: Url,
    prefix: String,
    registry: Arc<AlgorithmRegistry>,
}

impl ReprDigestProbe {
    /// `base` is the public URL that store keys are resolved against.
    pub fn new(
        client: reqwest::Client,
        base: Url,
        prefix: impl Into<String>,
        registry: Arc<AlgorithmRegistry>,
    ) -> Self {
        Self {
            client,
            base: with_trailing_slash(base),
            prefix: prefix.into(),
            registry,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The public URL of the object stored under `key`.
    pub fn url_for(&self, key: &StoreKey) -> Result<Url, StoreError> {
        self.base.join(key.as_str()).map_err(|e| StoreError::InvalidUrl {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Whether the public endpoint serves an object with exactly this digest.
    pub async fn exists(&self, digest: &Digest) -> Result<bool, StoreError> {
        let key = StoreKey::new(&self.prefix, digest);
        let url = self.url_for(&key)?;
        let expected = self.registry.repr_digest(digest)?;
        let want = self.registry.want_repr_digest(digest.code())?;

        tracing::info!("HEAD {url}");
        let response = self
            .client
            .head(url.clone())
            .header(WANT_REPR_DIGEST, want)
            .send()
            .await
            .map_err(|e| StoreError::Http {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(StoreError::ProbeStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let found = response
            .headers()
            .get(REPR_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        match found {
            Some(found) if found == expected => Ok(true),
            found => Err(StoreError::ProbeMismatch {
                key: key.into(),
                expected,
                found: found.map(str::to_string),
            }),
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// A store whose existence checks go through a [`ReprDigestProbe`] while
/// writes go to an inner store.
#[derive(Debug)]
pub struct ProbedStore<S> {
    probe: ReprDigestProbe,
    inner: S,
}

impl<S: ContentStore> ProbedStore<S> {
    pub fn new(probe: ReprDigestProbe, inner: S) -> Self {
        Self { probe, inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: ContentStore> ContentStore for ProbedStore<S> {
    fn prefix(&self) -> &str {
        self.inner.prefix()
    }

    fn supports_listing(&self) -> bool {
        false
    }

    async fn exists(&self, digest: &Digest) -> Result<bool, StoreError> {
        self.probe.exists(digest).await
    }

    async fn list_known_digests(&self, _prefix: &str) -> Result<BTreeSet<Digest>, StoreError> {
        Err(StoreError::ListingUnsupported)
    }

    async fn put(
        &self,
        digest: &Digest,
        data: Bytes,
        media_type: Option<&MediaType>,
    ) -> Result<StoreKey, StoreError> {
        self.inner.put(digest, data, media_type).await
    }

    async fn put_file(
        &self,
        digest: &Digest,
        source: &Path,
        media_type: Option<&MediaType>,
    ) -> Result<StoreKey, StoreError> {
        self.inner.put_file(digest, source, media_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_gets_trailing_slash() {
        let base = with_trailing_slash(Url::parse("https://files.example.org/public").unwrap());
        assert_eq!(base.as_str(), "https://files.example.org/public/");
        let root = with_trailing_slash(Url::parse("https://files.example.org").unwrap());
        assert_eq!(root.as_str(), "https://files.example.org/");
    }

    #[test]
    fn url_for_joins_key() {
        let probe = ReprDigestProbe::new(
            reqwest::Client::new(),
            Url::parse("https://files.example.org/public").unwrap(),
            "artifacts/",
            Arc::new(AlgorithmRegistry::builtin()),
        );
        let digest = Digest::new(artifact_core::AlgorithmCode::SHA2_256, vec![0; 32]);
        let url = probe.url_for(&StoreKey::new(probe.prefix(), &digest)).unwrap();
        assert!(url
            .as_str()
            .starts_with("https://files.example.org/public/artifacts/1220"));
    }
}
