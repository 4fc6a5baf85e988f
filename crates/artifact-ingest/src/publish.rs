//! # Published Artifacts
//!
//! [`Artifact`] is the flattened, consumer-facing form of a complete
//! submission: raw multihash codes are resolved to algorithm names and every
//! file gains its store key and canonical public URL.
//!
//! A [`MetadataPublisher`] receives the whole batch at once, sorted by
//! artifact id, so that an unchanged batch always produces a byte-identical
//! listing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use artifact_core::{AlgorithmRegistry, ArtifactId, Slug};
use artifact_schema::CompleteSubmission;
use artifact_store::StoreKey;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::IngestError;
use crate::retry::RetryPolicy;

/// Version of the published artifact format.
pub const ARTIFACT_FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub name: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Raw digest as lowercase hex.
    pub hash: String,
    pub hash_algorithm: String,
    pub multihash: String,
    pub storage_key: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    pub hidden: bool,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub slug: Slug,
    pub title: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub files: Vec<ArtifactFile>,
    pub links: Vec<ArtifactLink>,
    pub people: Vec<String>,
    pub identities: Vec<String>,
    pub from_year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_year: Option<i32>,
    pub decades: Vec<i32>,
    pub aliases: Vec<Slug>,
}

impl Artifact {
    /// The slug followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &Slug> {
        std::iter::once(&self.slug).chain(self.aliases.iter())
    }
}

/// The whole published batch, as written by [`JsonListingPublisher`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactListing {
    pub version: u32,
    pub artifacts: Vec<Artifact>,
    /// Every slug and alias, mapped to the id of the artifact it names.
    pub slugs: BTreeMap<String, ArtifactId>,
}

impl ArtifactListing {
    /// Build a listing from artifacts, sorting them by id.
    pub fn new(mut artifacts: Vec<Artifact>) -> Self {
        sort_artifacts(&mut artifacts);
        let slugs = artifacts
            .iter()
            .flat_map(|a| a.names().map(move |name| (name.to_string(), a.id.clone())))
            .collect();
        Self {
            version: ARTIFACT_FORMAT_VERSION,
            artifacts,
            slugs,
        }
    }

    /// Read a previously written listing.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let listing_error = |reason: String| IngestError::Listing {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| listing_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| listing_error(e.to_string()))
    }
}

/// Sort by id with plain byte-wise comparison, independent of locale.
pub fn sort_artifacts(artifacts: &mut [Artifact]) {
    artifacts.sort_by(|a, b| a.id.as_str().as_bytes().cmp(b.id.as_str().as_bytes()));
}

/// Where published files live.
#[derive(Debug, Clone)]
pub struct Projection<'a> {
    pub registry: &'a AlgorithmRegistry,
    pub store_prefix: &'a str,
    /// Base of canonical file URLs: `<base_url>/artifacts/<slug>/<filename>`.
    pub base_url: &'a Url,
}

impl Projection<'_> {
    /// Project a complete submission into its published form.
    pub fn project(&self, submission: &CompleteSubmission) -> Result<Artifact, IngestError> {
        let mut files = Vec::with_capacity(submission.files.len());
        for file in &submission.files {
            let url = Url::parse(&format!(
                "{}/artifacts/{}/{}",
                self.base_url.as_str().trim_end_matches('/'),
                submission.slug,
                file.filename
            ))
            .map_err(|e| IngestError::Publish {
                target: self.base_url.to_string(),
                reason: format!("cannot build URL for {}/{}: {e}", submission.slug, file.filename),
            })?;
            files.push(ArtifactFile {
                name: file.name.clone(),
                filename: file.filename.to_string(),
                media_type: file.media_type.as_ref().map(ToString::to_string),
                hash: file.digest.hash_hex(),
                hash_algorithm: self.registry.algorithm_name(file.digest.code())?.to_string(),
                multihash: file.digest.encode(),
                storage_key: StoreKey::new(self.store_prefix, &file.digest).into(),
                url: url.to_string(),
                lang: file.language_tag.as_ref().map(ToString::to_string),
                hidden: file.hidden,
                aliases: file.aliases.iter().map(ToString::to_string).collect(),
            });
        }

        Ok(Artifact {
            id: submission.id.clone(),
            slug: submission.slug.clone(),
            title: submission.title.clone(),
            summary: submission.summary.clone(),
            description: submission.description.clone(),
            files,
            links: submission
                .links
                .iter()
                .map(|l| ArtifactLink {
                    name: l.name.clone(),
                    url: l.url.to_string(),
                })
                .collect(),
            people: submission.people.clone(),
            identities: submission.identities.clone(),
            from_year: submission.from_year,
            to_year: submission.to_year,
            decades: submission.decades.clone(),
            aliases: submission.aliases.clone(),
        })
    }
}

/// Receives the published batch.
#[async_trait]
pub trait MetadataPublisher: Send + Sync {
    /// Publish every artifact of the run. `artifacts` is sorted by id.
    async fn publish(&self, artifacts: &[Artifact]) -> Result<(), IngestError>;
}

/// Writes the batch as one JSON listing file, atomically.
#[derive(Debug, Clone)]
pub struct JsonListingPublisher {
    path: PathBuf,
}

impl JsonListingPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetadataPublisher for JsonListingPublisher {
    async fn publish(&self, artifacts: &[Artifact]) -> Result<(), IngestError> {
        let listing = ArtifactListing::new(artifacts.to_vec());
        let mut json = serde_json::to_vec_pretty(&listing).map_err(|e| IngestError::Publish {
            target: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        json.push(b'\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))?
            .map_err(|e| IngestError::io(format!("writing {}", self.path.display()), e))?;

        tracing::info!(
            path = %self.path.display(),
            count = artifacts.len(),
            "Wrote artifact listing"
        );
        Ok(())
    }
}

fn write_atomic(dest: &Path, data: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let dir = match dest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

const PUBLISH_USER: &str = "artifact-submit";

/// Posts each artifact as JSON to `<endpoint>/submit` with basic auth.
#[derive(Clone)]
pub struct HttpMetadataPublisher {
    client: reqwest::Client,
    endpoint: Url,
    secret: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for HttpMetadataPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMetadataPublisher")
            .field("endpoint", &self.endpoint)
            .field("secret", &"[REDACTED]")
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpMetadataPublisher {
    pub fn new(client: reqwest::Client, endpoint: Url, secret: impl Into<String>) -> Self {
        Self {
            client,
            endpoint,
            secret: secret.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl MetadataPublisher for HttpMetadataPublisher {
    async fn publish(&self, artifacts: &[Artifact]) -> Result<(), IngestError> {
        let submit = format!("{}/submit", self.endpoint.as_str().trim_end_matches('/'));
        let url = Url::parse(&submit).map_err(|e| IngestError::Publish {
            target: self.endpoint.to_string(),
            reason: e.to_string(),
        })?;

        for artifact in artifacts {
            tracing::info!(slug = %artifact.slug, "Uploading metadata for artifact");
            let response = self
                .retry
                .send(&format!("POST {url}"), || {
                    self.client
                        .post(url.clone())
                        .basic_auth(PUBLISH_USER, Some(&self.secret))
                        .json(artifact)
                        .send()
                })
                .await
                .map_err(|e| IngestError::Network {
                    url: url.to_string(),
                    source: e,
                })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(IngestError::Publish {
                    target: url.to_string(),
                    reason: format!("metadata for {} returned {status}: {body}", artifact.slug),
                });
            }
        }
        Ok(())
    }
}

/// Keeps every published batch in memory.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    batches: Mutex<Vec<Vec<Artifact>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently published batch.
    pub fn last(&self) -> Option<Vec<Artifact>> {
        self.batches.lock().last().cloned()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }
}

#[async_trait]
impl MetadataPublisher for MemoryPublisher {
    async fn publish(&self, artifacts: &[Artifact]) -> Result<(), IngestError> {
        self.batches.lock().push(artifacts.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_core::{AlgorithmCode, Digest, FileName};
    use artifact_schema::CompleteFile;

    fn complete(id: &str, slug: &str) -> CompleteSubmission {
        CompleteSubmission {
            version: 1,
            id: ArtifactId::new(id).unwrap(),
            slug: Slug::new(slug).unwrap(),
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            description: None,
            files: vec![CompleteFile {
                name: "Scan".to_string(),
                filename: FileName::new("scans/page-01.png").unwrap(),
                media_type: None,
                digest: Digest::new(AlgorithmCode::SHA2_256, vec![0xab; 32]),
                source_url: Url::parse("https://example.com/page.png").unwrap(),
                language_tag: None,
                hidden: false,
                aliases: vec![],
            }],
            links: vec![],
            people: vec![],
            identities: vec![],
            from_year: 1990,
            to_year: None,
            decades: vec![1990],
            aliases: vec![Slug::new("old-artifact-slug").unwrap()],
        }
    }

    #[test]
    fn projection_resolves_store_fields() {
        let registry = AlgorithmRegistry::builtin();
        let base_url = Url::parse("https://files.example.org/").unwrap();
        let projection = Projection {
            registry: &registry,
            store_prefix: "artifacts/",
            base_url: &base_url,
        };
        let artifact = projection.project(&complete("aaaaaaaaaaaa", "some-artifact-slug")).unwrap();
        let file = &artifact.files[0];
        assert_eq!(file.hash, "ab".repeat(32));
        assert_eq!(file.hash_algorithm, "sha2-256");
        assert_eq!(file.multihash, format!("1220{}", "ab".repeat(32)));
        assert_eq!(file.storage_key, format!("artifacts/1220{}", "ab".repeat(32)));
        assert_eq!(
            file.url,
            "https://files.example.org/artifacts/some-artifact-slug/scans/page-01.png"
        );
    }

    #[test]
    fn sort_is_bytewise() {
        let registry = AlgorithmRegistry::builtin();
        let base_url = Url::parse("https://files.example.org/").unwrap();
        let projection = Projection {
            registry: &registry,
            store_prefix: "",
            base_url: &base_url,
        };
        let mut artifacts = vec![
            projection.project(&complete("bbbbbbbbbbbb", "second-artifact-slug")).unwrap(),
            projection.project(&complete("aaaaaaaaaaaa", "first-artifact-slug")).unwrap(),
            projection.project(&complete("ZZZZZZZZZZZZ", "third-artifact-slug")).unwrap(),
        ];
        sort_artifacts(&mut artifacts);
        let ids: Vec<_> = artifacts.iter().map(|a| a.id.as_str()).collect();
        // Uppercase sorts before lowercase byte-wise.
        assert_eq!(ids, vec!["ZZZZZZZZZZZZ", "aaaaaaaaaaaa", "bbbbbbbbbbbb"]);
    }

    #[tokio::test]
    async fn listing_is_written_and_indexes_aliases() {
        let registry = AlgorithmRegistry::builtin();
        let base_url = Url::parse("https://files.example.org/").unwrap();
        let projection = Projection {
            registry: &registry,
            store_prefix: "artifacts/",
            base_url: &base_url,
        };
        let artifact = projection.project(&complete("aaaaaaaaaaaa", "some-artifact-slug")).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let publisher = JsonListingPublisher::new(dir.path().join("listing.json"));
        publisher.publish(&[artifact.clone()]).await.unwrap();

        let listing = ArtifactListing::load(publisher.path()).unwrap();
        assert_eq!(listing.version, ARTIFACT_FORMAT_VERSION);
        assert_eq!(listing.artifacts, vec![artifact]);
        assert_eq!(listing.slugs["old-artifact-slug"].as_str(), "aaaaaaaaaaaa");
        assert_eq!(listing.slugs["some-artifact-slug"].as_str(), "aaaaaaaaaaaa");
    }
}
