//! # Submission Completion
//!
//! Fills in the generated fields of a batch: each submission's `id`, and
//! each file's digest and media type.
//!
//! Source details are memoized per `source_url` across the whole batch, so
//! a URL shared by several files (in one submission or many) is fetched at
//! most once. Distinct URLs are resolved by a bounded pool of workers that
//! write into one shared map; the pool is joined before anything is applied
//! back onto the submissions.
//!
//! Any failure aborts the whole batch. Nothing is applied on error.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use artifact_core::{AlgorithmRegistry, ArtifactId, Digest, FileName, MediaType, Slug};
use artifact_schema::ArtifactSubmission;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::authority::{IdentifierAuthority, NoHistory};
use crate::error::IngestError;
use crate::fetch::Fetcher;

/// What is known about one source URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SourceDetails {
    digest: Option<Digest>,
    media_type: Option<MediaType>,
}

/// What has to be asked of the network for one source URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// Download and hash the body.
    Fetch,
    /// Only the declared media type is missing.
    Head,
}

/// What changed during completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionReport {
    /// Files whose digest or media type was filled in, per submission.
    pub files_updated: BTreeMap<Slug, Vec<FileName>>,
    /// Submissions that were given a freshly generated id.
    pub ids_assigned: Vec<Slug>,
    /// Submissions that were given an id recorded by the authority.
    pub ids_reused: Vec<Slug>,
    pub urls_fetched: usize,
    pub urls_probed: usize,
}

impl CompletionReport {
    /// Submissions with at least one changed field.
    pub fn artifacts_updated(&self) -> usize {
        self.files_updated
            .keys()
            .chain(&self.ids_assigned)
            .chain(&self.ids_reused)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn total_files_updated(&self) -> usize {
        self.files_updated.values().map(Vec::len).sum()
    }

    pub fn is_unchanged(&self) -> bool {
        self.artifacts_updated() == 0
    }
}

/// A completed batch.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The input submissions, in input order, with generated fields filled.
    pub submissions: Vec<ArtifactSubmission>,
    pub report: CompletionReport,
}

/// Derives missing ids, digests and media types for a batch.
#[derive(Clone)]
pub struct SubmissionCompleter {
    fetcher: Arc<dyn Fetcher>,
    registry: Arc<AlgorithmRegistry>,
    authority: Arc<dyn IdentifierAuthority>,
    concurrency: usize,
}

impl std::fmt::Debug for SubmissionCompleter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionCompleter")
            .field("registry", &self.registry)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl SubmissionCompleter {
    pub fn new(fetcher: Arc<dyn Fetcher>, registry: Arc<AlgorithmRegistry>) -> Self {
        Self {
            fetcher,
            registry,
            authority: Arc::new(NoHistory),
            concurrency: 4,
        }
    }

    pub fn with_authority(mut self, authority: Arc<dyn IdentifierAuthority>) -> Self {
        self.authority = authority;
        self
    }

    /// Maximum number of source URLs resolved at once. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Complete every submission of the batch.
    pub async fn complete(
        &self,
        mut submissions: Vec<ArtifactSubmission>,
    ) -> Result<Completion, IngestError> {
        let (mut memo, lookups) = self.plan(&submissions)?;
        let mut report = CompletionReport {
            urls_fetched: lookups.values().filter(|l| **l == Lookup::Fetch).count(),
            urls_probed: lookups.values().filter(|l| **l == Lookup::Head).count(),
            ..CompletionReport::default()
        };

        if !lookups.is_empty() {
            tracing::info!(
                fetch = report.urls_fetched,
                head = report.urls_probed,
                "Resolving source URLs"
            );
        }
        for (url, resolved) in self.resolve(lookups).await? {
            let entry = memo.entry(url).or_default();
            if entry.digest.is_none() {
                entry.digest = resolved.digest;
            }
            if entry.media_type.is_none() {
                entry.media_type = resolved.media_type;
            }
        }

        for submission in &mut submissions {
            let updated = apply(submission, &memo);
            if !updated.is_empty() {
                report.files_updated.insert(submission.slug.clone(), updated);
            }
        }
        self.assign_ids(&mut submissions, &mut report)?;

        tracing::info!(
            artifacts = report.artifacts_updated(),
            files = report.total_files_updated(),
            "Completed submissions"
        );
        Ok(Completion { submissions, report })
    }

    /// Give every submission without an id either the id recorded for one
    /// of its names, or a fresh one. No two submissions may end up sharing
    /// an id.
    fn assign_ids(
        &self,
        submissions: &mut [ArtifactSubmission],
        report: &mut CompletionReport,
    ) -> Result<(), IngestError> {
        let mut held: BTreeMap<ArtifactId, Slug> = BTreeMap::new();
        for submission in submissions.iter() {
            if let Some(id) = &submission.id {
                claim(&mut held, id, &submission.slug)?;
            }
        }

        for submission in submissions.iter_mut().filter(|s| s.id.is_none()) {
            let id = match self.authority.existing_id(&submission.slug, &submission.aliases) {
                Some(id) => {
                    tracing::info!(slug = %submission.slug, %id, "Reusing recorded artifact id");
                    report.ids_reused.push(submission.slug.clone());
                    id
                }
                None => {
                    let mut id = ArtifactId::random();
                    while held.contains_key(&id) {
                        id = ArtifactId::random();
                    }
                    tracing::debug!(slug = %submission.slug, %id, "Generated artifact id");
                    report.ids_assigned.push(submission.slug.clone());
                    id
                }
            };
            claim(&mut held, &id, &submission.slug)?;
            submission.id = Some(id);
        }
        Ok(())
    }

    /// Seed the memo with what the batch already declares, and work out
    /// which URLs still need a network round trip.
    fn plan(
        &self,
        submissions: &[ArtifactSubmission],
    ) -> Result<(BTreeMap<Url, SourceDetails>, BTreeMap<Url, Lookup>), IngestError> {
        let mut memo: BTreeMap<Url, SourceDetails> = BTreeMap::new();
        let mut wants_media_type = BTreeSet::new();

        for file in submissions.iter().flat_map(|s| &s.files) {
            let entry = memo.entry(file.source_url.clone()).or_default();
            match (&entry.digest, &file.digest) {
                (Some(first), Some(second)) if first != second => {
                    return Err(IngestError::ConflictingDigests {
                        url: file.source_url.to_string(),
                        first: self.registry.describe(first),
                        second: self.registry.describe(second),
                    });
                }
                (None, Some(declared)) => entry.digest = Some(declared.clone()),
                _ => {}
            }
            match &file.media_type {
                Some(declared) if entry.media_type.is_none() => {
                    entry.media_type = Some(declared.clone())
                }
                Some(_) => {}
                None => {
                    wants_media_type.insert(file.source_url.clone());
                }
            }
        }

        let lookups = memo
            .iter()
            .filter_map(|(url, details)| {
                if details.digest.is_none() {
                    Some((url.clone(), Lookup::Fetch))
                } else if details.media_type.is_none() && wants_media_type.contains(url) {
                    Some((url.clone(), Lookup::Head))
                } else {
                    None
                }
            })
            .collect();
        Ok((memo, lookups))
    }

    async fn resolve(
        &self,
        lookups: BTreeMap<Url, Lookup>,
    ) -> Result<BTreeMap<Url, SourceDetails>, IngestError> {
        let resolved = Arc::new(Mutex::new(BTreeMap::new()));
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (url, lookup) in lookups {
            let fetcher = Arc::clone(&self.fetcher);
            let registry = Arc::clone(&self.registry);
            let resolved = Arc::clone(&resolved);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| IngestError::Task(e.to_string()))?;
                let details = match lookup {
                    Lookup::Fetch => {
                        let fetched = fetcher.fetch(&url, registry.default_builder()).await?;
                        let details = SourceDetails {
                            digest: Some(fetched.digest.clone()),
                            media_type: fetched.media_type.clone(),
                        };
                        drop(fetched);
                        details
                    }
                    Lookup::Head => SourceDetails {
                        digest: None,
                        media_type: fetcher.head(&url).await?,
                    },
                };
                resolved.lock().insert(url, details);
                Ok::<(), IngestError>(())
            });
        }

        // Returning early drops the set, which aborts the remaining workers.
        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| IngestError::Task(e.to_string()))??;
        }

        let mut resolved = resolved.lock();
        Ok(std::mem::take(&mut *resolved))
    }
}

fn claim(
    held: &mut BTreeMap<ArtifactId, Slug>,
    id: &ArtifactId,
    slug: &Slug,
) -> Result<(), IngestError> {
    if let Some(owner) = held.get(id) {
        return Err(IngestError::DuplicateId {
            id: id.clone(),
            first: owner.clone(),
            second: slug.clone(),
        });
    }
    held.insert(id.clone(), slug.clone());
    Ok(())
}

/// Fill absent file fields from the memo. Returns the changed filenames.
fn apply(
    submission: &mut ArtifactSubmission,
    memo: &BTreeMap<Url, SourceDetails>,
) -> Vec<FileName> {
    let mut updated = Vec::new();
    for file in &mut submission.files {
        let Some(details) = memo.get(&file.source_url) else {
            continue;
        };
        let mut changed = false;
        if file.digest.is_none() && details.digest.is_some() {
            file.digest = details.digest.clone();
            changed = true;
        }
        if file.media_type.is_none() && details.media_type.is_some() {
            file.media_type = details.media_type.clone();
            changed = true;
        }
        if changed {
            updated.push(file.filename.clone());
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchedFile;
    use artifact_core::{AlgorithmCode, DigestBuilder};
    use artifact_schema::FileSubmission;
    use async_trait::async_trait;

    /// Fails the test on any network use.
    struct Offline;

    #[async_trait]
    impl Fetcher for Offline {
        async fn fetch(
            &self,
            url: &Url,
            _hasher: DigestBuilder,
        ) -> Result<FetchedFile, IngestError> {
            panic!("unexpected GET {url}");
        }

        async fn head(&self, url: &Url) -> Result<Option<MediaType>, IngestError> {
            panic!("unexpected HEAD {url}");
        }
    }

    fn file(filename: &str, url: &str, digest: Option<Digest>) -> FileSubmission {
        FileSubmission {
            name: "File".to_string(),
            filename: FileName::new(filename).unwrap(),
            media_type: Some(MediaType::new("image/png").unwrap()),
            digest,
            source_url: Url::parse(url).unwrap(),
            language_tag: None,
            hidden: false,
            aliases: vec![],
        }
    }

    fn submission(slug: &str, files: Vec<FileSubmission>) -> ArtifactSubmission {
        ArtifactSubmission {
            version: 1,
            id: None,
            slug: Slug::new(slug).unwrap(),
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            description: None,
            files,
            links: vec![],
            people: vec![],
            identities: vec![],
            from_year: 1990,
            to_year: None,
            decades: vec![1990],
            aliases: vec![],
        }
    }

    fn completer() -> SubmissionCompleter {
        SubmissionCompleter::new(Arc::new(Offline), Arc::new(AlgorithmRegistry::builtin()))
    }

    #[tokio::test]
    async fn declared_digest_is_shared_with_files_lacking_one() {
        let digest = Digest::new(AlgorithmCode::SHA2_256, vec![7; 32]);
        let batch = vec![
            submission(
                "first-artifact-slug",
                vec![file("scan.png", "https://example.com/a.png", Some(digest.clone()))],
            ),
            submission(
                "second-artifact-slug",
                vec![file("copy.png", "https://example.com/a.png", None)],
            ),
        ];
        let completion = completer().complete(batch).await.unwrap();
        assert_eq!(completion.submissions[1].files[0].digest, Some(digest));
        assert_eq!(completion.report.urls_fetched, 0);
        assert_eq!(completion.report.total_files_updated(), 1);
        assert_eq!(completion.report.ids_assigned.len(), 2);
    }

    #[tokio::test]
    async fn conflicting_digests_across_records_abort() {
        let batch = vec![
            submission(
                "first-artifact-slug",
                vec![file(
                    "scan.png",
                    "https://example.com/a.png",
                    Some(Digest::new(AlgorithmCode::SHA2_256, vec![1; 32])),
                )],
            ),
            submission(
                "second-artifact-slug",
                vec![file(
                    "scan.png",
                    "https://example.com/a.png",
                    Some(Digest::new(AlgorithmCode::SHA2_256, vec![2; 32])),
                )],
            ),
        ];
        let err = completer().complete(batch).await.unwrap_err();
        assert!(matches!(err, IngestError::ConflictingDigests { .. }));
    }

    #[tokio::test]
    async fn existing_ids_are_kept() {
        let mut complete = submission(
            "first-artifact-slug",
            vec![file(
                "scan.png",
                "https://example.com/a.png",
                Some(Digest::new(AlgorithmCode::SHA2_256, vec![1; 32])),
            )],
        );
        complete.id = Some(ArtifactId::new("abcdefABCDEF").unwrap());
        let completion = completer().complete(vec![complete.clone()]).await.unwrap();
        assert_eq!(completion.submissions, vec![complete]);
        assert!(completion.report.is_unchanged());
    }

    /// Maps every slug to one recorded id.
    struct Recorded(ArtifactId);

    impl IdentifierAuthority for Recorded {
        fn existing_id(&self, _slug: &Slug, _aliases: &[Slug]) -> Option<ArtifactId> {
            Some(self.0.clone())
        }
    }

    fn declared(slug: &str, id: &str) -> ArtifactSubmission {
        let mut submission = submission(
            slug,
            vec![file(
                "scan.png",
                &format!("https://example.com/{slug}.png"),
                Some(Digest::new(AlgorithmCode::SHA2_256, vec![1; 32])),
            )],
        );
        submission.id = Some(ArtifactId::new(id).unwrap());
        submission
    }

    #[tokio::test]
    async fn shared_declared_id_aborts() {
        let batch = vec![
            declared("first-artifact-slug", "AAAAAAAAAAAA"),
            declared("second-artifact-slug", "AAAAAAAAAAAA"),
        ];
        let err = completer().complete(batch).await.unwrap_err();
        match err {
            IngestError::DuplicateId { id, first, second } => {
                assert_eq!(id.as_str(), "AAAAAAAAAAAA");
                assert_eq!(first.as_str(), "first-artifact-slug");
                assert_eq!(second.as_str(), "second-artifact-slug");
            }
            other => panic!("expected DuplicateId, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reused_id_held_by_another_submission_aborts() {
        let mut pending = declared("second-artifact-slug", "BBBBBBBBBBBB");
        pending.id = None;
        let batch = vec![declared("first-artifact-slug", "XXXXXXXXXXXX"), pending];

        let recorded = Recorded(ArtifactId::new("XXXXXXXXXXXX").unwrap());
        let err = completer()
            .with_authority(Arc::new(recorded))
            .complete(batch)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::DuplicateId { .. }));
    }
}
