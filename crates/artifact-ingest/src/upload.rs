//! # Verified Upload
//!
//! Puts every file of a complete batch into the content store exactly once.
//!
//! A file is skipped without any network traffic when its digest is already
//! in the store, or when an earlier file of the same run had the same
//! digest. Otherwise it is downloaded, hashed with the algorithm of its
//! declared digest, and compared against that digest before anything is
//! written. A mismatch aborts the run and writes nothing for that file.
//! Verified content is handed to the store from the download's temp file,
//! never buffered whole in memory.

use std::collections::BTreeSet;
use std::sync::Arc;

use artifact_core::{AlgorithmRegistry, Digest};
use artifact_schema::{CompleteFile, CompleteSubmission};
use artifact_store::ContentStore;

use crate::error::IngestError;
use crate::fetch::Fetcher;
use crate::state::{RunLedger, SubmissionState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub files_uploaded: usize,
    pub files_skipped: usize,
    pub bytes_uploaded: u64,
}

/// How the uploader learns what the store already holds.
enum KnownContent {
    /// A listing taken once at the start of the run.
    Listed(BTreeSet<Digest>),
    /// One existence check per file.
    PerFile,
}

#[derive(Clone)]
pub struct Uploader {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ContentStore>,
    registry: Arc<AlgorithmRegistry>,
}

impl Uploader {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ContentStore>,
        registry: Arc<AlgorithmRegistry>,
    ) -> Self {
        Self {
            fetcher,
            store,
            registry,
        }
    }

    /// Upload every file of `submissions`, advancing each submission to
    /// [`SubmissionState::PerFileVerified`] once all of its files are stored.
    pub async fn upload(
        &self,
        submissions: &[CompleteSubmission],
        ledger: &mut RunLedger,
    ) -> Result<UploadReport, IngestError> {
        let known = if self.store.supports_listing() {
            let digests = self.store.list_known_digests(self.store.prefix()).await?;
            tracing::info!(count = digests.len(), "Found existing files in the store");
            KnownContent::Listed(digests)
        } else {
            KnownContent::PerFile
        };

        let mut report = UploadReport::default();
        let mut stored_this_run = BTreeSet::new();

        for submission in submissions {
            for file in &submission.files {
                let already_stored = stored_this_run.contains(&file.digest)
                    || match &known {
                        KnownContent::Listed(digests) => digests.contains(&file.digest),
                        KnownContent::PerFile => self.store.exists(&file.digest).await?,
                    };
                if already_stored {
                    tracing::info!("Skipping artifact file: {}/{}", submission.slug, file.filename);
                    report.files_skipped += 1;
                    continue;
                }

                report.bytes_uploaded += self.verify_and_store(submission, file).await?;
                report.files_uploaded += 1;
                stored_this_run.insert(file.digest.clone());
            }
            ledger.advance(&submission.slug, SubmissionState::PerFileVerified)?;
        }

        tracing::info!(
            uploaded = report.files_uploaded,
            skipped = report.files_skipped,
            bytes = report.bytes_uploaded,
            "Uploaded artifact files"
        );
        Ok(report)
    }

    async fn verify_and_store(
        &self,
        submission: &CompleteSubmission,
        file: &CompleteFile,
    ) -> Result<u64, IngestError> {
        let expected = &file.digest;
        let hasher = self.registry.builder(expected.code())?;
        let fetched = self.fetcher.fetch(&file.source_url, hasher).await?;

        if fetched.digest != *expected {
            return Err(IngestError::DigestMismatch {
                slug: submission.slug.clone(),
                filename: file.filename.to_string(),
                url: file.source_url.to_string(),
                expected: self.registry.describe(expected),
                actual: self.registry.describe(&fetched.digest),
            });
        }
        tracing::debug!(slug = %submission.slug, filename = %file.filename, "Validated file hash");

        let media_type = file.media_type.as_ref().or(fetched.media_type.as_ref());
        let key = self.store.key_for(expected);
        tracing::info!(key = %key, "Uploading to store: {}/{}", submission.slug, file.filename);
        self.store.put_file(expected, fetched.path(), media_type).await?;
        Ok(fetched.len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use artifact_core::{ArtifactId, FileName, MediaType, Slug};
    use artifact_store::MemoryContentStore;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn submission(slug: &str, url: Url, digest: Digest) -> CompleteSubmission {
        CompleteSubmission {
            version: 1,
            id: ArtifactId::new("abcdefABCDEF").unwrap(),
            slug: Slug::new(slug).unwrap(),
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            description: None,
            files: vec![CompleteFile {
                name: "Flyer".to_string(),
                filename: FileName::new("flyer.txt").unwrap(),
                media_type: None,
                digest,
                source_url: url,
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
            aliases: vec![],
        }
    }

    fn ledger_for(submissions: &[CompleteSubmission]) -> RunLedger {
        let mut ledger = RunLedger::new();
        for s in submissions {
            ledger.track(s.slug.clone(), SubmissionState::Complete);
        }
        ledger
    }

    #[tokio::test]
    async fn shared_digest_is_fetched_and_written_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flyer.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/plain")
                    .set_body_bytes(b"abc".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let registry = Arc::new(AlgorithmRegistry::builtin());
        let digest = registry.digest(registry.default_algorithm().code(), b"abc").unwrap();
        let url = Url::parse(&format!("{}/flyer.txt", server.uri())).unwrap();
        let batch = vec![
            submission("first-artifact-slug", url.clone(), digest.clone()),
            submission("second-artifact-slug", url, digest.clone()),
        ];

        let store = Arc::new(MemoryContentStore::new("artifacts/"));
        let uploader = Uploader::new(
            Arc::new(HttpFetcher::new(reqwest::Client::new())),
            store.clone(),
            registry,
        );
        let mut ledger = ledger_for(&batch);
        let report = uploader.upload(&batch, &mut ledger).await.unwrap();

        assert_eq!(report.files_uploaded, 1);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.bytes_uploaded, 3);
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.media_type(&digest), Some(MediaType::new("text/plain").unwrap()));
        assert_eq!(ledger.count(SubmissionState::PerFileVerified), 2);
    }
}
