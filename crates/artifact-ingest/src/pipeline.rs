//! # Ingestion Pipeline
//!
//! Runs a batch of raw records through one of the two modes.
//!
//! - **validate**: schema validation, then completion. The completed
//!   submissions are handed back for the caller to persist.
//! - **upload**: schema validation with every digest required, a
//!   completeness re-check, verified upload of every file, then projection
//!   and publication of the whole batch as one sorted listing.
//!
//! Validation failures are reported for every record at once. Any other
//! error aborts the run, and nothing is published. An aborted run returns a
//! [`RunFailure`] whose ledger has every pending submission marked failed.

use std::sync::Arc;

use artifact_core::AlgorithmRegistry;
use artifact_schema::{
    ArtifactSubmission, CompleteSubmission, KnownSlugs, Mode, RawRecord, SubmissionValidator,
};
use artifact_store::ContentStore;
use url::Url;

use crate::authority::{IdentifierAuthority, NoHistory};
use crate::complete::{CompletionReport, SubmissionCompleter};
use crate::error::{IngestError, RunFailure};
use crate::fetch::Fetcher;
use crate::publish::{sort_artifacts, Artifact, MetadataPublisher, Projection};
use crate::state::{RunLedger, SubmissionState};
use crate::upload::{UploadReport, Uploader};

/// Result of a validate run.
#[derive(Debug, Clone)]
pub struct ValidateOutcome {
    /// Completed submissions, paired with the key of the record each came from.
    pub records: Vec<(String, ArtifactSubmission)>,
    pub report: CompletionReport,
    pub ledger: RunLedger,
}

/// Result of an upload run.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// Published artifacts, sorted by id.
    pub artifacts: Vec<Artifact>,
    pub report: UploadReport,
    pub ledger: RunLedger,
}

pub struct IngestionPipeline {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ContentStore>,
    publisher: Arc<dyn MetadataPublisher>,
    registry: Arc<AlgorithmRegistry>,
    authority: Arc<dyn IdentifierAuthority>,
    base_url: Url,
    concurrency: usize,
    current_year: Option<i32>,
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("store_prefix", &self.store.prefix())
            .field("base_url", &self.base_url.as_str())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl IngestionPipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ContentStore>,
        publisher: Arc<dyn MetadataPublisher>,
        base_url: Url,
    ) -> Self {
        Self {
            fetcher,
            store,
            publisher,
            registry: Arc::new(AlgorithmRegistry::builtin()),
            authority: Arc::new(NoHistory),
            base_url,
            concurrency: 4,
            current_year: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<AlgorithmRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Source of previously assigned ids and previously used slugs.
    pub fn with_authority(mut self, authority: Arc<dyn IdentifierAuthority>) -> Self {
        self.authority = authority;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Pin the year used to bound `from_year`/`to_year`.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self
    }

    /// Snapshot of every slug and alias in the batch, plus history.
    /// Built once per run, before any record is validated.
    pub fn known_slugs(&self, records: &[RawRecord]) -> KnownSlugs {
        KnownSlugs::from_records(records).with_history(self.authority.known_names())
    }

    fn validate_records(
        &self,
        mode: Mode,
        records: &[RawRecord],
    ) -> Result<Vec<ArtifactSubmission>, IngestError> {
        let known = self.known_slugs(records);
        let mut validator = SubmissionValidator::new(mode, &known, &self.registry);
        if let Some(year) = self.current_year {
            validator = validator.with_current_year(year);
        }
        Ok(validator.validate_batch(records)?)
    }

    /// Validate the batch and fill in every missing generated field.
    pub async fn validate(&self, records: &[RawRecord]) -> Result<ValidateOutcome, RunFailure> {
        let mut ledger = RunLedger::new();
        match self.run_validate(records, &mut ledger).await {
            Ok((submissions, report)) => Ok(ValidateOutcome {
                records: records.iter().map(|r| r.key.clone()).zip(submissions).collect(),
                report,
                ledger,
            }),
            Err(error) => Err(abort(ledger, "Validation", error)),
        }
    }

    async fn run_validate(
        &self,
        records: &[RawRecord],
        ledger: &mut RunLedger,
    ) -> Result<(Vec<ArtifactSubmission>, CompletionReport), IngestError> {
        let submissions = self.validate_records(Mode::Validate, records)?;
        track(ledger, &submissions);

        let completer =
            SubmissionCompleter::new(Arc::clone(&self.fetcher), Arc::clone(&self.registry));
        let completion = completer
            .with_authority(Arc::clone(&self.authority))
            .with_concurrency(self.concurrency)
            .complete(submissions)
            .await?;

        for submission in &completion.submissions {
            if ledger.state(&submission.slug) == Some(SubmissionState::Incomplete) {
                if !submission.is_complete() {
                    return Err(IngestError::Incomplete {
                        slug: submission.slug.clone(),
                        missing: submission.missing_fields(),
                    });
                }
                ledger.advance(&submission.slug, SubmissionState::Complete)?;
            }
        }
        Ok((completion.submissions, completion.report))
    }

    /// Verify and store every file, then publish the batch.
    pub async fn upload(&self, records: &[RawRecord]) -> Result<UploadOutcome, RunFailure> {
        let mut ledger = RunLedger::new();
        match self.run_upload(records, &mut ledger).await {
            Ok((artifacts, report)) => Ok(UploadOutcome {
                artifacts,
                report,
                ledger,
            }),
            Err(error) => Err(abort(ledger, "Upload", error)),
        }
    }

    async fn run_upload(
        &self,
        records: &[RawRecord],
        ledger: &mut RunLedger,
    ) -> Result<(Vec<Artifact>, UploadReport), IngestError> {
        let submissions = self.validate_records(Mode::Upload, records)?;
        track(ledger, &submissions);

        // Checked again here even though upload-mode validation requires
        // every digest: the id is not required by the schema.
        let mut complete: Vec<CompleteSubmission> = Vec::with_capacity(submissions.len());
        for submission in submissions {
            let submission = submission
                .into_complete()
                .map_err(|incomplete| IngestError::Incomplete {
                    slug: incomplete.slug,
                    missing: incomplete.missing,
                })?;
            complete.push(submission);
        }
        tracing::info!(artifacts = complete.len(), "Found artifacts to upload");

        let uploader = Uploader::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
        );
        let report = uploader.upload(&complete, ledger).await?;

        let projection = Projection {
            registry: &self.registry,
            store_prefix: self.store.prefix(),
            base_url: &self.base_url,
        };
        let mut artifacts = complete
            .iter()
            .map(|submission| projection.project(submission))
            .collect::<Result<Vec<_>, _>>()?;
        sort_artifacts(&mut artifacts);

        self.publisher.publish(&artifacts).await?;
        ledger.advance_all(SubmissionState::PerFileVerified, SubmissionState::Published)?;
        tracing::info!(count = artifacts.len(), "Published artifact metadata");
        Ok((artifacts, report))
    }
}

fn track(ledger: &mut RunLedger, submissions: &[ArtifactSubmission]) {
    for submission in submissions {
        let state = if submission.is_complete() {
            SubmissionState::Complete
        } else {
            SubmissionState::Incomplete
        };
        ledger.track(submission.slug.clone(), state);
    }
}

fn abort(mut ledger: RunLedger, mode: &'static str, error: IngestError) -> RunFailure {
    ledger.fail_pending(&error.to_string());
    tracing::warn!(failed = ledger.count(SubmissionState::Failed), "{mode} aborted");
    RunFailure {
        mode,
        error,
        ledger,
    }
}
