//! # artifact-cli: The `artifact-submit` Command
//!
//! ## Subcommands
//!
//! - `artifact-submit validate`: validate every submission in a directory
//!   and complete it in place (ids, file digests, media types).
//! - `artifact-submit upload`: verify and store every file, then publish
//!   artifact metadata.
//!
//! Handlers parse their flags, layer them over [`IngestConfig`](artifact_ingest::IngestConfig)
//! from the environment, and delegate to `artifact-ingest`. They return the
//! process exit code; errors are reported once, by `main`.

use artifact_ingest::{RunFailure, SubmissionState};

pub mod settings;
pub mod submissions;
pub mod upload;
pub mod validate;

/// Log which submissions an aborted run left failed, then hand the error on.
pub(crate) fn report_failure(failure: RunFailure) -> anyhow::Error {
    for (slug, state) in failure.ledger.iter() {
        if state == SubmissionState::Failed {
            tracing::error!(%slug, "Submission failed");
        }
    }
    anyhow::Error::new(failure)
}
