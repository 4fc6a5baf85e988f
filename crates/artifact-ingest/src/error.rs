//! Ingestion error types.
//!
//! Everything except schema validation aborts the whole run. Validation
//! failures arrive already accumulated in a [`BatchValidationError`].

use artifact_core::{ArtifactId, DigestError, Slug};
use artifact_schema::BatchValidationError;
use artifact_store::StoreError;

use crate::config::ConfigError;
use crate::state::{RunLedger, StateTransitionError};

/// Errors from an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Downloaded content does not hash to the declared digest.
    #[error(
        "downloaded file does not match the hash included in the submission: {slug}/{filename}\n\
         URL: {url}\nExpected: {expected}\nActual: {actual}"
    )]
    DigestMismatch {
        slug: Slug,
        filename: String,
        url: String,
        /// `algorithm:hex`
        expected: String,
        /// `algorithm:hex`
        actual: String,
    },

    /// Upload was attempted on a submission lacking generated fields.
    #[error(
        "submission {slug} is incomplete (missing {}); run validate first",
        .missing.join(", ")
    )]
    Incomplete { slug: Slug, missing: Vec<String> },

    /// HTTP transport error.
    #[error("HTTP error calling {url}: {source}")]
    Network {
        url: String,
        source: reqwest::Error,
    },

    /// A source host answered with a non-2xx status.
    #[error("{method} {url} returned {status}")]
    HttpStatus {
        method: &'static str,
        url: String,
        status: u16,
    },

    /// Two files in the batch share a source URL but declare different digests.
    #[error("source URL {url} is declared with two different digests: {first} and {second}")]
    ConflictingDigests {
        url: String,
        first: String,
        second: String,
    },

    /// Two submissions of the batch would be published under one id.
    #[error("artifact id {id} is held by both {first} and {second}")]
    DuplicateId {
        id: ArtifactId,
        first: Slug,
        second: Slug,
    },

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("failed to publish artifact metadata to {target}: {reason}")]
    Publish { target: String, reason: String },

    #[error("failed to read artifact listing {path}: {reason}")]
    Listing { path: String, reason: String },

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Validation(#[from] BatchValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error(transparent)]
    State(#[from] StateTransitionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// An aborted run: the error that stopped it, and the ledger with every
/// pending submission marked failed.
#[derive(Debug, thiserror::Error)]
#[error("{mode} aborted")]
pub struct RunFailure {
    pub mode: &'static str,
    #[source]
    pub error: IngestError,
    pub ledger: RunLedger,
}

impl IngestError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
