//! # artifact-ingest: Content-Addressed Ingestion Pipeline
//!
//! Orchestrates a batch of artifact submissions through two modes:
//!
//! - **validate** ([`IngestionPipeline::validate`]): schema validation, then
//!   [`SubmissionCompleter`] fills in each missing id, file digest and media
//!   type. Source URLs are fetched at most once per batch.
//! - **upload** ([`IngestionPipeline::upload`]): every submission must be
//!   complete. Files already in the [`ContentStore`](artifact_store::ContentStore)
//!   are skipped; the rest are downloaded, verified against their declared
//!   digest and stored. The batch is then projected into [`Artifact`]s,
//!   sorted by id, and handed to a [`MetadataPublisher`].
//!
//! Each submission's progress is tracked in a [`RunLedger`].

pub mod authority;
pub mod complete;
pub mod config;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod publish;
pub mod retry;
pub mod state;
pub mod upload;

pub use authority::{IdentifierAuthority, ListingAuthority, NoHistory};
pub use complete::{Completion, CompletionReport, SubmissionCompleter};
pub use config::{ConfigError, IngestConfig};
pub use error::{IngestError, RunFailure};
pub use fetch::{FetchedFile, Fetcher, HttpFetcher};
pub use pipeline::{IngestionPipeline, UploadOutcome, ValidateOutcome};
pub use publish::{
    sort_artifacts, Artifact, ArtifactFile, ArtifactLink, ArtifactListing, HttpMetadataPublisher,
    JsonListingPublisher, MemoryPublisher, MetadataPublisher, Projection,
};
pub use retry::RetryPolicy;
pub use state::{RunLedger, StateTransitionError, SubmissionState};
pub use upload::{UploadReport, Uploader};
