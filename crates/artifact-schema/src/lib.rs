//! # artifact-schema: Submission Schema and Validation
//!
//! Turns raw, untyped submission records into typed, invariant-checked
//! [`ArtifactSubmission`]s.
//!
//! ## Flow
//!
//! 1. Every record in the batch is read as a [`RawRecord`] (open JSON value
//!    plus the record key derived from its file name).
//! 2. A [`KnownSlugs`] snapshot is built once from all raw records (and,
//!    optionally, from previously published history) before any record is
//!    validated. It is read-only from then on.
//! 3. [`SubmissionValidator`] checks each record against the field rules and
//!    the cross-record rules, accumulating every violation instead of
//!    stopping at the first.
//! 4. A validated submission is classified into [`Submission::Incomplete`] or
//!    [`Submission::Complete`]; only complete submissions can be uploaded.

pub mod decades;
pub mod known;
pub mod raw;
pub mod submission;
pub mod validate;

pub use decades::{decade_of, decades_spanned};
pub use known::KnownSlugs;
pub use raw::RawRecord;
pub use submission::{
    ArtifactSubmission, CompleteFile, CompleteSubmission, FileSubmission, IncompleteSubmission,
    LinkSubmission, Submission, SUBMISSION_VERSION,
};
pub use validate::{
    BatchValidationError, Mode, SchemaValidationError, SubmissionValidator, Violation,
    ViolationKind,
};
