//! # Typed Submissions
//!
//! [`ArtifactSubmission`] is the validated form of a submission record. It
//! may still lack its stable `id` and per-file digests; those are filled in
//! by completion. [`CompleteSubmission`] is the strict variant in which the
//! `id` and every file digest are present by construction.
//!
//! The serde layout of [`ArtifactSubmission`] is the on-disk submission
//! format, so a completed submission can be written back to its file.

use artifact_core::{ArtifactId, Digest, FileName, LanguageTag, MediaType, Slug};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// The only submission format version currently accepted.
pub const SUBMISSION_VERSION: u32 = 1;

/// One file referenced by a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSubmission {
    pub name: String,
    pub filename: FileName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(default, rename = "multihash", skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
    pub source_url: Url,
    #[serde(default, rename = "lang", skip_serializing_if = "Option::is_none")]
    pub language_tag: Option<LanguageTag>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub aliases: Vec<FileName>,
}

/// An external link attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSubmission {
    pub name: String,
    pub url: Url,
}

/// A validated submission, complete or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactSubmission {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ArtifactId>,
    pub slug: Slug,
    pub title: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub files: Vec<FileSubmission>,
    #[serde(default)]
    pub links: Vec<LinkSubmission>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub identities: Vec<String>,
    pub from_year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_year: Option<i32>,
    #[serde(default)]
    pub decades: Vec<i32>,
    #[serde(default)]
    pub aliases: Vec<Slug>,
}

/// A file whose digest is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteFile {
    pub name: String,
    pub filename: FileName,
    pub media_type: Option<MediaType>,
    pub digest: Digest,
    pub source_url: Url,
    pub language_tag: Option<LanguageTag>,
    pub hidden: bool,
    pub aliases: Vec<FileName>,
}

/// A submission with its `id` and every file digest present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteSubmission {
    pub version: u32,
    pub id: ArtifactId,
    pub slug: Slug,
    pub title: String,
    pub summary: String,
    pub description: Option<String>,
    pub files: Vec<CompleteFile>,
    pub links: Vec<LinkSubmission>,
    pub people: Vec<String>,
    pub identities: Vec<String>,
    pub from_year: i32,
    pub to_year: Option<i32>,
    pub decades: Vec<i32>,
    pub aliases: Vec<Slug>,
}

/// A validated submission tagged by lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Incomplete(ArtifactSubmission),
    Complete(CompleteSubmission),
}

/// Returned when a submission lacking generated fields is asked to act as
/// a complete one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("submission {slug} is incomplete; missing: {}", .missing.join(", "))]
pub struct IncompleteSubmission {
    pub slug: Slug,
    /// Paths of the missing fields, e.g. `id`, `files[0].multihash`.
    pub missing: Vec<String>,
    /// The submission, returned unchanged.
    pub submission: Box<ArtifactSubmission>,
}

impl ArtifactSubmission {
    /// Paths of generated fields that are still missing.
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.id.is_none() {
            missing.push("id".to_string());
        }
        for (i, file) in self.files.iter().enumerate() {
            if file.digest.is_none() {
                missing.push(format!("files[{i}].multihash ({})", file.filename));
            }
        }
        missing
    }

    /// Whether the `id` and every file digest are present.
    pub fn is_complete(&self) -> bool {
        self.id.is_some() && self.files.iter().all(|f| f.digest.is_some())
    }

    /// Every name this record is known by: its slug followed by its aliases.
    pub fn names(&self) -> impl Iterator<Item = &Slug> {
        std::iter::once(&self.slug).chain(self.aliases.iter())
    }

    /// Convert into the strict variant, or explain what is missing.
    pub fn into_complete(self) -> Result<CompleteSubmission, IncompleteSubmission> {
        let missing = self.missing_fields();
        let id = match (&self.id, missing.is_empty()) {
            (Some(id), true) => id.clone(),
            _ => {
                return Err(IncompleteSubmission {
                    slug: self.slug.clone(),
                    missing,
                    submission: Box::new(self),
                })
            }
        };

        let mut files = Vec::with_capacity(self.files.len());
        for file in self.files {
            let FileSubmission {
                name,
                filename,
                media_type,
                digest,
                source_url,
                language_tag,
                hidden,
                aliases,
            } = file;
            // Presence was checked by missing_fields() above.
            let Some(digest) = digest else {
                continue;
            };
            files.push(CompleteFile {
                name,
                filename,
                media_type,
                digest,
                source_url,
                language_tag,
                hidden,
                aliases,
            });
        }

        Ok(CompleteSubmission {
            version: self.version,
            id,
            slug: self.slug,
            title: self.title,
            summary: self.summary,
            description: self.description,
            files,
            links: self.links,
            people: self.people,
            identities: self.identities,
            from_year: self.from_year,
            to_year: self.to_year,
            decades: self.decades,
            aliases: self.aliases,
        })
    }

    /// Tag by lifecycle state.
    pub fn classify(self) -> Submission {
        match self.into_complete() {
            Ok(complete) => Submission::Complete(complete),
            Err(incomplete) => Submission::Incomplete(*incomplete.submission),
        }
    }
}

impl From<CompleteFile> for FileSubmission {
    fn from(file: CompleteFile) -> Self {
        Self {
            name: file.name,
            filename: file.filename,
            media_type: file.media_type,
            digest: Some(file.digest),
            source_url: file.source_url,
            language_tag: file.language_tag,
            hidden: file.hidden,
            aliases: file.aliases,
        }
    }
}

impl From<CompleteSubmission> for ArtifactSubmission {
    fn from(submission: CompleteSubmission) -> Self {
        Self {
            version: submission.version,
            id: Some(submission.id),
            slug: submission.slug,
            title: submission.title,
            summary: submission.summary,
            description: submission.description,
            files: submission.files.into_iter().map(FileSubmission::from).collect(),
            links: submission.links,
            people: submission.people,
            identities: submission.identities,
            from_year: submission.from_year,
            to_year: submission.to_year,
            decades: submission.decades,
            aliases: submission.aliases,
        }
    }
}

impl Submission {
    pub fn slug(&self) -> &Slug {
        match self {
            Self::Incomplete(s) => &s.slug,
            Self::Complete(s) => &s.slug,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}
