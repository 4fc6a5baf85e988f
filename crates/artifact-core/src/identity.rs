//! # Identifier Newtypes
//!
//! Validated string identifiers used across submissions and published
//! artifacts. Each type checks its format at construction, so holding a
//! [`Slug`] or [`FileName`] is proof that the value is well formed.
//!
//! | Type | Format |
//! |------|--------|
//! | [`Slug`] | `^[a-z0-9][a-z0-9-]*[a-z0-9]$`, 12–64 chars |
//! | [`ArtifactId`] | 12 ASCII alphanumerics |
//! | [`FileName`] | `^[a-z0-9][a-z0-9-]*[a-z0-9](/[a-z0-9][a-z0-9-]*[a-z0-9])*(\.[a-z0-9]+)*$` |
//! | [`MediaType`] | `<type>/<subtype>`, with a registered top-level type |
//! | [`LanguageTag`] | `-`-separated subtags of 1–8 ASCII alphanumerics |

use std::fmt;

use rand::distributions::{Alphanumeric, Distribution};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Minimum slug length.
pub const SLUG_MIN_LEN: usize = 12;
/// Maximum slug length.
pub const SLUG_MAX_LEN: usize = 64;
/// Length of a generated artifact id.
pub const ARTIFACT_ID_LENGTH: usize = 12;

const MEDIA_TYPE_TOP_LEVEL: &[&str] = &[
    "application",
    "audio",
    "font",
    "image",
    "model",
    "text",
    "video",
    "message",
    "multipart",
];

fn is_lower_alnum(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit()
}

/// `[a-z0-9][a-z0-9-]*[a-z0-9]`
fn check_segment(segment: &str) -> Result<(), String> {
    if segment.len() < 2 {
        return Err(format!("segment {segment:?} must be at least 2 characters"));
    }
    if let Some(c) = segment.chars().find(|&c| !(is_lower_alnum(c) || c == '-')) {
        return Err(format!("contains invalid character {c:?}: must match [a-z0-9-]"));
    }
    if segment.starts_with('-') || segment.ends_with('-') {
        return Err(format!("segment {segment:?} must start and end with [a-z0-9]"));
    }
    Ok(())
}

macro_rules! string_newtype_impls {
    ($ty:ident) => {
        impl $ty {
            /// Borrow the validated string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> String {
                value.0
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl std::str::FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

/// The url-safe, human-assigned identifier of an artifact record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Validate and wrap a slug.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let invalid = |reason: String| ValidationError::InvalidSlug {
            value: s.clone(),
            reason,
        };
        if s.len() < SLUG_MIN_LEN || s.len() > SLUG_MAX_LEN {
            return Err(invalid(format!(
                "length {} is outside {SLUG_MIN_LEN}..={SLUG_MAX_LEN}",
                s.len()
            )));
        }
        check_segment(&s).map_err(invalid)?;
        Ok(Self(s))
    }
}

string_newtype_impls!(Slug);

/// The stable identifier of an artifact, generated once and never
/// regenerated for the same slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Validate and wrap an existing identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.len() != ARTIFACT_ID_LENGTH || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidArtifactId(s));
        }
        Ok(Self(s))
    }

    /// Generate a fresh identifier from `rng`.
    ///
    /// Only collision resistance is required here, not unpredictability.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let id: String = Alphanumeric
            .sample_iter(rng)
            .take(ARTIFACT_ID_LENGTH)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Generate a fresh identifier from the thread-local RNG.
    pub fn random() -> Self {
        Self::generate(&mut rand::thread_rng())
    }
}

string_newtype_impls!(ArtifactId);

/// A path-safe, forward-slash separated file name within an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileName(String);

impl FileName {
    /// Validate and wrap a file name.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let invalid = |reason: String| ValidationError::InvalidFileName {
            value: s.clone(),
            reason,
        };

        let (stem, extensions) = match s.split_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (s.as_str(), None),
        };

        for segment in stem.split('/') {
            check_segment(segment).map_err(invalid)?;
        }

        if let Some(extensions) = extensions {
            for ext in extensions.split('.') {
                if ext.is_empty() || !ext.chars().all(is_lower_alnum) {
                    return Err(invalid(format!(
                        "extension {ext:?} must be one or more [a-z0-9]"
                    )));
                }
            }
        }

        Ok(Self(s))
    }
}

string_newtype_impls!(FileName);

/// A MIME media type such as `application/pdf`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MediaType(String);

impl MediaType {
    /// Validate and wrap a media type.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let valid = match s.split_once('/') {
            Some((top, sub)) => {
                MEDIA_TYPE_TOP_LEVEL.contains(&top)
                    && !sub.is_empty()
                    && sub
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+' | '-'))
            }
            None => false,
        };
        if !valid {
            return Err(ValidationError::InvalidMediaType(s));
        }
        Ok(Self(s))
    }

    /// Parse a `Content-Type` header value, dropping parameters.
    ///
    /// `text/html; charset=utf-8` becomes `text/html`.
    pub fn from_content_type(header: &str) -> Result<Self, ValidationError> {
        let essence = header.split(';').next().unwrap_or_default().trim();
        Self::new(essence.to_ascii_lowercase())
    }
}

string_newtype_impls!(MediaType);

/// A language tag such as `en` or `pt-BR`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    /// Validate and wrap a language tag.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let valid = s
            .split('-')
            .all(|sub| {
                (1..=8).contains(&sub.len()) && sub.chars().all(|c| c.is_ascii_alphanumeric())
            });
        if !valid {
            return Err(ValidationError::InvalidLanguageTag(s));
        }
        Ok(Self(s))
    }
}

string_newtype_impls!(LanguageTag);

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn slug_accepts_valid() {
        assert!(Slug::new("orlando-drag-ball-flyer").is_ok());
        assert!(Slug::new("a1b2c3d4e5f6").is_ok());
    }

    #[test]
    fn slug_rejects_bad_shapes() {
        assert!(Slug::new("short").is_err());
        assert!(Slug::new("-leading-hyphen-slug").is_err());
        assert!(Slug::new("trailing-hyphen-slug-").is_err());
        assert!(Slug::new("Upper-Case-Slug-Here").is_err());
        assert!(Slug::new("under_score_slug_here").is_err());
        assert!(Slug::new("a".repeat(65)).is_err());
    }

    #[test]
    fn artifact_id_format() {
        assert!(ArtifactId::new("abcDEF123456").is_ok());
        assert!(ArtifactId::new("abc").is_err());
        assert!(ArtifactId::new("abcDEF12345-").is_err());
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = ArtifactId::generate(&mut rng);
        let b = ArtifactId::generate(&mut rng);
        assert!(ArtifactId::new(a.as_str()).is_ok());
        assert_ne!(a, b);
        assert_eq!(ArtifactId::random().as_str().len(), ARTIFACT_ID_LENGTH);
    }

    #[test]
    fn file_name_accepts_paths_and_extensions() {
        assert!(FileName::new("flyer.pdf").is_ok());
        assert!(FileName::new("scans/page-01.tar.gz").is_ok());
        assert!(FileName::new("readme").is_ok());
    }

    #[test]
    fn file_name_rejects_unsafe_paths() {
        assert!(FileName::new("../etc/passwd").is_err());
        assert!(FileName::new("/absolute/path").is_err());
        assert!(FileName::new("scans//page").is_err());
        assert!(FileName::new("flyer.").is_err());
        assert!(FileName::new("dir.ext/file").is_err());
        assert!(FileName::new("Flyer.pdf").is_err());
        assert!(FileName::new("scans\\page.pdf").is_err());
    }

    #[test]
    fn media_type_rules() {
        assert!(MediaType::new("application/pdf").is_ok());
        assert!(MediaType::new("image/svg+xml").is_ok());
        assert!(MediaType::new("application/vnd.ms-excel").is_ok());
        assert!(MediaType::new("chemical/x-pdb").is_err());
        assert!(MediaType::new("text/").is_err());
        assert!(MediaType::new("text").is_err());
    }

    #[test]
    fn media_type_from_content_type_strips_parameters() {
        let mt = MediaType::from_content_type("Text/HTML; charset=utf-8").unwrap();
        assert_eq!(mt.as_str(), "text/html");
    }

    #[test]
    fn language_tag_rules() {
        assert!(LanguageTag::new("en").is_ok());
        assert!(LanguageTag::new("pt-BR").is_ok());
        assert!(LanguageTag::new("").is_err());
        assert!(LanguageTag::new("en--us").is_err());
        assert!(LanguageTag::new("waytoolongtag").is_err());
    }

    #[test]
    fn serde_validates_on_deserialize() {
        let ok: Slug = serde_json::from_str("\"orlando-drag-ball-flyer\"").unwrap();
        assert_eq!(ok.as_str(), "orlando-drag-ball-flyer");
        assert!(serde_json::from_str::<Slug>("\"nope\"").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"orlando-drag-ball-flyer\"");
    }
}
