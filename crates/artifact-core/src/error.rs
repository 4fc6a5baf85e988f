//! # Error Types
//!
//! Structured errors for digest handling and identifier validation. Each
//! variant carries the offending input so that a contributor can fix a
//! submission without guesswork.

use thiserror::Error;

use crate::algorithm::AlgorithmCode;

/// Errors from decoding digests or resolving their algorithm.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// The textual or binary multihash could not be decoded.
    #[error("malformed multihash \"{input}\": {reason}")]
    Malformed {
        /// The input that failed to decode (hex for binary input).
        input: String,
        /// Why decoding failed.
        reason: String,
    },

    /// No hash algorithm is registered under this multihash code.
    #[error(
        "a hash algorithm with the multihash code {0} is not supported \
         (see https://github.com/multiformats/multicodec)"
    )]
    UnsupportedAlgorithm(AlgorithmCode),
}

/// Validation errors for identifier newtypes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Slug is not url-safe or has the wrong length.
    #[error("invalid slug \"{value}\": {reason}")]
    InvalidSlug {
        /// The rejected value.
        value: String,
        /// What rule it broke.
        reason: String,
    },

    /// Artifact identifiers are fixed-length ASCII alphanumerics.
    #[error("invalid artifact id \"{0}\" (expected 12 ASCII alphanumeric characters)")]
    InvalidArtifactId(String),

    /// File names are lowercase, forward-slash separated paths.
    #[error("invalid file name \"{value}\": {reason}")]
    InvalidFileName {
        /// The rejected value.
        value: String,
        /// What rule it broke.
        reason: String,
    },

    /// Media type is not of the form `<registered-type>/<subtype>`.
    #[error("invalid media type \"{0}\"")]
    InvalidMediaType(String),

    /// Language tag is not a sequence of 1-8 character alphanumeric subtags.
    #[error("invalid language tag \"{0}\"")]
    InvalidLanguageTag(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_algorithm_mentions_hex_code() {
        let err = DigestError::UnsupportedAlgorithm(AlgorithmCode(0x1e));
        let msg = err.to_string();
        assert!(msg.contains("0x1e"));
        assert!(msg.contains("not supported"));
    }

    #[test]
    fn malformed_carries_input_and_reason() {
        let err = DigestError::Malformed {
            input: "zz".to_string(),
            reason: "invalid hex".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("zz"));
        assert!(msg.contains("invalid hex"));
    }

    #[test]
    fn invalid_slug_display() {
        let err = ValidationError::InvalidSlug {
            value: "Bad_Slug".to_string(),
            reason: "must be lowercase".to_string(),
        };
        assert!(err.to_string().contains("Bad_Slug"));
    }
}
