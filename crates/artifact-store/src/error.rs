//! Content store error types.

use artifact_core::DigestError;

/// Errors from content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An object could not be written.
    #[error("failed to write object {key}: {reason}")]
    Write { key: String, reason: String },

    /// An object or its metadata could not be read.
    #[error("failed to read object {key}: {reason}")]
    Read { key: String, reason: String },

    /// The namespace could not be enumerated.
    #[error("failed to list objects under \"{prefix}\": {reason}")]
    Listing { prefix: String, reason: String },

    /// This store cannot enumerate its objects.
    #[error("listing is not supported by this store")]
    ListingUnsupported,

    /// The public endpoint answered with a digest other than the expected one.
    #[error(
        "object {key} exists but its Repr-Digest does not match: expected {expected}, found {}",
        .found.as_deref().unwrap_or("no Repr-Digest header")
    )]
    ProbeMismatch {
        key: String,
        expected: String,
        found: Option<String>,
    },

    /// The public endpoint answered with neither success nor 404.
    #[error("probe of {url} returned unexpected status {status}")]
    ProbeStatus { url: String, status: u16 },

    /// HTTP transport error.
    #[error("HTTP error calling {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("invalid probe URL for {key}: {reason}")]
    InvalidUrl { key: String, reason: String },

    #[error(transparent)]
    Digest(#[from] DigestError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_mismatch_mentions_both_sides() {
        let err = StoreError::ProbeMismatch {
            key: "artifacts/1220ab".to_string(),
            expected: "sha-256=:qw==:".to_string(),
            found: None,
        };
        let msg = err.to_string();
        assert!(msg.contains("artifacts/1220ab"));
        assert!(msg.contains("sha-256=:qw==:"));
        assert!(msg.contains("no Repr-Digest header"));
    }
}
