//! Ingestion run configuration.
//!
//! Defaults suit a local run. Override via environment variables or
//! explicit construction; the CLI layers its flags on top.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::retry::RetryPolicy;

/// Configuration for one ingestion run.
///
/// Custom `Debug` implementation redacts the `publish_token` field
/// to prevent credential leakage in log output.
#[derive(Clone)]
pub struct IngestConfig {
    /// Prefix of every store key. Default: `artifacts/`.
    pub store_prefix: String,
    /// Public base URL used for canonical file URLs.
    pub base_url: Url,
    /// Public endpoint for `Repr-Digest` existence probes. When unset the
    /// store's listing is used instead.
    pub probe_url: Option<Url>,
    /// Endpoint that accepts published artifact metadata.
    pub publish_url: Option<Url>,
    /// Shared secret for `publish_url`.
    pub publish_token: Option<String>,
    /// Previously published listing, used for identifier reuse.
    pub listing_path: Option<PathBuf>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum number of concurrent fetches.
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestConfig")
            .field("store_prefix", &self.store_prefix)
            .field("base_url", &self.base_url)
            .field("probe_url", &self.probe_url)
            .field("publish_url", &self.publish_url)
            .field("publish_token", &self.publish_token.as_ref().map(|_| "[REDACTED]"))
            .field("listing_path", &self.listing_path)
            .field("timeout_secs", &self.timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("retry", &self.retry)
            .finish()
    }
}

const DEFAULT_STORE_PREFIX: &str = "artifacts/";
const DEFAULT_BASE_URL: &str = "https://files.acearchive.lgbt";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONCURRENCY: usize = 4;

impl IngestConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `ARTIFACT_STORE_PREFIX` (default: `artifacts/`)
    /// - `ARTIFACT_BASE_URL` (default: `https://files.acearchive.lgbt`)
    /// - `ARTIFACT_PROBE_URL` (optional)
    /// - `ARTIFACT_PUBLISH_URL`, `ARTIFACT_PUBLISH_TOKEN` (optional)
    /// - `ARTIFACT_LISTING_PATH` (optional)
    /// - `ARTIFACT_HTTP_TIMEOUT_SECS` (default: 60)
    /// - `ARTIFACT_CONCURRENCY` (default: 4)
    /// - `ARTIFACT_RETRIES` (default: 0)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let invalid_url = |var: &str, e: url::ParseError| {
            ConfigError::InvalidUrl(var.to_string(), e.to_string())
        };
        let url = |var: &str| -> Result<Option<Url>, ConfigError> {
            lookup(var)
                .map(|raw| Url::parse(&raw).map_err(|e| invalid_url(var, e)))
                .transpose()
        };
        let number = |var: &str, default: u64| -> Result<u64, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                    var: var.to_string(),
                    value: raw,
                }),
            }
        };

        let base_url = match url("ARTIFACT_BASE_URL")? {
            Some(url) => url,
            None => {
                Url::parse(DEFAULT_BASE_URL).map_err(|e| invalid_url("ARTIFACT_BASE_URL", e))?
            }
        };

        let concurrency = number("ARTIFACT_CONCURRENCY", DEFAULT_CONCURRENCY as u64)?;
        let retries = number("ARTIFACT_RETRIES", 0)?;

        let config = Self {
            store_prefix: lookup("ARTIFACT_STORE_PREFIX")
                .unwrap_or_else(|| DEFAULT_STORE_PREFIX.to_string()),
            base_url,
            probe_url: url("ARTIFACT_PROBE_URL")?,
            publish_url: url("ARTIFACT_PUBLISH_URL")?,
            publish_token: lookup("ARTIFACT_PUBLISH_TOKEN"),
            listing_path: lookup("ARTIFACT_LISTING_PATH").map(PathBuf::from),
            timeout_secs: number("ARTIFACT_HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            concurrency: usize::try_from(concurrency).unwrap_or(usize::MAX),
            retry: RetryPolicy::new(u32::try_from(retries).unwrap_or(u32::MAX)),
        };
        config.check()?;
        Ok(config)
    }

    /// Reject values no run can work with.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.publish_url.is_some() && self.publish_token.is_none() {
            return Err(ConfigError::MissingToken);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// An HTTP client honoring the configured timeout.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .user_agent(concat!("artifact-submit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("{var} must be a non-negative integer, got \"{value}\"")]
    InvalidNumber { var: String, value: String },
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("ARTIFACT_PUBLISH_TOKEN is required when a publish URL is set")]
    MissingToken,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
