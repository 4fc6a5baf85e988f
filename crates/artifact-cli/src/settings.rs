//! Flags shared by every subcommand, layered over the environment.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use artifact_ingest::{IdentifierAuthority, IngestConfig, ListingAuthority, NoHistory, RetryPolicy};
use clap::Args;
use url::Url;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Directory containing one `<slug>.json` file per submission.
    #[arg(long, default_value = "submissions")]
    pub dir: PathBuf,

    /// Prefix of every key in the content store [env: ARTIFACT_STORE_PREFIX].
    #[arg(long)]
    pub store_prefix: Option<String>,

    /// Public base URL for canonical file URLs [env: ARTIFACT_BASE_URL].
    #[arg(long)]
    pub base_url: Option<Url>,

    /// Published artifact listing, read for id history and written on
    /// upload [env: ARTIFACT_LISTING_PATH].
    #[arg(long)]
    pub listing: Option<PathBuf>,

    /// Maximum concurrent source fetches [env: ARTIFACT_CONCURRENCY].
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Retries after a transport error [env: ARTIFACT_RETRIES].
    #[arg(long)]
    pub retries: Option<u32>,

    /// HTTP request timeout in seconds [env: ARTIFACT_HTTP_TIMEOUT_SECS].
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl RunArgs {
    /// The environment configuration with these flags applied on top.
    pub fn config(&self) -> Result<IngestConfig> {
        let config = IngestConfig::from_env().context("invalid configuration in environment")?;
        self.apply(config)
    }

    pub fn apply(&self, mut config: IngestConfig) -> Result<IngestConfig> {
        if let Some(prefix) = &self.store_prefix {
            config.store_prefix = prefix.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(listing) = &self.listing {
            config.listing_path = Some(listing.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(retries) = self.retries {
            config.retry = RetryPolicy::new(retries);
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        config.check().context("invalid configuration")?;
        tracing::debug!(?config, "Resolved configuration");
        Ok(config)
    }
}

/// Id history from the configured listing, if any.
pub fn authority(config: &IngestConfig) -> Result<Arc<dyn IdentifierAuthority>> {
    match &config.listing_path {
        Some(path) => {
            let authority = ListingAuthority::load(path).with_context(|| {
                format!("failed to load artifact history from {}", path.display())
            })?;
            Ok(Arc::new(authority))
        }
        None => Ok(Arc::new(NoHistory)),
    }
}
