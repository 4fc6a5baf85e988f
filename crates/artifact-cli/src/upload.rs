//! # Upload Subcommand
//!
//! Verifies and stores every file of the (already validated) submissions,
//! then publishes the artifact metadata either to the configured endpoint
//! or to the listing file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use artifact_core::AlgorithmRegistry;
use artifact_ingest::{
    HttpFetcher, HttpMetadataPublisher, IngestConfig, IngestionPipeline, JsonListingPublisher,
    MetadataPublisher,
};
use artifact_store::{ContentStore, FsContentStore, ProbedStore, ReprDigestProbe};
use clap::Args;
use url::Url;

use crate::report_failure;
use crate::settings::{self, RunArgs};
use crate::submissions;

#[derive(Args, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Root directory of the content store.
    #[arg(long)]
    pub store_root: PathBuf,

    /// Check for existing files with `HEAD` requests against this public
    /// endpoint instead of listing the store [env: ARTIFACT_PROBE_URL].
    #[arg(long)]
    pub probe_url: Option<Url>,

    /// Send artifact metadata to this endpoint instead of the listing file
    /// [env: ARTIFACT_PUBLISH_URL]. Requires ARTIFACT_PUBLISH_TOKEN.
    #[arg(long)]
    pub publish_url: Option<Url>,
}

impl UploadArgs {
    fn config(&self) -> Result<IngestConfig> {
        let mut config = self.run.config()?;
        if let Some(probe_url) = &self.probe_url {
            config.probe_url = Some(probe_url.clone());
        }
        if let Some(publish_url) = &self.publish_url {
            config.publish_url = Some(publish_url.clone());
        }
        config.check().context("invalid configuration")?;
        Ok(config)
    }
}

fn content_store(
    args: &UploadArgs,
    config: &IngestConfig,
    client: &reqwest::Client,
    registry: &Arc<AlgorithmRegistry>,
) -> Arc<dyn ContentStore> {
    let fs = FsContentStore::new(&args.store_root, config.store_prefix.clone());
    match &config.probe_url {
        Some(probe_url) => {
            let probe = ReprDigestProbe::new(
                client.clone(),
                probe_url.clone(),
                config.store_prefix.clone(),
                Arc::clone(registry),
            );
            Arc::new(ProbedStore::new(probe, fs))
        }
        None => Arc::new(fs),
    }
}

fn publisher(
    config: &IngestConfig,
    client: &reqwest::Client,
) -> Result<Arc<dyn MetadataPublisher>> {
    if let (Some(url), Some(token)) = (&config.publish_url, &config.publish_token) {
        let publisher = HttpMetadataPublisher::new(client.clone(), url.clone(), token.clone())
            .with_retry(config.retry);
        return Ok(Arc::new(publisher));
    }
    let path = config
        .listing_path
        .clone()
        .context("nowhere to publish: set --listing or --publish-url")?;
    Ok(Arc::new(JsonListingPublisher::new(path)))
}

pub async fn run_upload(args: &UploadArgs) -> Result<u8> {
    let config = args.config()?;
    let files = submissions::read_dir(&args.run.dir)?;
    if files.is_empty() {
        println!("No submissions found in {}", args.run.dir.display());
        return Ok(0);
    }

    let registry = Arc::new(AlgorithmRegistry::builtin());
    let client = config.http_client()?;
    let store = content_store(args, &config, &client, &registry);
    let publisher = publisher(&config, &client)?;

    let pipeline = IngestionPipeline::new(
        Arc::new(HttpFetcher::new(client).with_retry(config.retry)),
        store,
        publisher,
        config.base_url.clone(),
    )
    .with_registry(registry)
    .with_authority(settings::authority(&config)?)
    .with_concurrency(config.concurrency);

    let records: Vec<_> = files.into_iter().map(|f| f.record).collect();
    let outcome = pipeline.upload(&records).await.map_err(report_failure)?;

    println!(
        "Uploaded {} file(s) ({} bytes), skipped {} already stored",
        outcome.report.files_uploaded, outcome.report.bytes_uploaded, outcome.report.files_skipped
    );
    println!("Published {} artifact(s)", outcome.artifacts.len());
    Ok(0)
}
