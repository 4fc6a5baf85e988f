//! # Validate Subcommand
//!
//! Validates every submission in the directory, fills in missing ids,
//! digests and media types, and writes changed submissions back in place.

use std::sync::Arc;

use anyhow::Result;
use artifact_ingest::{HttpFetcher, IngestionPipeline, MemoryPublisher};
use artifact_store::MemoryContentStore;
use clap::Args;

use crate::report_failure;
use crate::settings::{self, RunArgs};
use crate::submissions;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Do not write anything; exit with status 1 if a submission would change.
    #[arg(long)]
    pub check: bool,
}

pub async fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let config = args.run.config()?;
    let files = submissions::read_dir(&args.run.dir)?;
    if files.is_empty() {
        println!("No submissions found in {}", args.run.dir.display());
        return Ok(0);
    }

    let client = config.http_client()?;
    let fetcher = HttpFetcher::new(client).with_retry(config.retry);
    // Validation never stores or publishes anything.
    let pipeline = IngestionPipeline::new(
        Arc::new(fetcher),
        Arc::new(MemoryContentStore::new(config.store_prefix.clone())),
        Arc::new(MemoryPublisher::new()),
        config.base_url.clone(),
    )
    .with_authority(settings::authority(&config)?)
    .with_concurrency(config.concurrency);

    let records: Vec<_> = files.iter().map(|f| f.record.clone()).collect();
    let outcome = pipeline.validate(&records).await.map_err(report_failure)?;

    let mut changed = Vec::new();
    for (file, (key, submission)) in files.iter().zip(&outcome.records) {
        debug_assert_eq!(&file.record.key, key);
        if args.check {
            if submissions::has_changed(&file.record, submission)? {
                changed.push(file);
            }
        } else if submissions::write_back(file, submission)? {
            changed.push(file);
        }
    }

    println!(
        "Validated {} submission(s): {} artifact(s) and {} file(s) updated",
        files.len(),
        outcome.report.artifacts_updated(),
        outcome.report.total_files_updated()
    );
    for file in &changed {
        let verb = if args.check { "needs update" } else { "updated" };
        println!("  {verb}: {}", file.path.display());
    }

    Ok(u8::from(args.check && !changed.is_empty()))
}
