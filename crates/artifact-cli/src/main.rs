//! # artifact-submit CLI entry point
//!
//! Parses command-line arguments, installs logging, and dispatches to the
//! subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use artifact_cli::upload::{run_upload, UploadArgs};
use artifact_cli::validate::{run_validate, ValidateArgs};

/// Validate, complete and upload artifact submissions.
#[derive(Parser, Debug)]
#[command(name = "artifact-submit", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate submissions and fill in generated fields.
    Validate(ValidateArgs),

    /// Upload files to the content store and publish artifact metadata.
    Upload(UploadArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "artifact-submit starting");

    let result = match &cli.command {
        Commands::Validate(args) => run_validate(args).await,
        Commands::Upload(args) => run_upload(args).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parse_validate_defaults() {
        let cli = Cli::try_parse_from(["artifact-submit", "validate"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.log_format, LogFormat::Text);
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.run.dir, PathBuf::from("submissions"));
                assert!(!args.check);
            }
            other => panic!("expected validate, got {other:?}"),
        }
    }

    #[test]
    fn parse_upload_requires_store_root() {
        assert!(Cli::try_parse_from(["artifact-submit", "upload"]).is_err());
        let cli = Cli::try_parse_from([
            "artifact-submit",
            "upload",
            "--store-root",
            "/srv/objects",
            "--probe-url",
            "https://files.example.org/",
        ])
        .unwrap();
        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.store_root, PathBuf::from("/srv/objects"));
                assert_eq!(args.probe_url.unwrap().as_str(), "https://files.example.org/");
            }
            other => panic!("expected upload, got {other:?}"),
        }
    }

    #[test]
    fn parse_verbosity_and_json_logs() {
        let cli =
            Cli::try_parse_from(["artifact-submit", "-vv", "--log-format", "json", "validate"])
                .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn no_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["artifact-submit"]).is_err());
    }
}
