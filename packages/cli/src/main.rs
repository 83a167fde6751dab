#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `site_sync`: publishes a static site build to an S3 bucket.
//!
//! `prepare` runs after the site build and writes the deploy bundle;
//! `deploy` (the default command) reads it and syncs the build output.
//!
//! Uses `indicatif-log-bridge` (via [`site_sync_cli_utils::init_logger`])
//! so log lines and progress bars never fight for the terminal.

mod deploy;
mod prepare;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use site_sync_build::bundle::DEFAULT_BUNDLE_DIR;

#[derive(Parser)]
#[command(name = "site_sync", about = "Publish a static site build to an S3 bucket")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Used when no subcommand is given
    #[command(flatten)]
    deploy: deploy::DeployArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy the build. The bucket is created if it does not exist,
    /// otherwise it is updated.
    Deploy(deploy::DeployArgs),
    /// Compile redirects and upload parameters into the deploy bundle
    Prepare {
        /// Site manifest (JSON with `redirects` and `pages`)
        #[arg(long)]
        manifest: PathBuf,
        /// Deploy configuration (JSON, same shape as `s3.config.json`)
        #[arg(long)]
        config: PathBuf,
        /// Directory the bundle is written to
        #[arg(long, default_value = DEFAULT_BUNDLE_DIR)]
        cache_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = site_sync_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        None => deploy::run(cli.deploy, &multi).await?,
        Some(Commands::Deploy(args)) => deploy::run(args, &multi).await?,
        Some(Commands::Prepare {
            manifest,
            config,
            cache_dir,
        }) => prepare::run(&manifest, &config, &cache_dir)?,
    }

    Ok(())
}
