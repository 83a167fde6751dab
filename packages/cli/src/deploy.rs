//! The `deploy` command.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use console::style;
use dialoguer::Confirm;
use site_sync_build::bundle::{Bundle, DEFAULT_BUNDLE_DIR};
use site_sync_cli_utils::{IndicatifObserver, MultiProgress};
use site_sync_engine::{DeployError, DeployReport, Deployer};
use site_sync_storage::BucketInfo;
use site_sync_storage::s3::S3Store;

/// Directory the site build writes its output to.
const DEFAULT_PUBLIC_DIR: &str = "public";

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct DeployArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
    /// Bucket name (overrides the configured bucket)
    #[arg(short, long)]
    pub bucket: Option<String>,
    /// Directory holding the deploy bundle
    #[arg(long, default_value = DEFAULT_BUNDLE_DIR)]
    pub cache_dir: PathBuf,
    /// Build output to publish
    #[arg(long, default_value = DEFAULT_PUBLIC_DIR)]
    pub public_dir: PathBuf,
}

impl Default for DeployArgs {
    fn default() -> Self {
        Self {
            yes: false,
            bucket: None,
            cache_dir: PathBuf::from(DEFAULT_BUNDLE_DIR),
            public_dir: PathBuf::from(DEFAULT_PUBLIC_DIR),
        }
    }
}

/// Whether the confirmation prompt can be skipped.
fn skip_confirmation(yes: bool) -> bool {
    yes || std::env::var_os("CI").is_some()
}

/// Loads the bundle and applies `--bucket`.
fn load_bundle(args: &DeployArgs) -> Result<Bundle, DeployError> {
    let mut bundle = Bundle::load(&args.cache_dir)?;
    if let Some(bucket) = &args.bucket {
        bundle.config.bucket_name.clone_from(bucket);
    }
    Ok(bundle)
}

fn confirm(deployer: &Deployer, info: &BucketInfo) -> Result<bool, dialoguer::Error> {
    let action = if info.exists {
        format!(
            "{} {}",
            style("UPDATE").bold().blue(),
            style("(any existing website configuration will be overwritten!)").dim()
        )
    } else {
        style("CREATE").bold().green().to_string()
    };

    println!();
    println!(
        "    {} {}",
        style("Please review the following:").underlined(),
        style("(pass -y next time to skip this)").dim()
    );
    println!();
    println!(
        "    Deploying to bucket: {}",
        style(&deployer.config().bucket_name).cyan().bold()
    );
    println!(
        "    In region: {}",
        style(info.region.as_deref().unwrap_or("UNKNOWN!")).yellow().bold()
    );
    println!("    site_sync will: {action}");
    println!();

    Confirm::new().with_prompt("OK?").default(false).interact()
}

fn print_report(report: &DeployReport) {
    println!();
    println!("    {}", report.stats);
    match &report.website_url {
        Some(url) => {
            println!("    {}", style("Your website is online at:").bold());
            println!("    {}", style(url).blue().underlined());
        }
        None => {
            println!("    {}", style("Your website has now been published to:").bold());
            println!("    {}", style(&report.bucket).blue().underlined());
        }
    }
    println!();
}

/// Runs `deploy`.
///
/// # Errors
///
/// * If the bundle cannot be loaded or is invalid
/// * If the user declines the confirmation prompt
/// * If any bucket operation or upload fails
pub async fn run(args: DeployArgs, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let bundle = load_bundle(&args)?;
    bundle.config.validate().map_err(DeployError::from)?;

    let config = &bundle.config;
    let store = S3Store::from_env(
        config.region.as_deref(),
        config.custom_aws_endpoint_hostname.as_deref(),
    )
    .await;

    let observer = Arc::new(IndicatifObserver::new(multi));
    let deployer =
        Deployer::new(Arc::new(store), bundle, args.public_dir)?.with_observer(observer);

    log::info!("Retrieving bucket info for {}", deployer.config().bucket_name);
    let info = deployer.probe().await?;

    if !skip_confirmation(args.yes) && !confirm(&deployer, &info)? {
        return Err(DeployError::Aborted.into());
    }

    let report = deployer.run(&info).await?;
    print_report(&report);

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use site_sync_build::bundle::{SiteManifest, prepare};
    use site_sync_models::DeployConfig;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: DeployArgs,
    }

    #[test]
    fn parses_short_flags_and_defaults() {
        let args = Harness::parse_from(["site_sync", "-y", "-b", "other"]).args;
        assert!(args.yes);
        assert_eq!(args.bucket.as_deref(), Some("other"));
        assert_eq!(args.cache_dir, PathBuf::from(DEFAULT_BUNDLE_DIR));
        assert_eq!(args.public_dir, PathBuf::from(DEFAULT_PUBLIC_DIR));
    }

    #[test]
    fn yes_flag_skips_confirmation() {
        assert!(skip_confirmation(true));
    }

    #[test]
    fn bucket_flag_overrides_configured_bucket() {
        let dir = tempfile::tempdir().unwrap();
        prepare(DeployConfig::for_bucket("configured"), &SiteManifest::default())
            .unwrap()
            .write(dir.path())
            .unwrap();

        let args = DeployArgs {
            bucket: Some("override".to_string()),
            cache_dir: dir.path().to_path_buf(),
            ..DeployArgs::default()
        };

        assert_eq!(load_bundle(&args).unwrap().config.bucket_name, "override");
    }

    #[test]
    fn missing_bundle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = DeployArgs {
            cache_dir: dir.path().join("missing"),
            ..DeployArgs::default()
        };
        assert!(matches!(load_bundle(&args), Err(DeployError::Build(_))));
    }
}
