//! Bucket lifecycle: create the bucket when missing, apply website hosting,
//! and derive the public website URL.

use site_sync_models::{DeployConfig, RoutingRule};
use site_sync_storage::{BucketInfo, ObjectStore, StorageError, WebsiteConfig};

/// Region assumed when neither the bucket nor the configuration names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Regions whose website endpoint uses the dash form
/// (`s3-website-<region>`).
const LEGACY_WEBSITE_REGIONS: &[&str] = &[
    "us-east-1",
    "us-west-1",
    "us-west-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "eu-west-1",
    "sa-east-1",
    "us-gov-west-1",
];

/// Creates the bucket when `info` says it is missing, then applies the
/// website configuration when enabled.
///
/// Returns whether the bucket was created.
///
/// # Errors
///
/// Returns [`StorageError::CreateBucket`] or [`StorageError::Website`].
pub async fn ensure_bucket(
    store: &dyn ObjectStore,
    config: &DeployConfig,
    info: &BucketInfo,
    routing_rules: &[RoutingRule],
) -> Result<bool, StorageError> {
    let bucket = config.bucket_name.as_str();
    let created = !info.exists;

    if created {
        log::info!("Creating bucket {bucket}");
        store
            .create_bucket(bucket, config.region.as_deref(), config.acl.as_deref())
            .await?;
    }

    if config.enable_s3_static_website_hosting {
        log::info!(
            "Configuring static website hosting for {bucket} ({} routing rule(s))",
            routing_rules.len()
        );
        store
            .put_website(bucket, &WebsiteConfig::with_rules(routing_rules.to_vec()))
            .await?;
    }

    Ok(created)
}

/// Website endpoint domain for `region`.
#[must_use]
pub fn website_domain(region: Option<&str>) -> String {
    let region = region.filter(|r| !r.is_empty()).unwrap_or(DEFAULT_REGION);
    if LEGACY_WEBSITE_REGIONS.contains(&region) {
        format!("s3-website-{region}.amazonaws.com")
    } else {
        format!("s3-website.{region}.amazonaws.com")
    }
}

/// Public website URL of `bucket`.
#[must_use]
pub fn website_url(bucket: &str, region: Option<&str>) -> String {
    format!("http://{bucket}.{}", website_domain(region))
}
