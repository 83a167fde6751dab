//! Deploy configuration document (`s3.config.json`).

use serde::{Deserialize, Serialize};

use crate::params::ParamRule;

/// Default canned ACL applied to created buckets and uploaded objects.
pub const DEFAULT_ACL: &str = "public-read";

/// Default number of concurrent uploads.
pub const DEFAULT_PARALLEL_LIMIT: usize = 20;

/// Errors raised while validating a [`DeployConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No bucket name was configured.
    #[error("\"bucketName\" is a required option")]
    MissingBucketName,

    /// Only one half of the absolute redirect base was configured.
    #[error("Please either provide both 'hostname' and 'protocol', or neither of them.")]
    ProtocolHostnameMismatch,

    /// Upload concurrency of zero would never make progress.
    #[error("\"parallelLimit\" must be at least 1")]
    ZeroParallelLimit,
}

/// Settings shared by the build-completion and deploy halves.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    /// Target bucket.
    #[serde(default)]
    pub bucket_name: String,
    /// Region the bucket lives in (or should be created in).
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override for S3-compatible providers.
    #[serde(default)]
    pub custom_aws_endpoint_hostname: Option<String>,
    /// Protocol of the absolute redirect base.
    #[serde(default)]
    pub protocol: Option<String>,
    /// Host name of the absolute redirect base.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Canned ACL; `null` in the document disables ACLs entirely.
    #[serde(default = "default_acl")]
    pub acl: Option<String>,
    /// User upload-parameter overrides, in declaration order.
    #[serde(default, with = "crate::params::ordered_rules")]
    pub params: Vec<ParamRule>,
    /// Merge the built-in caching table ahead of user params.
    #[serde(default = "default_true")]
    pub merge_caching_params: bool,
    /// Produce routing rules at all.
    #[serde(default = "default_true")]
    pub generate_routing_rules: bool,
    /// Demote permanent redirects to redirect objects.
    #[serde(default)]
    pub generate_redirect_objects_for_permanent_redirects: bool,
    /// Route a `/` redirect through the index page.
    #[serde(default = "default_true")]
    pub generate_index_page_for_redirect: bool,
    /// Turn client-side match paths into rewrites.
    #[serde(default = "default_true")]
    pub generate_match_path_rewrites: bool,
    /// Extra condition attached to rewrite-derived rules.
    #[serde(default)]
    pub http_error_code_returned_equals: Option<String>,
    /// Delete remote objects that are no longer part of the build.
    #[serde(default)]
    pub remove_nonexistent_objects: bool,
    /// Apply the bucket website configuration.
    #[serde(default = "default_true")]
    pub enable_s3_static_website_hosting: bool,
    /// Maximum number of concurrent uploads.
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,
}

fn default_acl() -> Option<String> {
    Some(DEFAULT_ACL.to_string())
}

const fn default_true() -> bool {
    true
}

const fn default_parallel_limit() -> usize {
    DEFAULT_PARALLEL_LIMIT
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            region: None,
            custom_aws_endpoint_hostname: None,
            protocol: None,
            hostname: None,
            acl: default_acl(),
            params: Vec::new(),
            merge_caching_params: true,
            generate_routing_rules: true,
            generate_redirect_objects_for_permanent_redirects: false,
            generate_index_page_for_redirect: true,
            generate_match_path_rewrites: true,
            http_error_code_returned_equals: None,
            remove_nonexistent_objects: false,
            enable_s3_static_website_hosting: true,
            parallel_limit: DEFAULT_PARALLEL_LIMIT,
        }
    }
}

impl DeployConfig {
    /// Creates a configuration for `bucket_name` with every other option at
    /// its default.
    #[must_use]
    pub fn for_bucket(bucket_name: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            ..Self::default()
        }
    }

    /// Checks the settings that must hold before any network call.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_name.trim().is_empty() {
            return Err(ConfigError::MissingBucketName);
        }
        if self.protocol.is_some() != self.hostname.is_some() {
            return Err(ConfigError::ProtocolHostnameMismatch);
        }
        if self.parallel_limit == 0 {
            return Err(ConfigError::ZeroParallelLimit);
        }
        Ok(())
    }

    /// `protocol://hostname` when both halves are configured.
    #[must_use]
    pub fn redirect_base(&self) -> Option<String> {
        match (&self.protocol, &self.hostname) {
            (Some(protocol), Some(hostname)) => Some(format!("{protocol}://{hostname}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: DeployConfig = serde_json::from_str(r#"{"bucketName":"site"}"#).unwrap();
        assert_eq!(config.bucket_name, "site");
        assert_eq!(config.acl.as_deref(), Some(DEFAULT_ACL));
        assert!(config.merge_caching_params);
        assert!(!config.remove_nonexistent_objects);
        assert!(!config.generate_redirect_objects_for_permanent_redirects);
        assert_eq!(config.parallel_limit, DEFAULT_PARALLEL_LIMIT);
    }

    #[test]
    fn explicit_null_acl_disables_acl() {
        let config: DeployConfig =
            serde_json::from_str(r#"{"bucketName":"site","acl":null}"#).unwrap();
        assert_eq!(config.acl, None);
    }

    #[test]
    fn rejects_missing_bucket() {
        let config = DeployConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingBucketName)
        ));
    }

    #[test]
    fn rejects_protocol_without_hostname() {
        let config = DeployConfig {
            protocol: Some("https".to_string()),
            ..DeployConfig::for_bucket("site")
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProtocolHostnameMismatch)
        ));
    }

    #[test]
    fn builds_redirect_base_from_both_halves() {
        let config = DeployConfig {
            protocol: Some("https".to_string()),
            hostname: Some("example.com".to_string()),
            ..DeployConfig::for_bucket("site")
        };
        assert!(config.validate().is_ok());
        assert_eq!(
            config.redirect_base().as_deref(),
            Some("https://example.com")
        );
    }
}
