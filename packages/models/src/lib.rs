#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for publishing a static site build to an object-storage
//! bucket.
//!
//! The build-completion side (`site_sync_build`) produces redirects,
//! routing rules, and upload parameters. The deploy side
//! (`site_sync_engine`) consumes them together with the local build output
//! and the remote bucket listing to produce a [`SyncPlan`].

pub mod config;
pub mod events;
pub mod params;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use config::{ConfigError, DeployConfig};
pub use events::{NullObserver, SyncEvent, SyncObserver, null_observer};
pub use params::{ParamRule, UploadParams};

/// Maximum number of routing rules a bucket website configuration accepts.
pub const MAX_ROUTING_RULES: usize = 50;

/// Content type used when nothing better is known about an object.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A file found in the local build output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    /// Forward-slash key relative to the build output root.
    pub relative_key: String,
    /// Where the file lives on disk.
    pub absolute_path: PathBuf,
}

/// Snapshot of one object currently stored in the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Object key.
    pub key: String,
    /// Provider content tag with surrounding quotes removed.
    pub fingerprint: String,
}

impl RemoteObject {
    /// Whether the tag was produced by a multipart upload (`<digest>-<parts>`)
    /// and therefore cannot be compared with a plain content digest.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.fingerprint.contains('-')
    }
}

/// One redirect the site wants to express, before it is turned into a
/// routing rule or a redirect object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalRedirect {
    /// Path (or path prefix) being redirected.
    pub from_path: String,
    /// Where requests should go instead.
    pub to_path: String,
    /// `301` when `true`, `302` otherwise.
    #[serde(default)]
    pub is_permanent: bool,
    /// Whether this entry was synthesized from a client-side match path
    /// rather than declared as a redirect.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_rewrite: bool,
}

impl LogicalRedirect {
    /// Creates a declared (non-rewrite) redirect.
    #[must_use]
    pub fn new(from_path: impl Into<String>, to_path: impl Into<String>, is_permanent: bool) -> Self {
        Self {
            from_path: from_path.into(),
            to_path: to_path.into(),
            is_permanent,
            is_rewrite: false,
        }
    }

    /// Creates a rewrite entry. Rewrites are never permanent.
    #[must_use]
    pub fn rewrite(from_path: impl Into<String>, to_path: impl Into<String>) -> Self {
        Self {
            from_path: from_path.into(),
            to_path: to_path.into(),
            is_permanent: false,
            is_rewrite: true,
        }
    }
}

/// HTTP status code a routing rule redirects with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedirectCode {
    /// `301 Moved Permanently`.
    #[serde(rename = "301")]
    Permanent,
    /// `302 Found`.
    #[serde(rename = "302")]
    Temporary,
}

impl RedirectCode {
    /// Status code as the string the provider API expects.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "301",
            Self::Temporary => "302",
        }
    }
}

impl std::fmt::Display for RedirectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider routing rule, shaped like an S3 website `RoutingRule`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoutingRule {
    /// When the rule applies.
    pub condition: RoutingRuleCondition,
    /// What the rule does.
    pub redirect: RedirectRule,
}

/// Match condition of a [`RoutingRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoutingRuleCondition {
    /// Key prefix the request must start with.
    pub key_prefix_equals: String,
    /// Only redirect when the bucket would otherwise answer with this code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_error_code_returned_equals: Option<String>,
}

/// Redirect action of a [`RoutingRule`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RedirectRule {
    /// Key the matched request is redirected to.
    pub replace_key_with: String,
    /// Status code sent with the redirect.
    pub http_redirect_code: RedirectCode,
    /// Absolute protocol (paired with `host_name`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Absolute host name (paired with `protocol`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
}

/// Same rule in the serverless-framework document shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerlessRoutingRule {
    /// Equivalent of [`RoutingRule::condition`].
    pub routing_rule_condition: RoutingRuleCondition,
    /// Equivalent of [`RoutingRule::redirect`].
    pub redirect_rule: RedirectRule,
}

impl From<RoutingRule> for ServerlessRoutingRule {
    fn from(rule: RoutingRule) -> Self {
        Self {
            routing_rule_condition: rule.condition,
            redirect_rule: rule.redirect,
        }
    }
}

/// A permanent redirect stored as its own object carrying a
/// redirect-location header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectObject {
    /// Site path the object answers for.
    pub from_path: String,
    /// Redirect target, relative or absolute.
    pub to_path: String,
}

impl From<LogicalRedirect> for RedirectObject {
    fn from(redirect: LogicalRedirect) -> Self {
        Self {
            from_path: redirect.from_path,
            to_path: redirect.to_path,
        }
    }
}

/// Where an upload's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectSource {
    /// Stream the body from a local file.
    File(PathBuf),
    /// Small in-memory body (redirect objects).
    Inline(Vec<u8>),
}

/// One object write the scheduler has to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    /// Destination key.
    pub key: String,
    /// Body source.
    pub source: ObjectSource,
    /// Resolved `Content-Type`.
    pub content_type: String,
    /// Resolved per-key headers (cache control, ACL, redirect location, ...).
    pub params: UploadParams,
    /// Whether this task writes a redirect object.
    pub is_redirect: bool,
}

/// Actions needed to make the bucket match the local build.
///
/// Built once per run and consumed by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Local files that are new or changed, sorted by key.
    pub uploads: Vec<UploadTask>,
    /// Redirect objects that are new or changed, sorted by key.
    pub redirect_writes: Vec<UploadTask>,
    /// Keys already up to date remotely, sorted.
    pub retained: Vec<String>,
    /// Orphaned remote keys to remove, sorted and unique. Empty unless
    /// pruning is enabled.
    pub deletions: Vec<String>,
}

impl SyncPlan {
    /// Total number of object writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.uploads.len() + self.redirect_writes.len()
    }

    /// Whether the plan changes nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.write_count() == 0 && self.deletions.is_empty()
    }
}

/// Counts reported after a deploy finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Objects written (files and redirect objects).
    pub uploaded: u64,
    /// Keys skipped because the remote copy was identical.
    pub skipped: u64,
    /// Remote keys removed.
    pub deleted: u64,
}

impl std::fmt::Display for SyncStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped (unchanged), {} deleted",
            self.uploaded, self.skipped, self.deleted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_code_serializes_as_status_string() {
        let json = serde_json::to_string(&RedirectCode::Permanent).unwrap();
        assert_eq!(json, "\"301\"");
        let code: RedirectCode = serde_json::from_str("\"302\"").unwrap();
        assert_eq!(code, RedirectCode::Temporary);
    }

    #[test]
    fn routing_rule_uses_provider_field_names() {
        let rule = RoutingRule {
            condition: RoutingRuleCondition {
                key_prefix_equals: "old/".to_string(),
                http_error_code_returned_equals: None,
            },
            redirect: RedirectRule {
                replace_key_with: "new".to_string(),
                http_redirect_code: RedirectCode::Temporary,
                protocol: None,
                host_name: None,
            },
        };

        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["Condition"]["KeyPrefixEquals"], "old/");
        assert_eq!(value["Redirect"]["ReplaceKeyWith"], "new");
        assert_eq!(value["Redirect"]["HttpRedirectCode"], "302");
        assert!(value["Redirect"].get("Protocol").is_none());
    }

    #[test]
    fn redirect_object_reads_logical_redirect_documents() {
        let json = r#"[{"fromPath":"/old","toPath":"/new","isPermanent":true}]"#;
        let objects: Vec<RedirectObject> = serde_json::from_str(json).unwrap();
        assert_eq!(
            objects,
            vec![RedirectObject {
                from_path: "/old".to_string(),
                to_path: "/new".to_string(),
            }]
        );
    }

    #[test]
    fn multipart_tags_are_detected() {
        let single = RemoteObject {
            key: "a".to_string(),
            fingerprint: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        };
        let multi = RemoteObject {
            key: "b".to_string(),
            fingerprint: "d41d8cd98f00b204e9800998ecf8427e-3".to_string(),
        };
        assert!(!single.is_multipart());
        assert!(multi.is_multipart());
    }

    #[test]
    fn empty_plan_is_noop() {
        let plan = SyncPlan {
            retained: vec!["a.html".to_string()],
            ..SyncPlan::default()
        };
        assert!(plan.is_noop());
        assert_eq!(plan.write_count(), 0);
    }
}
