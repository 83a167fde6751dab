#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Object storage capability used by the deploy engine.
//!
//! The engine only ever talks to an [`ObjectStore`]. Two implementations
//! ship with the crate:
//!
//! * [`s3::S3Store`]: AWS S3 (or any S3-compatible endpoint) through
//!   `aws-sdk-s3`, with credentials and region resolved by the AWS default
//!   provider chain.
//! * [`memory::MemoryStore`]: an in-process bucket for tests and dry runs.
//!
//! Retries belong to the transport (the AWS SDK's retry policy); nothing in
//! this crate retries on its own.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use site_sync_models::{RemoteObject, RoutingRule, UploadTask};

/// Index document served for directory-style requests.
pub const INDEX_DOCUMENT: &str = "index.html";

/// Document served for missing keys.
pub const ERROR_DOCUMENT: &str = "404.html";

/// Maximum number of keys a single batch delete request accepts.
pub const MAX_DELETE_BATCH: usize = 1000;

/// Errors that can occur talking to the bucket.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Probing the bucket failed for a reason other than "does not exist".
    #[error("Failed to probe bucket {bucket}: {source}")]
    Probe {
        /// Bucket name.
        bucket: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `CreateBucket` failed.
    #[error("Failed to create bucket {bucket}: {source}")]
    CreateBucket {
        /// Bucket name.
        bucket: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `PutBucketWebsite` failed.
    #[error("Failed to configure website hosting for {bucket}: {source}")]
    Website {
        /// Bucket name.
        bucket: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A `ListObjectsV2` page failed.
    #[error("Failed to list s3://{bucket}: {source}")]
    List {
        /// Bucket name.
        bucket: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `DeleteObjects` failed, either as a whole or for some keys.
    #[error("Failed to delete {count} object(s) from s3://{bucket}: {source}")]
    Delete {
        /// Bucket name.
        bucket: String,
        /// Number of keys in the failed batch.
        count: usize,
        /// Underlying SDK error or per-key failure summary.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Reading the local body of an upload failed.
    #[error("Failed to read body for {key}: {source}")]
    Io {
        /// Object key being uploaded.
        key: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Result of probing a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    /// Whether the bucket already exists.
    pub exists: bool,
    /// Detected (or configured, when the bucket does not exist) region.
    pub region: Option<String>,
}

/// Website-hosting settings applied to a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteConfig {
    /// Index document suffix.
    pub index_document: String,
    /// Error document key.
    pub error_document: String,
    /// Routing rules, in priority order.
    pub routing_rules: Vec<RoutingRule>,
}

impl WebsiteConfig {
    /// Standard static-site configuration with the given routing rules.
    #[must_use]
    pub fn with_rules(routing_rules: Vec<RoutingRule>) -> Self {
        Self {
            index_document: INDEX_DOCUMENT.to_string(),
            error_document: ERROR_DOCUMENT.to_string(),
            routing_rules,
        }
    }
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Objects on this page.
    pub objects: Vec<RemoteObject>,
    /// Token for the next page; `None` on the last page.
    pub next_continuation_token: Option<String>,
}

/// Operations the deploy engine needs from a bucket.
///
/// Implementations must be safe to share across concurrently running
/// upload tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Checks whether `bucket` exists and where it lives. A missing bucket
    /// is reported as `exists: false`, not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Probe`] on any other failure.
    async fn probe_bucket(&self, bucket: &str) -> Result<BucketInfo, StorageError>;

    /// Creates `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::CreateBucket`] on failure.
    async fn create_bucket(
        &self,
        bucket: &str,
        region: Option<&str>,
        acl: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Replaces the bucket's website configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Website`] on failure.
    async fn put_website(&self, bucket: &str, website: &WebsiteConfig) -> Result<(), StorageError>;

    /// Fetches one page of the bucket listing.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] on failure.
    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StorageError>;

    /// Writes one object as a single-part upload.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Upload`] or [`StorageError::Io`] on failure.
    async fn put_object(&self, bucket: &str, task: &UploadTask) -> Result<(), StorageError>;

    /// Deletes up to [`MAX_DELETE_BATCH`] keys in one request.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Delete`] if the request fails or any key
    /// could not be deleted.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError>;
}

/// Strips the quotes providers wrap around content tags.
#[must_use]
pub fn clean_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_etag_quotes() {
        assert_eq!(clean_etag("\"abc\""), "abc");
        assert_eq!(clean_etag("abc"), "abc");
    }

    #[test]
    fn website_config_uses_static_site_documents() {
        let website = WebsiteConfig::with_rules(Vec::new());
        assert_eq!(website.index_document, INDEX_DOCUMENT);
        assert_eq!(website.error_document, ERROR_DOCUMENT);
    }
}
