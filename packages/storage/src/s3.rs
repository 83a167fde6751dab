//! [`ObjectStore`] backed by AWS S3 or an S3-compatible endpoint.
//!
//! # Environment Variables
//!
//! Credentials and the default region come from the AWS default provider
//! chain (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_PROFILE`,
//! `AWS_REGION`, instance roles, ...). The configuration document may pin
//! the region and an endpoint override.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::StalledStreamProtectionConfig;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, Condition, CreateBucketConfiguration, Delete,
    ErrorDocument, IndexDocument, ObjectCannedAcl, ObjectIdentifier, Protocol, Redirect,
    RoutingRule as S3RoutingRule, WebsiteConfiguration,
};
use site_sync_models::{ObjectSource, RemoteObject, RoutingRule, UploadTask};

use crate::{BucketInfo, ListPage, ObjectStore, StorageError, WebsiteConfig, clean_etag};

/// Region S3 treats as the default; it must not be sent as a location
/// constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Error code S3 answers with for a bucket that does not exist.
const NO_SUCH_BUCKET: &str = "NoSuchBucket";

/// S3 client wrapper implementing [`ObjectStore`].
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// Wraps an already configured client.
    #[must_use]
    pub const fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Builds a client from the AWS default provider chain.
    ///
    /// `region` overrides the chain's region. `endpoint` points the client
    /// at an S3-compatible provider and switches to path-style addressing.
    pub async fn from_env(region: Option<&str>, endpoint: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled());
        if let Some(endpoint) = endpoint {
            let endpoint = if endpoint.contains("://") {
                endpoint.to_string()
            } else {
                format!("https://{endpoint}")
            };
            log::debug!("using custom S3 endpoint {endpoint}");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(aws_sdk_s3::Client::from_conf(builder.build()))
    }

    fn client_region(&self) -> Option<String> {
        self.client.config().region().map(ToString::to_string)
    }
}

fn to_s3_rule(rule: &RoutingRule) -> S3RoutingRule {
    let condition = Condition::builder()
        .key_prefix_equals(&rule.condition.key_prefix_equals)
        .set_http_error_code_returned_equals(rule.condition.http_error_code_returned_equals.clone())
        .build();

    let redirect = Redirect::builder()
        .replace_key_with(&rule.redirect.replace_key_with)
        .http_redirect_code(rule.redirect.http_redirect_code.as_str())
        .set_protocol(rule.redirect.protocol.as_deref().map(Protocol::from))
        .set_host_name(rule.redirect.host_name.clone())
        .build();

    S3RoutingRule::builder()
        .condition(condition)
        .redirect(redirect)
        .build()
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn probe_bucket(&self, bucket: &str) -> Result<BucketInfo, StorageError> {
        let result = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await;

        match result {
            Ok(output) => {
                // An empty constraint means the bucket lives in us-east-1.
                let region = output
                    .location_constraint()
                    .map(BucketLocationConstraint::as_str)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .or_else(|| self.client_region());
                Ok(BucketInfo {
                    exists: true,
                    region,
                })
            }
            Err(err) => {
                if err.as_service_error().and_then(ProvideErrorMetadata::code) == Some(NO_SUCH_BUCKET)
                {
                    return Ok(BucketInfo {
                        exists: false,
                        region: self.client_region(),
                    });
                }
                Err(StorageError::Probe {
                    bucket: bucket.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        region: Option<&str>,
        acl: Option<&str>,
    ) -> Result<(), StorageError> {
        log::debug!("create_bucket {bucket} (region {region:?}, acl {acl:?})");

        let configuration = region.filter(|r| *r != DEFAULT_REGION).map(|region| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build()
        });

        self.client
            .create_bucket()
            .bucket(bucket)
            .set_acl(acl.map(BucketCannedAcl::from))
            .set_create_bucket_configuration(configuration)
            .send()
            .await
            .map_err(|e| StorageError::CreateBucket {
                bucket: bucket.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }

    async fn put_website(&self, bucket: &str, website: &WebsiteConfig) -> Result<(), StorageError> {
        let website_error = |e: aws_sdk_s3::error::BuildError| StorageError::Website {
            bucket: bucket.to_string(),
            source: Box::new(e),
        };

        let index = IndexDocument::builder()
            .suffix(&website.index_document)
            .build()
            .map_err(website_error)?;
        let error = ErrorDocument::builder()
            .key(&website.error_document)
            .build()
            .map_err(website_error)?;

        let rules = (!website.routing_rules.is_empty())
            .then(|| website.routing_rules.iter().map(to_s3_rule).collect::<Vec<_>>());

        let configuration = WebsiteConfiguration::builder()
            .index_document(index)
            .error_document(error)
            .set_routing_rules(rules)
            .build();

        log::debug!(
            "put_bucket_website {bucket} ({} routing rule(s))",
            website.routing_rules.len()
        );

        self.client
            .put_bucket_website()
            .bucket(bucket)
            .website_configuration(configuration)
            .send()
            .await
            .map_err(|e| StorageError::Website {
                bucket: bucket.to_string(),
                source: Box::new(e),
            })?;

        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| StorageError::List {
                bucket: bucket.to_string(),
                source: Box::new(e),
            })?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(RemoteObject {
                    key: obj.key()?.to_string(),
                    fingerprint: clean_etag(obj.e_tag().unwrap_or_default()).to_string(),
                })
            })
            .collect();

        let next_continuation_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(String::from)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_continuation_token,
        })
    }

    async fn put_object(&self, bucket: &str, task: &UploadTask) -> Result<(), StorageError> {
        let body = match &task.source {
            ObjectSource::File(path) => {
                ByteStream::from_path(path)
                    .await
                    .map_err(|e| StorageError::Io {
                        key: task.key.clone(),
                        source: std::io::Error::other(e),
                    })?
            }
            ObjectSource::Inline(bytes) => ByteStream::from(bytes.clone()),
        };

        let params = &task.params;
        let metadata = (!params.metadata.is_empty()).then(|| {
            params
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<HashMap<_, _>>()
        });

        self.client
            .put_object()
            .bucket(bucket)
            .key(&task.key)
            .body(body)
            .content_type(&task.content_type)
            .set_acl(params.acl.as_deref().map(ObjectCannedAcl::from))
            .set_cache_control(params.cache_control.clone())
            .set_content_disposition(params.content_disposition.clone())
            .set_content_encoding(params.content_encoding.clone())
            .set_content_language(params.content_language.clone())
            .set_website_redirect_location(params.website_redirect_location.clone())
            .set_metadata(metadata)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                bucket: bucket.to_string(),
                key: task.key.clone(),
                source: Box::new(e),
            })?;

        Ok(())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), StorageError> {
        let delete_error = |source: Box<dyn std::error::Error + Send + Sync>| StorageError::Delete {
            bucket: bucket.to_string(),
            count: keys.len(),
            source,
        };

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| delete_error(Box::new(e)))?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| delete_error(Box::new(e)))?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| delete_error(Box::new(e)))?;

        let failures: Vec<String> = output
            .errors()
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.key().unwrap_or("<unknown>"),
                    e.message().unwrap_or("unknown error")
                )
            })
            .collect();
        if !failures.is_empty() {
            return Err(delete_error(failures.join(", ").into()));
        }

        Ok(())
    }
}
