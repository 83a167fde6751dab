#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Deploy half of site-sync.
//!
//! Takes a prepared [`Bundle`] and a local build directory and makes the
//! bucket match it:
//!
//! 1. probe the bucket, create it if missing, apply website hosting
//! 2. list the remote state ([`lister`]) while walking and fingerprinting
//!    the build ([`planner::fingerprint_tree`])
//! 3. compute a [`SyncPlan`](site_sync_models::SyncPlan) ([`planner::plan`])
//! 4. run uploads and deletions ([`scheduler`])

pub mod bucket;
pub mod fingerprint;
pub mod lister;
pub mod params;
pub mod planner;
pub mod scheduler;
pub mod walk;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use site_sync_build::BuildError;
use site_sync_build::bundle::{Bundle, INDEX_KEY};
use site_sync_models::{
    ConfigError, DeployConfig, RedirectObject, SyncEvent, SyncObserver, SyncStats, null_observer,
};
use site_sync_storage::{BucketInfo, ObjectStore, StorageError};

use crate::params::ParamResolver;
use crate::planner::PlanOptions;

/// Errors that can end a deploy run.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The bundle could not be prepared or loaded.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A bucket operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// An upload-parameter pattern is not a valid glob.
    #[error("Invalid parameter pattern '{pattern}': {source}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Parse error.
        source: globset::Error,
    },

    /// The build output could not be traversed.
    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        /// Root of the walk.
        path: PathBuf,
        /// Traversal error.
        source: walkdir::Error,
    },

    /// The user declined the confirmation prompt.
    #[error("Aborted")]
    Aborted,

    /// A background task panicked or was cancelled.
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

/// Outcome of a successful deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// Upload, skip, and deletion counts.
    pub stats: SyncStats,
    /// Target bucket.
    pub bucket: String,
    /// Region the bucket lives in, when known.
    pub region: Option<String>,
    /// Whether this run created the bucket.
    pub created: bool,
    /// Public website URL, when website hosting is enabled.
    pub website_url: Option<String>,
}

/// Runs deploys of one bundle against one store.
pub struct Deployer {
    store: Arc<dyn ObjectStore>,
    bundle: Bundle,
    resolver: ParamResolver,
    public_dir: PathBuf,
    observer: Arc<dyn SyncObserver>,
}

impl Deployer {
    /// Creates a deployer that publishes `public_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Config`] if the bundle's configuration is
    /// invalid and [`DeployError::Pattern`] if a parameter glob does not
    /// compile. Both are checked before anything touches the bucket.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bundle: Bundle,
        public_dir: impl Into<PathBuf>,
    ) -> Result<Self, DeployError> {
        bundle.config.validate()?;
        let resolver = ParamResolver::new(&bundle.params)?;
        Ok(Self {
            store,
            bundle,
            resolver,
            public_dir: public_dir.into(),
            observer: null_observer(),
        })
    }

    /// Sends progress events to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Configuration the deploy runs with.
    #[must_use]
    pub const fn config(&self) -> &DeployConfig {
        &self.bundle.config
    }

    /// Build output being published.
    #[must_use]
    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    /// Checks whether the target bucket exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Probe`] for failures other than "not found".
    pub async fn probe(&self) -> Result<BucketInfo, DeployError> {
        Ok(self.store.probe_bucket(&self.config().bucket_name).await?)
    }

    /// Makes the bucket match the build output.
    ///
    /// `info` is the result of [`Self::probe`]; callers typically ask for
    /// confirmation in between.
    ///
    /// # Errors
    ///
    /// Any bucket, traversal, or parameter error ends the run. Deletions
    /// only happen after every upload succeeded.
    pub async fn run(&self, info: &BucketInfo) -> Result<DeployReport, DeployError> {
        let config = self.config();
        let bucket = config.bucket_name.as_str();
        let limit = config.parallel_limit;

        let created = crate::bucket::ensure_bucket(
            self.store.as_ref(),
            config,
            info,
            &self.bundle.routing_rules,
        )
        .await?;
        let region = info.region.clone().or_else(|| config.region.clone());

        log::info!("Listing {bucket} and fingerprinting {}", self.public_dir.display());
        let listing = async {
            let remote = lister::list_all(self.store.as_ref(), bucket).await?;
            self.observer.notify(SyncEvent::Listed {
                objects: remote.len() as u64,
            });
            Ok::<_, DeployError>(remote)
        };
        let (remote, assets) = tokio::try_join!(
            listing,
            planner::fingerprint_tree(&self.public_dir, limit, &self.observer)
        )?;
        log::info!("  {} local file(s)", assets.len());

        let mut redirects = self.bundle.redirect_objects.clone();
        if let Some(location) = self.bundle.index_redirect_location()
            && !assets.iter().any(|a| walk::normalize_key(&a.asset.relative_key) == INDEX_KEY)
        {
            log::info!("No {INDEX_KEY} in the build, writing a root redirect to {location}");
            redirects.push(RedirectObject {
                from_path: "/".to_string(),
                to_path: location.to_string(),
            });
        }

        let options = PlanOptions {
            acl: config.acl.clone(),
            redirect_base: config.redirect_base(),
            prune: config.remove_nonexistent_objects,
        };
        let plan = planner::plan(&assets, &remote, &redirects, &self.resolver, &options);
        log::info!(
            "Plan: {} upload(s), {} redirect object(s), {} unchanged, {} deletion(s)",
            plan.uploads.len(),
            plan.redirect_writes.len(),
            plan.retained.len(),
            plan.deletions.len()
        );
        self.observer.notify(SyncEvent::Planned {
            uploads: plan.write_count() as u64,
            skipped: plan.retained.len() as u64,
            deletions: plan.deletions.len() as u64,
        });

        let stats =
            scheduler::execute(Arc::clone(&self.store), bucket, plan, limit, &self.observer).await?;
        log::info!("Deploy finished: {stats}");

        let website_url = config
            .enable_s3_static_website_hosting
            .then(|| crate::bucket::website_url(bucket, region.as_deref()));

        Ok(DeployReport {
            stats,
            bucket: bucket.to_string(),
            region,
            created,
            website_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use site_sync_build::bundle::{SiteManifest, prepare};
    use site_sync_models::params::{NO_CACHE, ParamRule, UploadParams};
    use site_sync_models::LogicalRedirect;
    use site_sync_storage::memory::MemoryStore;

    use super::*;

    fn write(dir: &Path, key: &str, body: &str) {
        let path = dir.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    fn bundle(config: DeployConfig) -> Bundle {
        prepare(config, &SiteManifest::default()).unwrap()
    }

    async fn deploy(store: &Arc<MemoryStore>, bundle: Bundle, dir: &Path) -> DeployReport {
        let store: Arc<dyn ObjectStore> = store.clone();
        let deployer = Deployer::new(store, bundle, dir).unwrap();
        let info = deployer.probe().await.unwrap();
        deployer.run(&info).await.unwrap()
    }

    #[tokio::test]
    async fn incremental_deploy_uploads_changes_and_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::existing("eu-central-1"));
        let mut config = DeployConfig::for_bucket("site");
        config.remove_nonexistent_objects = true;

        write(dir.path(), "a.html", "hi");
        write(dir.path(), "b.html", "bye");
        write(dir.path(), "c.html", "soon gone");
        let first = deploy(&store, bundle(config.clone()), dir.path()).await;
        assert_eq!(first.stats, SyncStats {
            uploaded: 3,
            skipped: 0,
            deleted: 0,
        });

        write(dir.path(), "a.html", "hello");
        std::fs::remove_file(dir.path().join("c.html")).unwrap();
        let second = deploy(&store, bundle(config.clone()), dir.path()).await;
        assert_eq!(second.stats, SyncStats {
            uploaded: 1,
            skipped: 1,
            deleted: 1,
        });
        assert_eq!(store.keys(), ["a.html", "b.html"]);
        assert_eq!(store.get("a.html").unwrap().body, b"hello");
        assert_eq!(
            store.get("a.html").unwrap().params.cache_control.as_deref(),
            Some(NO_CACHE)
        );

        let third = deploy(&store, bundle(config), dir.path()).await;
        assert_eq!(third.stats, SyncStats {
            uploaded: 0,
            skipped: 2,
            deleted: 0,
        });
    }

    #[tokio::test]
    async fn creates_bucket_and_reports_website_url() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.html", "home");
        let store = Arc::new(MemoryStore::new());
        let mut config = DeployConfig::for_bucket("site");
        config.region = Some("eu-central-1".to_string());

        let report = deploy(&store, bundle(config), dir.path()).await;

        assert!(report.created);
        assert_eq!(
            report.website_url.as_deref(),
            Some("http://site.s3-website.eu-central-1.amazonaws.com")
        );
        assert!(store.website().is_some());
        assert_eq!(
            store.get("index.html").unwrap().params.acl.as_deref(),
            Some("public-read")
        );
    }

    #[tokio::test]
    async fn root_redirect_without_index_writes_redirect_object() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "docs/index.html", "docs");
        let store = Arc::new(MemoryStore::existing("us-east-1"));
        let manifest = SiteManifest {
            redirects: vec![LogicalRedirect::new("/", "/docs/", false)],
            pages: Vec::new(),
        };
        let bundle = prepare(DeployConfig::for_bucket("site"), &manifest).unwrap();

        deploy(&store, bundle, dir.path()).await;

        let index = store.get("index.html").unwrap();
        assert_eq!(index.body, b"/docs/");
        assert_eq!(index.params.website_redirect_location.as_deref(), Some("/docs/"));
    }

    #[tokio::test]
    async fn root_redirect_with_index_sets_location_on_page() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "index.html", "home");
        let store = Arc::new(MemoryStore::existing("us-east-1"));
        let manifest = SiteManifest {
            redirects: vec![LogicalRedirect::new("/", "/docs/", false)],
            pages: Vec::new(),
        };
        let bundle = prepare(DeployConfig::for_bucket("site"), &manifest).unwrap();

        deploy(&store, bundle, dir.path()).await;

        let index = store.get("index.html").unwrap();
        assert_eq!(index.body, b"home");
        assert_eq!(index.params.website_redirect_location.as_deref(), Some("/docs/"));
    }

    #[tokio::test]
    async fn demoted_permanent_redirects_become_objects() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "new/index.html", "new");
        let store = Arc::new(MemoryStore::existing("us-east-1"));
        let mut config = DeployConfig::for_bucket("site");
        config.generate_redirect_objects_for_permanent_redirects = true;
        config.protocol = Some("https".to_string());
        config.hostname = Some("example.com".to_string());
        let manifest = SiteManifest {
            redirects: vec![LogicalRedirect::new("/old/", "/new/", true)],
            pages: Vec::new(),
        };
        let bundle = prepare(config, &manifest).unwrap();
        assert!(bundle.routing_rules.is_empty());

        let report = deploy(&store, bundle, dir.path()).await;

        assert_eq!(report.stats.uploaded, 2);
        let object = store.get("old/index.html").unwrap();
        assert_eq!(
            object.params.website_redirect_location.as_deref(),
            Some("https://example.com/new/")
        );
    }

    #[tokio::test]
    async fn failed_listing_aborts_before_any_upload() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.html", "hi");
        let store = Arc::new(MemoryStore::existing("us-east-1"));
        store.fail_listing();
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        let deployer =
            Deployer::new(dyn_store, bundle(DeployConfig::for_bucket("site")), dir.path()).unwrap();
        let info = deployer.probe().await.unwrap();

        let err = deployer.run(&info).await.unwrap_err();

        assert!(matches!(err, DeployError::Storage(StorageError::List { .. })));
        assert_eq!(store.put_count(), 0);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let bundle = Bundle {
            config: DeployConfig::default(),
            params: Vec::new(),
            routing_rules: Vec::new(),
            redirect_objects: Vec::new(),
        };

        let result = Deployer::new(store, bundle, "public");

        assert!(matches!(result, Err(DeployError::Config(ConfigError::MissingBucketName))));
    }

    #[test]
    fn invalid_pattern_is_rejected_before_touching_the_bucket() {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn ObjectStore> = store.clone();
        let bundle = Bundle {
            config: DeployConfig::for_bucket("site"),
            params: vec![ParamRule::new("a[", UploadParams::cache_control("private"))],
            routing_rules: Vec::new(),
            redirect_objects: Vec::new(),
        };

        let result = Deployer::new(dyn_store, bundle, "public");

        assert!(matches!(result, Err(DeployError::Pattern { pattern, .. }) if pattern == "a["));
        assert!(!store.bucket_exists());
        assert!(store.website().is_none());
        assert_eq!(store.put_count(), 0);
    }
}
