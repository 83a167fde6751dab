//! Reconciles the local build, the remote listing, and the redirect
//! objects into a [`SyncPlan`].
//!
//! Planning is split in two:
//!
//! 1. [`fingerprint_tree`] walks the build output and hashes every file
//!    with a bounded pool of workers.
//! 2. [`plan`] is a pure function of the fingerprinted assets, the remote
//!    listing, and the redirect objects. Every output list is sorted, so the
//!    same inputs always produce the same plan.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use site_sync_models::{
    LocalAsset, OCTET_STREAM, ObjectSource, RedirectObject, RemoteObject, SyncEvent, SyncObserver,
    SyncPlan, UploadParams, UploadTask,
};
use tokio::sync::mpsc;

use crate::DeployError;
use crate::fingerprint::{fingerprint_bytes, fingerprint_file};
use crate::params::{ParamResolver, guess_content_type};
use crate::walk::{normalize_key, spawn_walker};

/// Suffix appended to directory-style redirect keys.
const INDEX_SUFFIX: &str = "index.html";

/// A local file and its content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintedAsset {
    /// The file.
    pub asset: LocalAsset,
    /// Hex MD5 of the file, or `None` if it could not be read. Unreadable
    /// files are always planned for upload, where the read error surfaces
    /// again with the key attached.
    pub fingerprint: Option<String>,
}

/// Policy inputs to [`plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// ACL applied to objects whose parameters do not set one.
    pub acl: Option<String>,
    /// `protocol://hostname` redirect locations are resolved against.
    pub redirect_base: Option<String>,
    /// Delete remote keys that are no longer produced.
    pub prune: bool,
}

/// Walks `root` and fingerprints every file with up to `workers`
/// concurrent hashes.
///
/// Returns once the walker has finished, so the result covers the whole
/// tree. The result is sorted by key.
///
/// # Errors
///
/// Returns [`DeployError::Walk`] if the tree could not be traversed.
pub async fn fingerprint_tree(
    root: &Path,
    workers: usize,
    observer: &Arc<dyn SyncObserver>,
) -> Result<Vec<FingerprintedAsset>, DeployError> {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel::<LocalAsset>(workers * 4);
    let walker = spawn_walker(root.to_path_buf(), tx);

    let received = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|asset| (asset, rx))
    });

    let observer = Arc::clone(observer);
    let mut assets: Vec<FingerprintedAsset> = received
        .map(|asset| {
            let observer = Arc::clone(&observer);
            async move {
                let fingerprint = match fingerprint_file(&asset.absolute_path).await {
                    Ok(fingerprint) => Some(fingerprint),
                    Err(e) => {
                        log::warn!("could not fingerprint {}: {e}", asset.relative_key);
                        None
                    }
                };
                observer.notify(SyncEvent::Fingerprinted {
                    key: asset.relative_key.clone(),
                });
                FingerprintedAsset { asset, fingerprint }
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    walker.await??;

    assets.sort_by(|a, b| a.asset.relative_key.cmp(&b.asset.relative_key));
    Ok(assets)
}

/// Object key a redirect object is stored under.
///
/// The leading slash is dropped and directory-style paths (including the
/// root) get `index.html` appended.
#[must_use]
pub fn redirect_key(from_path: &str) -> String {
    let key = normalize_key(from_path.strip_prefix('/').unwrap_or(from_path));
    if key.is_empty() || key.ends_with('/') {
        format!("{key}{INDEX_SUFFIX}")
    } else {
        key
    }
}

/// Redirect location stored on a redirect object: `to_path` resolved
/// against `base` when one is configured, otherwise `to_path` unchanged.
#[must_use]
pub fn redirect_location(base: Option<&str>, to_path: &str) -> String {
    base.and_then(|base| url::Url::parse(base).ok())
        .and_then(|base| base.join(to_path).ok())
        .map_or_else(|| to_path.to_string(), String::from)
}

struct RemoteIndex<'a> {
    tags: HashMap<&'a str, &'a RemoteObject>,
}

impl<'a> RemoteIndex<'a> {
    fn new(remote: &'a [RemoteObject]) -> Self {
        Self {
            tags: remote.iter().map(|object| (object.key.as_str(), object)).collect(),
        }
    }

    /// Whether `key` is stored remotely with exactly `fingerprint`.
    fn is_current(&self, key: &str, fingerprint: Option<&str>) -> bool {
        let (Some(remote), Some(fingerprint)) = (self.tags.get(key), fingerprint) else {
            return false;
        };
        if remote.is_multipart() {
            log::debug!("{key} has a multipart tag ({}), re-uploading", remote.fingerprint);
            return false;
        }
        remote.fingerprint == fingerprint
    }
}

fn task_params(resolver: &ParamResolver, options: &PlanOptions, key: &str) -> UploadParams {
    let mut params = resolver.resolve(key);
    if params.acl.is_none() {
        params.acl.clone_from(&options.acl);
    }
    params
}

/// Computes the plan.
///
/// * A file is uploaded unless the bucket holds the same key with the same
///   fingerprint.
/// * A redirect object is fingerprinted over its location string and
///   treated the same way. When a redirect object and a file share a key,
///   the redirect object wins and the file is not uploaded.
/// * With `prune`, every remote key that no file or redirect object claims
///   is deleted exactly once.
#[must_use]
pub fn plan(
    assets: &[FingerprintedAsset],
    remote: &[RemoteObject],
    redirects: &[RedirectObject],
    resolver: &ParamResolver,
    options: &PlanOptions,
) -> SyncPlan {
    let index = RemoteIndex::new(remote);
    let mut in_use: BTreeSet<String> = BTreeSet::new();
    let mut retained: BTreeSet<String> = BTreeSet::new();

    let mut redirect_tasks: BTreeMap<String, UploadTask> = BTreeMap::new();
    for redirect in redirects {
        let key = redirect_key(&redirect.from_path);
        let location = redirect_location(options.redirect_base.as_deref(), &redirect.to_path);
        let fingerprint = fingerprint_bytes(location.as_bytes());

        if !in_use.insert(key.clone()) {
            log::warn!("duplicate redirect object for {key}, keeping the first");
            continue;
        }
        if index.is_current(&key, Some(&fingerprint)) {
            retained.insert(key);
            continue;
        }

        let mut params = task_params(resolver, options, &key);
        // The object exists to carry this header; user rules cannot move it.
        params.website_redirect_location = Some(location.clone());
        redirect_tasks.insert(
            key.clone(),
            UploadTask {
                key,
                source: ObjectSource::Inline(location.into_bytes()),
                content_type: OCTET_STREAM.to_string(),
                params,
                is_redirect: true,
            },
        );
    }

    let redirect_keys = in_use.clone();
    let mut uploads: BTreeMap<String, UploadTask> = BTreeMap::new();
    for FingerprintedAsset { asset, fingerprint } in assets {
        let key = normalize_key(&asset.relative_key);
        if redirect_keys.contains(&key) {
            log::warn!("{key} is both a file and a redirect object, keeping the redirect");
            continue;
        }
        if !in_use.insert(key.clone()) {
            log::warn!("duplicate local asset for {key}, keeping the first");
            continue;
        }
        if index.is_current(&key, fingerprint.as_deref()) {
            retained.insert(key);
            continue;
        }

        let params = task_params(resolver, options, &key);
        let content_type = params
            .content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(&key));
        uploads.insert(
            key.clone(),
            UploadTask {
                key,
                source: ObjectSource::File(asset.absolute_path.clone()),
                content_type,
                params,
                is_redirect: false,
            },
        );
    }

    let deletions: Vec<String> = if options.prune {
        remote
            .iter()
            .map(|object| object.key.as_str())
            .filter(|key| !in_use.contains(*key))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    SyncPlan {
        uploads: uploads.into_values().collect(),
        redirect_writes: redirect_tasks.into_values().collect(),
        retained: retained.into_iter().collect(),
        deletions,
    }
}
