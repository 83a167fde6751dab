//! Build output traversal.
//!
//! The walker runs on a blocking thread and feeds [`LocalAsset`]s into a
//! bounded channel, so directory traversal applies backpressure to (and
//! overlaps with) fingerprinting.

use std::path::{Component, Path, PathBuf};

use site_sync_models::LocalAsset;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::DeployError;

/// Rewrites a key to forward-slash separators.
///
/// Keys are compared and uploaded in this form regardless of the platform
/// the build ran on.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.replace('\\', "/")
}

/// Object key for `path` relative to the build output `root`.
///
/// Returns `None` when `path` is not below `root`.
#[must_use]
pub fn remote_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(normalize_key(&parts.join("/")))
}

/// Walks `root` on a blocking thread, sending every regular file into
/// `tx`.
///
/// The returned handle resolves once traversal has finished and `tx` has
/// been dropped. It yields an error if the tree could not be read; the
/// receiver may then have seen only part of the tree.
pub fn spawn_walker(root: PathBuf, tx: mpsc::Sender<LocalAsset>) -> JoinHandle<Result<u64, DeployError>> {
    tokio::task::spawn_blocking(move || {
        let mut sent = 0u64;
        for entry in walkdir::WalkDir::new(&root).follow_links(true) {
            let entry = entry.map_err(|source| DeployError::Walk {
                path: root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(relative_key) = remote_key(&root, entry.path()) else {
                continue;
            };
            let asset = LocalAsset {
                relative_key,
                absolute_path: entry.into_path(),
            };
            if tx.blocking_send(asset).is_err() {
                log::debug!("asset receiver dropped, stopping walk of {}", root.display());
                break;
            }
            sent += 1;
        }

        log::debug!("walked {sent} file(s) under {}", root.display());
        Ok(sent)
    })
}
