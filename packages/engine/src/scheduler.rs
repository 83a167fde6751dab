//! Executes a [`SyncPlan`] against an [`ObjectStore`].
//!
//! Writes run on a [`JoinSet`] capped at the configured parallel limit.
//! The first failed write stops scheduling: tasks already in flight are
//! awaited, nothing new is started, and deletions never run.

use std::sync::Arc;

use site_sync_models::{SyncEvent, SyncObserver, SyncPlan, SyncStats, UploadTask};
use site_sync_storage::{MAX_DELETE_BATCH, ObjectStore, StorageError};
use tokio::task::JoinSet;

use crate::DeployError;

/// Runs every write in `plan`, then every deletion.
///
/// # Errors
///
/// Returns the first failed write (with its key) or the first failed
/// deletion batch.
pub async fn execute(
    store: Arc<dyn ObjectStore>,
    bucket: &str,
    plan: SyncPlan,
    limit: usize,
    observer: &Arc<dyn SyncObserver>,
) -> Result<SyncStats, DeployError> {
    let skipped = plan.retained.len() as u64;
    let tasks: Vec<UploadTask> = plan.uploads.into_iter().chain(plan.redirect_writes).collect();

    let uploaded = upload_all(Arc::clone(&store), bucket, tasks, limit, observer).await?;
    let deleted = delete_all(store.as_ref(), bucket, &plan.deletions, observer).await?;

    Ok(SyncStats {
        uploaded,
        skipped,
        deleted,
    })
}

/// Writes `tasks` with at most `limit` requests in flight.
///
/// # Errors
///
/// Returns the first failure once every in-flight write has settled.
pub async fn upload_all(
    store: Arc<dyn ObjectStore>,
    bucket: &str,
    tasks: Vec<UploadTask>,
    limit: usize,
    observer: &Arc<dyn SyncObserver>,
) -> Result<u64, DeployError> {
    let limit = limit.max(1);
    let total = tasks.len();
    let mut pending = tasks.into_iter();
    let mut running: JoinSet<(UploadTask, Result<(), StorageError>)> = JoinSet::new();
    let mut uploaded = 0u64;
    let mut failure: Option<DeployError> = None;

    log::info!("Uploading {total} object(s) to s3://{bucket} ({limit} at a time)");

    loop {
        while failure.is_none() && running.len() < limit {
            let Some(task) = pending.next() else {
                break;
            };
            observer.notify(SyncEvent::UploadStarted {
                key: task.key.clone(),
            });
            let store = Arc::clone(&store);
            let bucket = bucket.to_string();
            running.spawn(async move {
                let result = store.put_object(&bucket, &task).await;
                (task, result)
            });
        }

        let Some(joined) = running.join_next().await else {
            break;
        };

        match joined {
            Ok((task, Ok(()))) => {
                uploaded += 1;
                log::debug!("uploaded {}", task.key);
                observer.notify(SyncEvent::Uploaded {
                    key: task.key,
                    is_redirect: task.is_redirect,
                });
            }
            Ok((task, Err(e))) => {
                log::error!("upload of {} failed: {e}", task.key);
                observer.notify(SyncEvent::UploadFailed {
                    key: task.key,
                    message: e.to_string(),
                });
                failure.get_or_insert(e.into());
            }
            Err(e) => {
                log::error!("upload task did not complete: {e}");
                failure.get_or_insert(e.into());
            }
        }
    }

    if let Some(e) = failure {
        let abandoned = pending.len();
        if abandoned > 0 {
            log::warn!("{abandoned} upload(s) were not started");
        }
        return Err(e);
    }

    Ok(uploaded)
}

/// Deletes `keys` in batches of at most [`MAX_DELETE_BATCH`].
///
/// # Errors
///
/// Returns the first failed batch; later batches are not attempted.
pub async fn delete_all(
    store: &dyn ObjectStore,
    bucket: &str,
    keys: &[String],
    observer: &Arc<dyn SyncObserver>,
) -> Result<u64, StorageError> {
    if keys.is_empty() {
        return Ok(0);
    }

    let total = keys.len() as u64;
    let mut deleted = 0u64;
    for batch in keys.chunks(MAX_DELETE_BATCH) {
        store.delete_objects(bucket, batch).await?;
        let from = deleted + 1;
        deleted += batch.len() as u64;
        log::info!("Deleted {from}-{deleted} of {total} stale object(s)");
        observer.notify(SyncEvent::Deleted {
            from,
            to: deleted,
            total,
        });
    }

    Ok(deleted)
}
