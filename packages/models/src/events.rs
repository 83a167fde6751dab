//! Progress events emitted while a deploy runs.
//!
//! The engine never renders anything itself. It reports [`SyncEvent`]s to
//! an injected [`SyncObserver`], and the caller decides whether that means
//! progress bars, log lines, or nothing.

use std::sync::Arc;

/// Something that happened during a deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The remote listing finished.
    Listed {
        /// Number of objects currently in the bucket.
        objects: u64,
    },
    /// A local file was hashed.
    Fingerprinted {
        /// Key of the hashed file.
        key: String,
    },
    /// The plan is ready; `uploads` writes are about to start.
    Planned {
        /// Number of writes (files and redirect objects).
        uploads: u64,
        /// Number of unchanged keys.
        skipped: u64,
        /// Number of deletions.
        deletions: u64,
    },
    /// An object write started.
    UploadStarted {
        /// Destination key.
        key: String,
    },
    /// An object write completed.
    Uploaded {
        /// Destination key.
        key: String,
        /// Whether the object was a redirect object.
        is_redirect: bool,
    },
    /// An object write failed.
    UploadFailed {
        /// Destination key.
        key: String,
        /// Rendered error.
        message: String,
    },
    /// A batch of deletions completed.
    Deleted {
        /// 1-based index of the first key in the batch.
        from: u64,
        /// 1-based index of the last key in the batch.
        to: u64,
        /// Total number of deletions.
        total: u64,
    },
}

/// Receiver of [`SyncEvent`]s.
///
/// Implementations must be `Send + Sync` because events are emitted from
/// concurrently running upload tasks.
pub trait SyncObserver: Send + Sync {
    /// Called once per event, possibly from several tasks at once.
    fn notify(&self, event: SyncEvent);
}

/// Observer that drops every event.
pub struct NullObserver;

impl SyncObserver for NullObserver {
    fn notify(&self, _event: SyncEvent) {}
}

/// Returns a shared [`NullObserver`].
#[must_use]
pub fn null_observer() -> Arc<dyn SyncObserver> {
    Arc::new(NullObserver)
}
