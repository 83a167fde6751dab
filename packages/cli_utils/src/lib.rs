#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the site-sync binaries.
//!
//! [`init_logger`] installs `pretty_env_logger` behind
//! `indicatif-log-bridge`, and [`IndicatifObserver`] renders the engine's
//! [`SyncEvent`]s as progress bars on the same [`MultiProgress`], so log
//! lines and bars share the terminal cleanly.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use site_sync_models::{SyncEvent, SyncObserver};

pub use indicatif::MultiProgress;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg} ({pos} hashed)")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style(color: &str) -> ProgressStyle {
    ProgressStyle::with_template(&format!(
        "  {{prefix}} {{wide_bar:.{color}/dim}} {{pos}}/{{len}} {{percent}}% [{{eta}}] {{msg}}"
    ))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("##-")
}

/// Renders deploy progress with `indicatif`.
///
/// Local hashing shows as a spinner. Once the plan is known, uploads and
/// deletions each get a bar sized to the planned work.
pub struct IndicatifObserver {
    multi: MultiProgress,
    scan: ProgressBar,
    uploads: Mutex<Option<ProgressBar>>,
    deletions: Mutex<Option<ProgressBar>>,
}

impl IndicatifObserver {
    /// Creates an observer whose bars are added to `multi`.
    #[must_use]
    pub fn new(multi: &MultiProgress) -> Self {
        let scan = multi.add(ProgressBar::new_spinner());
        scan.enable_steady_tick(Duration::from_millis(100));
        scan.set_style(spinner_style());
        scan.set_message("Listing bucket");

        Self {
            multi: multi.clone(),
            scan,
            uploads: Mutex::new(None),
            deletions: Mutex::new(None),
        }
    }

    fn add_bar(&self, prefix: &'static str, color: &str, len: u64) -> Option<ProgressBar> {
        if len == 0 {
            return None;
        }
        let bar = self.multi.add(ProgressBar::new(len));
        bar.set_style(bar_style(color));
        bar.set_prefix(prefix);
        Some(bar)
    }

    fn with_uploads(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.uploads.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }

    fn with_deletions(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.deletions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }
}

impl SyncObserver for IndicatifObserver {
    fn notify(&self, event: SyncEvent) {
        match event {
            SyncEvent::Listed { objects } => {
                self.scan
                    .set_message(format!("{objects} remote object(s), hashing local files"));
            }
            SyncEvent::Fingerprinted { .. } => self.scan.inc(1),
            SyncEvent::Planned {
                uploads,
                skipped,
                deletions,
            } => {
                self.scan
                    .finish_with_message(format!("{skipped} unchanged, {uploads} to upload"));
                *self.uploads.lock().unwrap_or_else(PoisonError::into_inner) =
                    self.add_bar("Uploading", "green", uploads);
                *self.deletions.lock().unwrap_or_else(PoisonError::into_inner) =
                    self.add_bar("Deleting ", "red", deletions);
            }
            SyncEvent::UploadStarted { key } => self.with_uploads(|bar| bar.set_message(key)),
            SyncEvent::Uploaded { .. } => self.with_uploads(|bar| {
                bar.inc(1);
                if bar.length() == Some(bar.position()) {
                    bar.finish_with_message("done");
                }
            }),
            SyncEvent::UploadFailed { key, .. } => {
                self.with_uploads(|bar| bar.abandon_with_message(format!("failed on {key}")));
            }
            SyncEvent::Deleted { to, total, .. } => self.with_deletions(|bar| {
                bar.set_position(to);
                if to == total {
                    bar.finish_with_message("done");
                }
            }),
        }
    }
}

/// Sets up logging for the `site_sync` binary and returns the
/// [`MultiProgress`] that [`IndicatifObserver`] draws the scan, upload and
/// deletion bars on, so `deploy` log lines print above the bars.
///
/// Verbosity follows `RUST_LOG`.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // Only the first call installs the logger.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    fn observer() -> IndicatifObserver {
        IndicatifObserver::new(&MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    fn upload_position(observer: &IndicatifObserver) -> Option<(u64, bool)> {
        let guard = observer.uploads.lock().unwrap();
        guard.as_ref().map(|bar| (bar.position(), bar.is_finished()))
    }

    #[test]
    fn upload_bar_tracks_planned_writes() {
        let observer = observer();
        observer.notify(SyncEvent::Fingerprinted {
            key: "a.html".to_string(),
        });
        observer.notify(SyncEvent::Planned {
            uploads: 2,
            skipped: 0,
            deletions: 0,
        });
        assert!(observer.deletions.lock().unwrap().is_none());

        for key in ["a.html", "b.html"] {
            observer.notify(SyncEvent::UploadStarted {
                key: key.to_string(),
            });
            observer.notify(SyncEvent::Uploaded {
                key: key.to_string(),
                is_redirect: false,
            });
        }

        assert_eq!(observer.scan.position(), 1);
        assert_eq!(upload_position(&observer), Some((2, true)));
    }

    #[test]
    fn events_before_plan_are_ignored() {
        let observer = observer();
        observer.notify(SyncEvent::Uploaded {
            key: "a.html".to_string(),
            is_redirect: false,
        });
        assert_eq!(upload_position(&observer), None);
    }
}
