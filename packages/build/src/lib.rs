#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Build-completion half of site-sync.
//!
//! Runs once the static site build has finished: merges declared
//! redirects and client-side match paths into one list
//! ([`normalize`]), compiles that list into bucket routing rules and
//! redirect objects ([`compile`]), and freezes everything the deploy step
//! needs into the JSON documents of a [`bundle::Bundle`].

pub mod bundle;
pub mod compile;
pub mod normalize;

use std::path::PathBuf;

use site_sync_models::{ConfigError, MAX_ROUTING_RULES};

/// Errors that can occur while preparing or loading a deploy bundle.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// More routing rules than a website configuration accepts.
    #[error(
        "{count} routing rules provided, the number of routing rules in a website \
         configuration is limited to {MAX_ROUTING_RULES}. Try setting the \
         'generateRedirectObjectsForPermanentRedirects' configuration option."
    )]
    TooManyRoutingRules {
        /// Number of rules that were compiled.
        count: usize,
    },

    /// Reading or writing a bundle document failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A bundle document is not valid JSON of the expected shape.
    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}
