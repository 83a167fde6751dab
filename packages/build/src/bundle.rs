//! The frozen hand-off between the build and the deploy step.
//!
//! A bundle is a directory of JSON documents:
//!
//! | File | Contents |
//! |---|---|
//! | `s3.config.json` | [`DeployConfig`] |
//! | `s3.params.json` | ordered glob → [`UploadParams`] table |
//! | `s3.routingRules.json` | [`RoutingRule`]s |
//! | `s3.sls.routingRules.json` | the same rules in serverless shape (write-only) |
//! | `s3.redirectObjects.json` | demoted redirects (optional) |

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use site_sync_models::params::{caching_rules, ordered_rules};
use site_sync_models::{
    DeployConfig, LogicalRedirect, ParamRule, RedirectObject, RoutingRule, ServerlessRoutingRule,
    UploadParams,
};

use crate::BuildError;
use crate::compile::{RuleOptions, compile};
use crate::normalize::{PageRoute, normalize, rewrites_from_pages};

/// Default bundle directory, relative to the site root.
pub const DEFAULT_BUNDLE_DIR: &str = ".cache";

/// Configuration document.
pub const CONFIG_FILE: &str = "s3.config.json";
/// Upload parameter document.
pub const PARAMS_FILE: &str = "s3.params.json";
/// Routing rules document.
pub const ROUTING_RULES_FILE: &str = "s3.routingRules.json";
/// Routing rules in serverless-framework shape.
pub const SLS_ROUTING_RULES_FILE: &str = "s3.sls.routingRules.json";
/// Redirect objects document.
pub const REDIRECT_OBJECTS_FILE: &str = "s3.redirectObjects.json";

/// Key the root redirect is attached to.
pub const INDEX_KEY: &str = "index.html";

/// What the site build produced, as far as publishing is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteManifest {
    /// Declared redirects.
    #[serde(default)]
    pub redirects: Vec<LogicalRedirect>,
    /// Built pages.
    #[serde(default)]
    pub pages: Vec<PageRoute>,
}

/// Everything the deploy step reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Deploy configuration.
    pub config: DeployConfig,
    /// Upload parameters in precedence order (later wins).
    pub params: Vec<ParamRule>,
    /// Website routing rules.
    pub routing_rules: Vec<RoutingRule>,
    /// Redirect objects to synthesize.
    pub redirect_objects: Vec<RedirectObject>,
}

#[derive(Serialize, Deserialize)]
struct ParamsDocument(#[serde(with = "ordered_rules")] Vec<ParamRule>);

/// Merges upload parameters once, in a fixed order: the built-in caching
/// table (when enabled), the root redirect override, then the user's own
/// rules.
#[must_use]
pub fn merge_params(config: &DeployConfig, index_redirect: Option<&LogicalRedirect>) -> Vec<ParamRule> {
    let mut params = Vec::new();
    if config.merge_caching_params {
        params.extend(caching_rules());
    }
    if config.generate_index_page_for_redirect
        && let Some(redirect) = index_redirect
    {
        params.push(ParamRule::new(
            INDEX_KEY,
            UploadParams::redirect_to(&redirect.to_path),
        ));
    }
    params.extend(config.params.iter().cloned());
    params
}

/// Runs the build-completion pipeline: validate, normalize, compile, merge
/// parameters.
///
/// # Errors
///
/// Returns [`BuildError::Config`] for invalid settings and
/// [`BuildError::TooManyRoutingRules`] when the rule limit is exceeded.
pub fn prepare(config: DeployConfig, manifest: &SiteManifest) -> Result<Bundle, BuildError> {
    config.validate()?;

    let rewrites = if config.generate_match_path_rewrites {
        rewrites_from_pages(&manifest.pages)
    } else {
        Vec::new()
    };
    let normalized = normalize(
        &manifest.redirects,
        &rewrites,
        config.generate_redirect_objects_for_permanent_redirects,
    );
    let compiled = compile(&normalized, &RuleOptions::from(&config))?;
    let params = merge_params(&config, normalized.index_redirect.as_ref());

    Ok(Bundle {
        config,
        params,
        routing_rules: compiled.routing_rules,
        redirect_objects: compiled.redirect_objects,
    })
}

impl Bundle {
    /// Writes every document into `dir`, creating it if needed.
    ///
    /// The redirect objects document is only written when demotion is
    /// enabled; a stale one from an earlier build is removed otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] or [`BuildError::Json`] on failure.
    pub fn write(&self, dir: &Path) -> Result<(), BuildError> {
        std::fs::create_dir_all(dir).map_err(|source| BuildError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        write_json(&dir.join(CONFIG_FILE), &self.config)?;
        write_json(&dir.join(PARAMS_FILE), &ParamsDocument(self.params.clone()))?;
        write_json(&dir.join(ROUTING_RULES_FILE), &self.routing_rules)?;

        let serverless: Vec<ServerlessRoutingRule> = self
            .routing_rules
            .iter()
            .cloned()
            .map(ServerlessRoutingRule::from)
            .collect();
        write_json(&dir.join(SLS_ROUTING_RULES_FILE), &serverless)?;

        let redirect_objects_path = dir.join(REDIRECT_OBJECTS_FILE);
        if self.config.generate_redirect_objects_for_permanent_redirects {
            write_json(&redirect_objects_path, &self.redirect_objects)?;
        } else if redirect_objects_path.exists() {
            std::fs::remove_file(&redirect_objects_path).map_err(|source| BuildError::Io {
                path: redirect_objects_path.clone(),
                source,
            })?;
        }

        log::info!("wrote deploy bundle to {}", dir.display());
        Ok(())
    }

    /// Reads a bundle from `dir`. A missing redirect objects document means
    /// no redirect objects.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Io`] when a required document is missing or
    /// unreadable and [`BuildError::Json`] when one is malformed.
    pub fn load(dir: &Path) -> Result<Self, BuildError> {
        let config: DeployConfig = read_json(&dir.join(CONFIG_FILE))?;
        let ParamsDocument(params) = read_json(&dir.join(PARAMS_FILE))?;
        let routing_rules: Vec<RoutingRule> = read_json(&dir.join(ROUTING_RULES_FILE))?;

        let redirect_objects_path = dir.join(REDIRECT_OBJECTS_FILE);
        let redirect_objects = if redirect_objects_path.exists() {
            read_json(&redirect_objects_path)?
        } else {
            Vec::new()
        };

        log::debug!(
            "loaded bundle from {}: {} param rule(s), {} routing rule(s), {} redirect object(s)",
            dir.display(),
            params.len(),
            routing_rules.len(),
            redirect_objects.len()
        );

        Ok(Self {
            config,
            params,
            routing_rules,
            redirect_objects,
        })
    }

    /// The parameter override carrying the root redirect, if any.
    #[must_use]
    pub fn index_redirect_location(&self) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .filter(|rule| rule.pattern == INDEX_KEY)
            .find_map(|rule| rule.params.website_redirect_location.as_deref())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, BuildError> {
    let data = std::fs::read(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| BuildError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), BuildError> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| BuildError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| BuildError::Io {
        path: PathBuf::from(path),
        source,
    })
}
