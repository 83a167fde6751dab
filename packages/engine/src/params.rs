//! Resolves the upload parameters for a key from the ordered glob table.

use globset::{GlobBuilder, GlobMatcher};
use site_sync_models::{OCTET_STREAM, ParamRule, UploadParams};

use crate::DeployError;

/// Compiled form of the parameter table.
#[derive(Debug, Clone, Default)]
pub struct ParamResolver {
    rules: Vec<(GlobMatcher, UploadParams)>,
}

impl ParamResolver {
    /// Compiles every pattern. `*` does not cross `/`; `**` does.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Pattern`] for the first invalid glob.
    pub fn new(rules: &[ParamRule]) -> Result<Self, DeployError> {
        let rules = rules
            .iter()
            .map(|rule| {
                let glob = GlobBuilder::new(&rule.pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|source| DeployError::Pattern {
                        pattern: rule.pattern.clone(),
                        source,
                    })?;
                Ok((glob.compile_matcher(), rule.params.clone()))
            })
            .collect::<Result<Vec<_>, DeployError>>()?;
        Ok(Self { rules })
    }

    /// Merges the parameters of every matching rule, in table order, so
    /// later rules override earlier ones field by field.
    #[must_use]
    pub fn resolve(&self, key: &str) -> UploadParams {
        let mut params = UploadParams::default();
        for (matcher, rule_params) in &self.rules {
            if matcher.is_match(key) {
                params.merge(rule_params);
            }
        }
        params
    }
}

/// `Content-Type` guessed from the key's extension, falling back to
/// `application/octet-stream`.
#[must_use]
pub fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}
