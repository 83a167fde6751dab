//! Per-key upload parameters and the ordered pattern table that assigns
//! them (`s3.params.json`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `Cache-Control` for documents that must always be revalidated.
pub const NO_CACHE: &str = "public, max-age=0, must-revalidate";

/// `Cache-Control` for fingerprinted, never-changing assets.
pub const IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Object attributes applied when uploading a key.
///
/// Every field is optional; [`UploadParams::merge`] overlays the fields a
/// later-matching pattern sets onto the ones an earlier pattern set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UploadParams {
    /// `Cache-Control` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
    /// `Content-Type` header, overriding the extension guess.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// `Content-Disposition` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// `Content-Encoding` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// `Content-Language` header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// Canned ACL, overriding the configured default.
    #[serde(
        default,
        rename = "ACL",
        skip_serializing_if = "Option::is_none"
    )]
    pub acl: Option<String>,
    /// Website redirect location stored on the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_redirect_location: Option<String>,
    /// User metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl UploadParams {
    /// Overlays every field `other` sets onto `self`.
    pub fn merge(&mut self, other: &Self) {
        fn overlay(target: &mut Option<String>, value: Option<&String>) {
            if let Some(value) = value {
                *target = Some(value.clone());
            }
        }

        overlay(&mut self.cache_control, other.cache_control.as_ref());
        overlay(&mut self.content_type, other.content_type.as_ref());
        overlay(
            &mut self.content_disposition,
            other.content_disposition.as_ref(),
        );
        overlay(&mut self.content_encoding, other.content_encoding.as_ref());
        overlay(&mut self.content_language, other.content_language.as_ref());
        overlay(&mut self.acl, other.acl.as_ref());
        overlay(
            &mut self.website_redirect_location,
            other.website_redirect_location.as_ref(),
        );
        self.metadata.extend(
            other
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
    }

    /// Parameters that only set `Cache-Control`.
    #[must_use]
    pub fn cache_control(value: &str) -> Self {
        Self {
            cache_control: Some(value.to_string()),
            ..Self::default()
        }
    }

    /// Parameters that only set a website redirect location.
    #[must_use]
    pub fn redirect_to(location: &str) -> Self {
        Self {
            website_redirect_location: Some(location.to_string()),
            ..Self::default()
        }
    }
}

/// One glob pattern and the parameters it assigns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRule {
    /// Glob matched against the forward-slash object key.
    pub pattern: String,
    /// Parameters for matching keys.
    pub params: UploadParams,
}

impl ParamRule {
    /// Creates a rule.
    #[must_use]
    pub fn new(pattern: impl Into<String>, params: UploadParams) -> Self {
        Self {
            pattern: pattern.into(),
            params,
        }
    }
}

/// Built-in caching parameters for a static site build.
///
/// Order matters: `sw.js` comes after `**/*.js` so the service worker is
/// never cached as immutable.
#[must_use]
pub fn caching_rules() -> Vec<ParamRule> {
    vec![
        ParamRule::new("**/*.html", UploadParams::cache_control(NO_CACHE)),
        ParamRule::new("page-data/**/*.json", UploadParams::cache_control(NO_CACHE)),
        ParamRule::new("static/**", UploadParams::cache_control(IMMUTABLE)),
        ParamRule::new("**/*.js", UploadParams::cache_control(IMMUTABLE)),
        ParamRule::new("**/*.css", UploadParams::cache_control(IMMUTABLE)),
        ParamRule::new("sw.js", UploadParams::cache_control(NO_CACHE)),
    ]
}

/// (De)serializes `Vec<ParamRule>` as a JSON object whose key order is the
/// rule order.
pub mod ordered_rules {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::{ParamRule, UploadParams};

    /// Serializes rules as an object in rule order.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(rules: &[ParamRule], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(rules.len()))?;
        for rule in rules {
            map.serialize_entry(&rule.pattern, &rule.params)?;
        }
        map.end()
    }

    /// Deserializes an object into rules, keeping document order.
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<ParamRule>, D::Error> {
        struct RulesVisitor;

        impl<'de> Visitor<'de> for RulesVisitor {
            type Value = Vec<ParamRule>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping glob patterns to upload parameters")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut rules = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((pattern, params)) = access.next_entry::<String, UploadParams>()? {
                    rules.push(ParamRule { pattern, params });
                }
                Ok(rules)
            }
        }

        deserializer.deserialize_map(RulesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Document(#[serde(with = "ordered_rules")] Vec<ParamRule>);

    #[test]
    fn later_fields_override_earlier_ones() {
        let mut params = UploadParams::cache_control(IMMUTABLE);
        params.merge(&UploadParams {
            content_type: Some("text/plain".to_string()),
            ..UploadParams::cache_control(NO_CACHE)
        });
        assert_eq!(params.cache_control.as_deref(), Some(NO_CACHE));
        assert_eq!(params.content_type.as_deref(), Some("text/plain"));
    }

    #[test]
    fn unset_fields_do_not_clear_earlier_ones() {
        let mut params = UploadParams::cache_control(IMMUTABLE);
        params.merge(&UploadParams::redirect_to("/new"));
        assert_eq!(params.cache_control.as_deref(), Some(IMMUTABLE));
        assert_eq!(params.website_redirect_location.as_deref(), Some("/new"));
    }

    #[test]
    fn keeps_document_order() {
        let json = r#"{"z/**":{"CacheControl":"a"},"a/**":{"ACL":"private"},"m":{}}"#;
        let Document(rules) = serde_json::from_str(json).unwrap();
        let patterns: Vec<&str> = rules.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, ["z/**", "a/**", "m"]);
        assert_eq!(rules[1].params.acl.as_deref(), Some("private"));

        let written = serde_json::to_string(&Document(rules)).unwrap();
        assert_eq!(written, json);
    }

    #[test]
    fn caching_rules_put_service_worker_last() {
        let rules = caching_rules();
        assert_eq!(rules.last().map(|r| r.pattern.as_str()), Some("sw.js"));
    }
}
