//! Compiles normalized redirects into bucket routing rules and redirect
//! object descriptors.

use site_sync_models::{
    DeployConfig, LogicalRedirect, MAX_ROUTING_RULES, RedirectCode, RedirectObject, RedirectRule,
    RoutingRule, RoutingRuleCondition,
};

use crate::BuildError;
use crate::normalize::NormalizedRedirects;

/// Settings that shape every compiled rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOptions {
    /// Emit routing rules at all.
    pub generate_routing_rules: bool,
    /// Condition added to rewrite-derived rules.
    pub http_error_code_returned_equals: Option<String>,
    /// Absolute redirect protocol.
    pub protocol: Option<String>,
    /// Absolute redirect host.
    pub hostname: Option<String>,
}

impl From<&DeployConfig> for RuleOptions {
    fn from(config: &DeployConfig) -> Self {
        Self {
            generate_routing_rules: config.generate_routing_rules,
            http_error_code_returned_equals: config.http_error_code_returned_equals.clone(),
            protocol: config.protocol.clone(),
            hostname: config.hostname.clone(),
        }
    }
}

/// Output of [`compile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledRedirects {
    /// Rules for the bucket website configuration.
    pub routing_rules: Vec<RoutingRule>,
    /// Demoted permanent redirects, written as objects at deploy time.
    pub redirect_objects: Vec<RedirectObject>,
}

fn without_leading_slash(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

fn without_trailing_slash(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

/// Maps one redirect to its routing rule.
#[must_use]
pub fn to_rule(redirect: &LogicalRedirect, options: &RuleOptions) -> RoutingRule {
    RoutingRule {
        condition: RoutingRuleCondition {
            key_prefix_equals: without_leading_slash(&redirect.from_path).to_string(),
            http_error_code_returned_equals: if redirect.is_rewrite {
                options.http_error_code_returned_equals.clone()
            } else {
                None
            },
        },
        redirect: RedirectRule {
            replace_key_with: without_trailing_slash(without_leading_slash(&redirect.to_path))
                .to_string(),
            http_redirect_code: if redirect.is_permanent {
                RedirectCode::Permanent
            } else {
                RedirectCode::Temporary
            },
            protocol: options.protocol.clone(),
            host_name: options.hostname.clone(),
        },
    }
}

/// Compiles every routable redirect into a rule and every demoted one into
/// a redirect object descriptor.
///
/// # Errors
///
/// Returns [`BuildError::TooManyRoutingRules`] when more than
/// [`MAX_ROUTING_RULES`] rules would be produced. Rules are never silently
/// dropped.
pub fn compile(
    normalized: &NormalizedRedirects,
    options: &RuleOptions,
) -> Result<CompiledRedirects, BuildError> {
    let routing_rules: Vec<RoutingRule> = if options.generate_routing_rules {
        normalized
            .routable
            .iter()
            .map(|redirect| to_rule(redirect, options))
            .collect()
    } else {
        Vec::new()
    };

    if routing_rules.len() > MAX_ROUTING_RULES {
        return Err(BuildError::TooManyRoutingRules {
            count: routing_rules.len(),
        });
    }

    let redirect_objects = normalized
        .demoted
        .iter()
        .cloned()
        .map(RedirectObject::from)
        .collect::<Vec<_>>();

    log::info!(
        "compiled {} routing rule(s), {} redirect object(s)",
        routing_rules.len(),
        redirect_objects.len()
    );

    Ok(CompiledRedirects {
        routing_rules,
        redirect_objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn options() -> RuleOptions {
        RuleOptions {
            generate_routing_rules: true,
            ..RuleOptions::default()
        }
    }

    fn temporary_redirects(count: usize) -> Vec<LogicalRedirect> {
        (0..count)
            .map(|i| LogicalRedirect::new(format!("/from-{i}"), format!("/to-{i}"), false))
            .collect()
    }

    #[test]
    fn maps_paths_and_status_codes() {
        let rule = to_rule(&LogicalRedirect::new("/old/", "/new/", true), &options());
        assert_eq!(rule.condition.key_prefix_equals, "old/");
        assert_eq!(rule.redirect.replace_key_with, "new");
        assert_eq!(rule.redirect.http_redirect_code, RedirectCode::Permanent);

        let rule = to_rule(&LogicalRedirect::new("/a", "/b", false), &options());
        assert_eq!(rule.redirect.http_redirect_code, RedirectCode::Temporary);
    }

    #[test]
    fn error_code_condition_only_applies_to_rewrites() {
        let options = RuleOptions {
            http_error_code_returned_equals: Some("404".to_string()),
            ..options()
        };
        let rewrite = to_rule(&LogicalRedirect::rewrite("/app/", "/app/"), &options);
        let redirect = to_rule(&LogicalRedirect::new("/a", "/b", false), &options);
        assert_eq!(
            rewrite.condition.http_error_code_returned_equals.as_deref(),
            Some("404")
        );
        assert_eq!(redirect.condition.http_error_code_returned_equals, None);
    }

    #[test]
    fn carries_absolute_host() {
        let options = RuleOptions {
            protocol: Some("https".to_string()),
            hostname: Some("example.com".to_string()),
            ..options()
        };
        let rule = to_rule(&LogicalRedirect::new("/a", "/b", false), &options);
        assert_eq!(rule.redirect.protocol.as_deref(), Some("https"));
        assert_eq!(rule.redirect.host_name.as_deref(), Some("example.com"));
    }

    #[test]
    fn accepts_exactly_the_rule_limit() {
        let normalized = normalize(&temporary_redirects(MAX_ROUTING_RULES), &[], false);
        let compiled = compile(&normalized, &options()).unwrap();
        assert_eq!(compiled.routing_rules.len(), MAX_ROUTING_RULES);
    }

    #[test]
    fn rejects_one_rule_over_the_limit() {
        let normalized = normalize(&temporary_redirects(MAX_ROUTING_RULES + 1), &[], false);
        let err = compile(&normalized, &options()).unwrap_err();
        assert!(matches!(err, BuildError::TooManyRoutingRules { count: 51 }));
        assert!(
            err.to_string()
                .contains("generateRedirectObjectsForPermanentRedirects")
        );
    }

    #[test]
    fn demotion_moves_permanent_redirect_to_objects() {
        let redirects = [LogicalRedirect::new("/old", "/new", true)];

        let demoted = compile(&normalize(&redirects, &[], true), &options()).unwrap();
        assert!(demoted.routing_rules.is_empty());
        assert_eq!(
            demoted.redirect_objects,
            vec![RedirectObject {
                from_path: "/old".to_string(),
                to_path: "/new".to_string(),
            }]
        );

        let kept = compile(&normalize(&redirects, &[], false), &options()).unwrap();
        assert_eq!(kept.routing_rules.len(), 1);
        assert!(kept.redirect_objects.is_empty());
    }

    #[test]
    fn demotion_lifts_the_limit_for_permanent_redirects() {
        let redirects: Vec<LogicalRedirect> = (0..60)
            .map(|i| LogicalRedirect::new(format!("/p{i}"), "/", true))
            .collect();
        assert!(compile(&normalize(&redirects, &[], false), &options()).is_err());

        let compiled = compile(&normalize(&redirects, &[], true), &options()).unwrap();
        assert_eq!(compiled.redirect_objects.len(), 60);
    }

    #[test]
    fn disabled_rule_generation_emits_no_rules() {
        let normalized = normalize(&temporary_redirects(3), &[], false);
        let compiled = compile(&normalized, &RuleOptions::default()).unwrap();
        assert!(compiled.routing_rules.is_empty());
    }
}
