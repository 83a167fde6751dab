//! Merges declared redirects and page match-path rewrites into one ordered
//! list of [`LogicalRedirect`]s.

use serde::{Deserialize, Serialize};
use site_sync_models::LogicalRedirect;

/// Trailing marker a match path uses for "anything below this prefix".
const WILDCARD: char = '*';

/// A page produced by the site build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRoute {
    /// Canonical path of the page.
    pub path: String,
    /// Client-side route pattern served by this page, if any.
    #[serde(default)]
    pub match_path: Option<String>,
}

/// Redirects sorted by how they will be published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRedirects {
    /// Entries eligible for routing-rule compilation, in rule order:
    /// temporary redirects, then rewrites, then permanent redirects when
    /// they are not demoted.
    pub routable: Vec<LogicalRedirect>,
    /// Permanent redirects demoted to redirect objects.
    pub demoted: Vec<LogicalRedirect>,
    /// First redirect declared for the site root, which no routing rule
    /// condition can express.
    pub index_redirect: Option<LogicalRedirect>,
}

/// Removes a trailing wildcard marker; routing-rule conditions already
/// match by prefix.
#[must_use]
pub fn strip_wildcard(path: &str) -> &str {
    path.strip_suffix(WILDCARD).unwrap_or(path)
}

/// Whether `path` is the bare site root.
#[must_use]
pub fn is_root(path: &str) -> bool {
    path == "/"
}

/// Turns pages whose match path differs from their canonical path into
/// rewrites from the match path to the page.
#[must_use]
pub fn rewrites_from_pages(pages: &[PageRoute]) -> Vec<LogicalRedirect> {
    pages
        .iter()
        .filter_map(|page| {
            let match_path = page.match_path.as_deref()?;
            (match_path != page.path)
                .then(|| LogicalRedirect::rewrite(strip_wildcard(match_path), &page.path))
        })
        .collect()
}

/// Classifies `redirects` and `rewrites`.
///
/// Root redirects are pulled out into [`NormalizedRedirects::index_redirect`]
/// (only the first one is kept) and never reach the rule list. With
/// `demote_permanent`, permanent redirects skip rule compilation and land
/// in [`NormalizedRedirects::demoted`]. Duplicates are kept as given;
/// earlier rules shadow later ones.
#[must_use]
pub fn normalize(
    redirects: &[LogicalRedirect],
    rewrites: &[LogicalRedirect],
    demote_permanent: bool,
) -> NormalizedRedirects {
    let mut index_redirect = None;
    let mut temporary = Vec::new();
    let mut permanent = Vec::new();

    for redirect in redirects {
        let entry = LogicalRedirect {
            from_path: strip_wildcard(&redirect.from_path).to_string(),
            ..redirect.clone()
        };
        if is_root(&entry.from_path) {
            if index_redirect.is_none() {
                index_redirect = Some(entry);
            }
            continue;
        }

        if entry.is_permanent {
            permanent.push(entry);
        } else {
            temporary.push(entry);
        }
    }

    let rewrites = rewrites
        .iter()
        .map(|rewrite| LogicalRedirect::rewrite(strip_wildcard(&rewrite.from_path), &rewrite.to_path))
        .filter(|rewrite| !is_root(&rewrite.from_path));

    let mut routable: Vec<LogicalRedirect> = temporary.into_iter().chain(rewrites).collect();
    let demoted = if demote_permanent {
        permanent
    } else {
        routable.extend(permanent);
        Vec::new()
    };

    log::debug!(
        "normalized redirects: {} routable, {} demoted, root redirect: {}",
        routable.len(),
        demoted.len(),
        index_redirect.is_some()
    );

    NormalizedRedirects {
        routable,
        demoted,
        index_redirect,
    }
}
