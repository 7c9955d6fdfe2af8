//! Site-specific URL canonicalization applied before fetching.

use url::Url;

use super::options::SiteOptions;

/// Rewrites a validated URL, or leaves it alone.
pub trait UrlRewriter: Send + Sync {
    /// Returns the rewritten URL, or `None` when no rule applies.
    fn rewrite(&self, url: &Url, options: &SiteOptions) -> Option<Url>;
}

/// Sets and removes query parameters when a trigger option is truthy.
///
/// Used to collapse a keyword-search URL into a direct-item URL.
#[derive(Debug, Clone, Default)]
pub struct QueryParamRewriter {
    trigger: String,
    set_params: Vec<(String, String)>,
    remove_params: Vec<String>,
    path: Option<String>,
}

impl QueryParamRewriter {
    /// Creates a rewriter triggered by `option`.
    #[must_use]
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            ..Self::default()
        }
    }

    /// Sets (or replaces) a query parameter.
    #[must_use]
    pub fn set_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_params.push((key.into(), value.into()));
        self
    }

    /// Drops a query parameter.
    #[must_use]
    pub fn remove_param(mut self, key: impl Into<String>) -> Self {
        self.remove_params.push(key.into());
        self
    }

    /// Replaces the path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl UrlRewriter for QueryParamRewriter {
    fn rewrite(&self, url: &Url, options: &SiteOptions) -> Option<Url> {
        if !options.is_truthy(&self.trigger) {
            return None;
        }

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| {
                !self.remove_params.iter().any(|r| r == k)
                    && !self.set_params.iter().any(|(s, _)| s == k)
            })
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut rewritten = url.clone();
        if let Some(ref path) = self.path {
            rewritten.set_path(path);
        }
        rewritten.set_query(None);
        let pairs: Vec<&(String, String)> = kept.iter().chain(self.set_params.iter()).collect();
        if !pairs.is_empty() {
            let mut query = rewritten.query_pairs_mut();
            for (k, v) in pairs {
                query.append_pair(k, v);
            }
        }

        (rewritten != *url).then_some(rewritten)
    }
}
