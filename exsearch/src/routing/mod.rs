//! Routing: site identifier to downloader, extractor and URL helpers.
//!
//! Routes are registered at start-up. Lookups are case-insensitive and an
//! unknown identifier is an error value, never a panic.

mod options;
mod rewrite;
mod url_builder;

pub use options::{is_truthy, SiteOptions, REMOVE_DUPLICATES};
pub use rewrite::{QueryParamRewriter, UrlRewriter};
pub use url_builder::{OptionParam, QueryUrlBuilder, UrlBuilder};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::download::{Downloader, FetchOptions};
use crate::errors::SearchError;
use crate::extraction::ExtractionStrategy;

/// A validated http(s) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUrl {
    url: Url,
    origin: String,
}

impl TargetUrl {
    /// Parses and validates `raw`: scheme must be http or https and the
    /// host must be non-empty.
    pub fn parse(raw: &str) -> Result<Self, SearchError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SearchError::validation("url is empty"));
        }
        let url = Url::parse(trimmed)
            .map_err(|e| SearchError::validation(format!("invalid url '{trimmed}': {e}")))?;
        Self::from_url(url)
    }

    /// Validates an already parsed URL.
    pub fn from_url(url: Url) -> Result<Self, SearchError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SearchError::validation(format!(
                "unsupported url scheme '{}': {url}",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| SearchError::validation(format!("url has no host: {url}")))?;
        let origin = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self { url, origin })
    }

    /// The full URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The parsed URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Network location (`host[:port]`), the domain lock key.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Everything needed to serve one site.
#[derive(Clone)]
pub struct SiteRoute {
    name: String,
    downloader: Arc<dyn Downloader>,
    extractor: Arc<dyn ExtractionStrategy>,
    url_builder: Option<Arc<dyn UrlBuilder>>,
    rewriter: Option<Arc<dyn UrlRewriter>>,
    fetch_options: Option<FetchOptions>,
}

impl SiteRoute {
    /// Creates a route.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        downloader: Arc<dyn Downloader>,
        extractor: Arc<dyn ExtractionStrategy>,
    ) -> Self {
        Self {
            name: name.into().to_lowercase(),
            downloader,
            extractor,
            url_builder: None,
            rewriter: None,
            fetch_options: None,
        }
    }

    /// Sets the keyword URL builder.
    #[must_use]
    pub fn with_url_builder(mut self, builder: Arc<dyn UrlBuilder>) -> Self {
        self.url_builder = Some(builder);
        self
    }

    /// Sets the URL rewriter.
    #[must_use]
    pub fn with_rewriter(mut self, rewriter: Arc<dyn UrlRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Overrides the default fetch options.
    #[must_use]
    pub fn with_fetch_options(mut self, options: FetchOptions) -> Self {
        self.fetch_options = Some(options);
        self
    }

    /// Route name (lowercase).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The downloader.
    #[must_use]
    pub fn downloader(&self) -> &Arc<dyn Downloader> {
        &self.downloader
    }

    /// The extraction strategy.
    #[must_use]
    pub fn extractor(&self) -> &Arc<dyn ExtractionStrategy> {
        &self.extractor
    }

    /// The keyword URL builder, if any.
    #[must_use]
    pub fn url_builder(&self) -> Option<&Arc<dyn UrlBuilder>> {
        self.url_builder.as_ref()
    }

    /// The URL rewriter, if any.
    #[must_use]
    pub fn rewriter(&self) -> Option<&Arc<dyn UrlRewriter>> {
        self.rewriter.as_ref()
    }

    /// Route-specific fetch options, if any.
    #[must_use]
    pub fn fetch_options(&self) -> Option<&FetchOptions> {
        self.fetch_options.as_ref()
    }

    /// Resolves a keyword to a search URL.
    pub fn build_url(&self, keyword: &str, options: &SiteOptions) -> Result<String, SearchError> {
        match self.url_builder {
            Some(ref builder) => builder.build(keyword, options),
            None => Err(SearchError::validation(format!(
                "keyword search is not supported for sitename : {}",
                self.name
            ))),
        }
    }
}

impl fmt::Debug for SiteRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteRoute")
            .field("name", &self.name)
            .field("download_type", &self.downloader.download_type())
            .field("extractor", &self.extractor.name())
            .field("url_builder", &self.url_builder.is_some())
            .field("rewriter", &self.rewriter.is_some())
            .finish()
    }
}

/// Registry of site routes.
#[derive(Default)]
pub struct RoutingTable {
    routes: RwLock<HashMap<String, Arc<SiteRoute>>>,
}

impl RoutingTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route, replacing any route with the same name.
    pub fn register(&self, route: SiteRoute) {
        tracing::debug!(site = %route.name, "Registered site route");
        self.routes
            .write()
            .insert(route.name.clone(), Arc::new(route));
    }

    /// Adds a route and returns the table.
    #[must_use]
    pub fn with_route(self, route: SiteRoute) -> Self {
        self.register(route);
        self
    }

    /// Looks up a route by site identifier.
    pub fn get(&self, site: &str) -> Result<Arc<SiteRoute>, SearchError> {
        let key = site.trim().to_lowercase();
        self.routes
            .read()
            .get(&key)
            .cloned()
            .ok_or(SearchError::UnknownSite(key))
    }

    /// Whether a route exists.
    #[must_use]
    pub fn contains(&self, site: &str) -> bool {
        self.routes
            .read()
            .contains_key(&site.trim().to_lowercase())
    }

    /// Registered route names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.read().keys().cloned().collect();
        names.sort();
        names
    }
}
