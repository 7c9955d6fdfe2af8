//! Cache lookup, domain lock coordination and dispatch to a downloader.

use std::sync::Arc;
use std::time::Duration;

use super::wait::{wait_for_downloadable, WaitPolicy};
use crate::cancellation::CancellationToken;
use crate::config::ExSearchConfig;
use crate::download::{Cookie, FetchOptions, RenderOptions};
use crate::errors::{ConfigError, SearchError};
use crate::routing::{RoutingTable, SiteOptions, SiteRoute, TargetUrl};
use crate::stores::{
    newest_document, CachedDocument, ContentCacheStore, DomainLockStatus, DomainLockStore,
};
use crate::utils::now_utc;

/// Option key carrying rendering options for rendering downloaders.
pub const RENDER_OPTION: &str = "render";

/// Option key carrying extra cookies.
pub const COOKIES_OPTION: &str = "cookies";

/// One fetch request.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Target URL.
    pub url: String,
    /// Routing key.
    pub site: String,
    /// Per-site options.
    pub options: SiteOptions,
    /// Skip the cache lookup.
    pub no_cache: bool,
}

impl DownloadRequest {
    /// Creates a request with no options.
    #[must_use]
    pub fn new(url: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            site: site.into(),
            options: SiteOptions::new(),
            no_cache: false,
        }
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: SiteOptions) -> Self {
        self.options = options;
        self
    }

    /// Bypasses the cache.
    #[must_use]
    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }
}

/// A document ready for extraction.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// The document. Fresh fetches carry no id and no expiry yet.
    pub document: CachedDocument,
    /// Whether it came from the content cache.
    pub from_cache: bool,
}

/// Fetches documents while keeping concurrent workers off the same origin.
pub struct HtmlDownloader {
    routes: Arc<RoutingTable>,
    cache: Arc<dyn ContentCacheStore>,
    locks: Arc<dyn DomainLockStore>,
    wait: WaitPolicy,
    download_timeout: Duration,
    lock_ttl: Duration,
    fetch_defaults: FetchOptions,
}

impl HtmlDownloader {
    /// Creates a downloader. Fails when the configuration does not validate.
    pub fn new(
        config: &ExSearchConfig,
        routes: Arc<RoutingTable>,
        cache: Arc<dyn ContentCacheStore>,
        locks: Arc<dyn DomainLockStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            routes,
            cache,
            locks,
            wait: WaitPolicy::new(config.download.poll_interval(), config.download.wait_timeout()),
            download_timeout: config.download.download_timeout(),
            lock_ttl: config.domain_lock.ttl(),
            fetch_defaults: config.fetch.fetch_options(),
        })
    }

    /// The wait policy in effect.
    #[must_use]
    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    /// Drops every domain lock record. Returns how many were removed.
    pub async fn clear_domain_locks(&self) -> Result<usize, SearchError> {
        let removed = self.locks.clear_all().await?;
        tracing::info!(removed, "Cleared domain locks");
        Ok(removed)
    }

    /// Returns a document for the request, from cache or freshly fetched.
    ///
    /// A fresh document is not written to the cache here; the caller decides
    /// whether to persist it.
    pub async fn fetch(
        &self,
        request: &DownloadRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<FetchedDocument, SearchError> {
        let target = TargetUrl::parse(&request.url)?;
        let route = self.routes.get(&request.site)?;
        let url = target.as_str();
        let origin = target.origin();

        if !request.no_cache {
            if let Some(document) = self.cached(url).await {
                tracing::debug!(url, origin, "Cache hit");
                return Ok(FetchedDocument {
                    document,
                    from_cache: true,
                });
            }
        }

        let report = wait_for_downloadable(self.locks.as_ref(), origin, &self.wait, cancel)
            .await?;
        if report.polls > 0 {
            tracing::debug!(
                origin,
                polls = report.polls,
                waited_ms = u64::try_from(report.waited.as_millis()).unwrap_or(u64::MAX),
                "Domain became downloadable"
            );
        }

        self.locks
            .set(origin, DomainLockStatus::Downloading, self.lock_ttl)
            .await?;

        let options = self.fetch_options(&route, &request.options);
        let downloader = route.downloader();
        let deadline = self.download_timeout;
        let outcome = tokio::time::timeout(deadline, downloader.fetch(url, &options)).await;

        let text = match outcome {
            Ok(Ok(text)) => {
                self.release(origin, DomainLockStatus::Completed).await;
                text
            }
            Ok(Err(e)) => {
                self.release(origin, DomainLockStatus::Failed).await;
                tracing::info!(url, origin, error = %e, "Download failed");
                return Err(SearchError::transport(url, e.to_string()));
            }
            Err(_) => {
                self.release(origin, DomainLockStatus::Failed).await;
                tracing::info!(url, origin, timeout_s = deadline.as_secs_f64(), "Download timed out");
                return Err(SearchError::DownloadTimeout {
                    url: url.to_string(),
                    timeout: deadline,
                });
            }
        };

        tracing::info!(url, origin, site = route.name(), bytes = text.len(), "Downloaded document");
        Ok(FetchedDocument {
            document: CachedDocument::new(url, origin, downloader.download_type(), text),
            from_cache: false,
        })
    }

    async fn cached(&self, url: &str) -> Option<CachedDocument> {
        match self.cache.get(url, now_utc()).await {
            Ok(docs) => newest_document(docs).filter(CachedDocument::has_text),
            Err(e) => {
                tracing::warn!(url, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn release(&self, origin: &str, status: DomainLockStatus) {
        if let Err(e) = self.locks.set(origin, status, self.lock_ttl).await {
            tracing::warn!(origin, status = %status, error = %e, "Domain lock write failed");
        }
    }

    fn fetch_options(&self, route: &SiteRoute, options: &SiteOptions) -> FetchOptions {
        let mut fetch = route
            .fetch_options()
            .cloned()
            .unwrap_or_else(|| self.fetch_defaults.clone());
        if let Some(render) = options.get_as::<RenderOptions>(RENDER_OPTION) {
            fetch.render = Some(render);
        }
        if let Some(cookies) = options.get_as::<Vec<Cookie>>(COOKIES_OPTION) {
            fetch.cookies.extend(cookies);
        }
        fetch
    }
}
