//! In-memory wiring for end-to-end tests.

use std::sync::Arc;

use crate::activity::{InMemoryActivityLog, SearchTask};
use crate::config::ExSearchConfig;
use crate::coordination::HtmlDownloader;
use crate::errors::ConfigError;
use crate::download::Downloader;
use crate::extraction::ExtractionStrategy;
use crate::routing::{RoutingTable, SiteRoute};
use crate::search::SearchOrchestrator;
use crate::stores::{CachedDocument, InMemoryContentCache, InMemoryDomainLockStore};

/// In-memory stores, a routing table and the configuration to wire an
/// orchestrator from.
pub struct TestHarness {
    /// Configuration used for every component built here.
    pub config: ExSearchConfig,
    /// Routing table shared by built components.
    pub routes: Arc<RoutingTable>,
    /// Content cache.
    pub cache: Arc<InMemoryContentCache>,
    /// Domain lock store.
    pub locks: Arc<InMemoryDomainLockStore>,
    /// Activity log store.
    pub activity: Arc<InMemoryActivityLog>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Creates a harness with default configuration and no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ExSearchConfig::default())
    }

    /// Creates a harness with the given configuration.
    #[must_use]
    pub fn with_config(config: ExSearchConfig) -> Self {
        Self {
            config,
            routes: Arc::new(RoutingTable::new()),
            cache: Arc::new(InMemoryContentCache::new()),
            locks: Arc::new(InMemoryDomainLockStore::new()),
            activity: Arc::new(InMemoryActivityLog::new()),
        }
    }

    /// Registers a site served by `downloader` and `extractor`.
    #[must_use]
    pub fn with_site(
        self,
        name: &str,
        downloader: Arc<dyn Downloader>,
        extractor: Arc<dyn ExtractionStrategy>,
    ) -> Self {
        self.with_route(SiteRoute::new(name, downloader, extractor))
    }

    /// Registers a fully built route.
    #[must_use]
    pub fn with_route(self, route: SiteRoute) -> Self {
        self.routes.register(route);
        self
    }

    /// Builds an orchestrator over the harness stores.
    pub fn orchestrator(&self) -> Result<SearchOrchestrator, ConfigError> {
        SearchOrchestrator::new(
            &self.config,
            self.routes.clone(),
            self.cache.clone(),
            self.locks.clone(),
            self.activity.clone(),
        )
    }

    /// Builds a coordinating downloader over the harness stores.
    pub fn html_downloader(&self) -> Result<HtmlDownloader, ConfigError> {
        HtmlDownloader::new(
            &self.config,
            self.routes.clone(),
            self.cache.clone(),
            self.locks.clone(),
        )
    }

    /// Every task recorded so far, oldest first.
    #[must_use]
    pub fn tasks(&self) -> Vec<SearchTask> {
        let mut tasks = self.activity.all();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        tasks
    }

    /// Every cached document for `url`, expired ones included.
    #[must_use]
    pub fn cached(&self, url: &str) -> Vec<CachedDocument> {
        self.cache.all_for(url)
    }
}
