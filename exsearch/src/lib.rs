//! # Exsearch
//!
//! Download coordination, caching and extraction orchestration for
//! e-commerce price search.
//!
//! Many independent workers fetch search-result pages from third-party
//! sites. Exsearch keeps them from hammering the same origin and from
//! refetching fresh pages:
//!
//! - **Content cache**: documents are cached per URL with a TTL
//! - **Domain locks**: an advisory per-origin status record makes workers
//!   wait while another one is fetching from the same site
//! - **Routing**: a site identifier selects the downloader, the extraction
//!   strategy and the URL helpers
//! - **Activity log**: every request leaves exactly one task record
//! - **Cancellation**: waiting on a busy origin stops when the caller leaves
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use exsearch::prelude::*;
//!
//! let routes = Arc::new(RoutingTable::new().with_route(SiteRoute::new(
//!     "shop",
//!     Arc::new(HttpDownloader::new(&config.fetch)?),
//!     Arc::new(CatalogExtractor::new(catalog, "shop")),
//! )));
//!
//! let orchestrator = SearchOrchestrator::new(&config, routes, cache, locks, activity)?;
//! orchestrator.startup().await?;
//!
//! let response = orchestrator
//!     .search(&SearchRequest::for_keyword("shop", "console"))
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod activity;
pub mod cancellation;
pub mod config;
pub mod coordination;
pub mod download;
pub mod errors;
pub mod extraction;
pub mod observability;
pub mod routing;
pub mod search;
pub mod stores;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::activity::{
        ActivityLog, ActivityLogStore, InMemoryActivityLog, SearchTask, TaskQuery, TaskStatus,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{
        CacheConfig, DomainLockConfig, DownloadConfig, ExSearchConfig, FetchConfig,
        RenderApiConfig,
    };
    pub use crate::coordination::{DownloadRequest, FetchedDocument, HtmlDownloader, WaitPolicy};
    pub use crate::download::{Cookie, Downloader, FetchOptions, RenderOptions, RetryPolicy};
    #[cfg(feature = "http")]
    pub use crate::download::{HttpDownloader, RenderApiDownloader};
    pub use crate::errors::{
        ConfigError, DownloadError, ErrorKind, ExtractionError, SearchError, StoreError,
    };
    pub use crate::extraction::{collapse_duplicates, ExtractionStrategy, ResultItem};
    #[cfg(feature = "rules")]
    pub use crate::extraction::{CatalogExtractor, FieldRule, RuleSet, RuleSetCatalog};
    pub use crate::observability::{init_tracing, LoggingConfig};
    pub use crate::routing::{
        QueryParamRewriter, QueryUrlBuilder, RoutingTable, SiteOptions, SiteRoute, TargetUrl,
    };
    pub use crate::search::{SearchOrchestrator, SearchRequest, SearchResponse, SearchResult};
    pub use crate::stores::{
        CachedDocument, ContentCacheStore, DomainLockStatus, DomainLockStore, DownloadType,
        InMemoryContentCache, InMemoryDomainLockStore,
    };
    pub use crate::utils::{generate_uuid, iso_timestamp, Timestamp};
}
