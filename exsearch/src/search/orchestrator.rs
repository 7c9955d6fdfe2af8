//! Request orchestration: resolve, record, fetch, extract, cache.

use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::models::{SearchRequest, SearchResponse, SearchResult};
use crate::activity::{ActivityLog, ActivityLogStore, SEARCH_ACTIVITY, UNRESOLVED_TARGET};
use crate::cancellation::CancellationToken;
use crate::config::ExSearchConfig;
use crate::coordination::{DownloadRequest, FetchedDocument, HtmlDownloader};
use crate::errors::{ConfigError, ErrorKind, SearchError};
use crate::extraction::collapse_duplicates;
use crate::routing::{RoutingTable, SiteRoute, TargetUrl};
use crate::stores::{ContentCacheStore, DomainLockStore};
use crate::utils::{add_duration, now_utc};

/// Caller type recorded on tasks unless overridden.
pub const DEFAULT_CALLER_TYPE: &str = "api";

/// Message returned when the activity log refuses a new task.
pub const TASK_NOT_CREATED: &str = "task is not created";

/// Runs searches end to end.
///
/// Each request gets one activity task. The task is created before any
/// fetch and ends in exactly one terminal status, except when the caller
/// cancels while waiting on a busy origin: then it stays PENDING.
pub struct SearchOrchestrator {
    routes: Arc<RoutingTable>,
    html: HtmlDownloader,
    cache: Arc<dyn ContentCacheStore>,
    activity: ActivityLog,
    cache_ttl: Option<Duration>,
    clear_locks_on_startup: bool,
    caller_type: String,
}

impl SearchOrchestrator {
    /// Wires an orchestrator from configuration and stores.
    ///
    /// Fails when the configuration does not validate.
    pub fn new(
        config: &ExSearchConfig,
        routes: Arc<RoutingTable>,
        cache: Arc<dyn ContentCacheStore>,
        locks: Arc<dyn DomainLockStore>,
        activity: Arc<dyn ActivityLogStore>,
    ) -> Result<Self, ConfigError> {
        let html = HtmlDownloader::new(config, routes.clone(), cache.clone(), locks)?;
        Ok(Self {
            routes,
            html,
            cache,
            activity: ActivityLog::new(activity),
            cache_ttl: config.cache.ttl(),
            clear_locks_on_startup: config.domain_lock.clear_on_startup,
            caller_type: DEFAULT_CALLER_TYPE.to_string(),
        })
    }

    /// Sets the caller type recorded on tasks.
    #[must_use]
    pub fn with_caller_type(mut self, caller_type: impl Into<String>) -> Self {
        self.caller_type = caller_type.into();
        self
    }

    /// The coordinating downloader.
    #[must_use]
    pub fn html_downloader(&self) -> &HtmlDownloader {
        &self.html
    }

    /// The activity log.
    #[must_use]
    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// The routing table.
    #[must_use]
    pub fn routes(&self) -> &Arc<RoutingTable> {
        &self.routes
    }

    /// Service start-up hook. Drops domain locks left behind by a previous
    /// process when configured to. Returns how many were removed.
    pub async fn startup(&self) -> Result<usize, SearchError> {
        if !self.clear_locks_on_startup {
            return Ok(0);
        }
        self.html.clear_domain_locks().await
    }

    /// Runs one search.
    pub async fn search(&self, request: &SearchRequest) -> SearchResponse {
        self.search_with_cancel(request, None).await
    }

    /// Runs several searches concurrently, one task each. Responses keep
    /// the order of `requests`.
    pub async fn search_all(&self, requests: &[SearchRequest]) -> Vec<SearchResponse> {
        join_all(requests.iter().map(|request| self.search(request))).await
    }

    /// Runs one search, giving up the origin wait when `cancel` fires.
    pub async fn search_with_cancel(
        &self,
        request: &SearchRequest,
        cancel: Option<&CancellationToken>,
    ) -> SearchResponse {
        let started = Instant::now();
        let site = request.sitename.as_str();

        let raw_url = match self.resolve_url(request) {
            Ok(url) => url,
            Err(e) => return self.reject(UNRESOLVED_TARGET, &e).await,
        };
        let target = match TargetUrl::parse(&raw_url) {
            Ok(target) => target,
            Err(e) => return self.reject(UNRESOLVED_TARGET, &e).await,
        };
        let route = match self.routes.get(site) {
            Ok(route) => route,
            Err(e) => return self.reject(target.origin(), &e).await,
        };

        let task_id = match self.open_task(target.origin(), request).await {
            Some(id) => id,
            None => return SearchResponse::failure(TASK_NOT_CREATED, ErrorKind::Store),
        };

        let outcome = self.run(task_id, &route, target, request, cancel).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(results) => {
                tracing::info!(task_id = %task_id, site, results = results.len(), elapsed_ms, "Search finished");
                SearchResponse::ok(results)
            }
            Err(e) => {
                tracing::info!(task_id = %task_id, site, error = %e, kind = %e.kind(), elapsed_ms, "Search failed");
                SearchResponse::failure(e.to_string(), e.kind())
            }
        }
    }

    fn resolve_url(&self, request: &SearchRequest) -> Result<String, SearchError> {
        if let Some(url) = request.given_url() {
            return Ok(url.to_string());
        }
        let keyword = request
            .given_keyword()
            .ok_or_else(|| SearchError::validation("either url or search_keyword is required"))?;
        self.routes
            .get(&request.sitename)?
            .build_url(keyword, &request.options)
    }

    async fn reject(&self, target_table: &str, error: &SearchError) -> SearchResponse {
        let message = error.to_string();
        if let Err(e) = self
            .activity
            .create_failed(target_table, SEARCH_ACTIVITY, &self.caller_type, &message)
            .await
        {
            tracing::warn!(target_table, error = %e, "Could not record rejected request");
        }
        SearchResponse::failure(message, error.kind())
    }

    async fn open_task(&self, origin: &str, request: &SearchRequest) -> Option<Uuid> {
        let mut metadata = Map::new();
        metadata.insert(
            "request".to_string(),
            serde_json::to_value(request).unwrap_or(Value::Null),
        );
        match self
            .activity
            .create(origin, SEARCH_ACTIVITY, &self.caller_type, metadata)
            .await
        {
            Ok(task) => task.id,
            Err(e) => {
                tracing::warn!(origin, error = %e, "Task is not created");
                None
            }
        }
    }

    async fn run(
        &self,
        task_id: Uuid,
        route: &SiteRoute,
        target: TargetUrl,
        request: &SearchRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let target = self.rewrite(task_id, route, target, request).await;
        let url = target.as_str().to_string();

        let download = DownloadRequest::new(url.as_str(), route.name())
            .with_options(request.options.clone())
            .with_no_cache(request.no_cache);
        let fetched = match self.html.fetch(&download, cancel).await {
            Ok(fetched) => fetched,
            Err(e @ SearchError::Cancelled(_)) => {
                tracing::info!(task_id = %task_id, url = %url, "Search cancelled while waiting, task left pending");
                return Err(e);
            }
            Err(e) => {
                self.fail(task_id, &e).await;
                return Err(e);
            }
        };

        let extracted = route
            .extractor()
            .extract(&fetched.document.text, &url, &request.options);
        let cache_outcome = self.persist(&fetched).await;

        let items = match extracted {
            Ok(items) => items,
            Err(e) => {
                let e = SearchError::from(e);
                self.fail(task_id, &e).await;
                return Err(e);
            }
        };
        let items = if request.options.remove_duplicates() {
            collapse_duplicates(items, true)
        } else {
            items
        };
        let results = items
            .into_iter()
            .map(|item| SearchResult::from_item(item, route.name(), &url))
            .collect();

        let finished = match cache_outcome {
            Ok(()) => self.activity.completed(task_id).await,
            Err(e) => {
                self.activity
                    .completed_with_errors(task_id, &format!("cache write failed: {e}"))
                    .await
            }
        };
        if let Err(e) = finished {
            tracing::warn!(task_id = %task_id, error = %e, "Could not complete task");
        }
        Ok(results)
    }

    async fn rewrite(
        &self,
        task_id: Uuid,
        route: &SiteRoute,
        target: TargetUrl,
        request: &SearchRequest,
    ) -> TargetUrl {
        let Some(rewritten) = route
            .rewriter()
            .and_then(|r| r.rewrite(target.url(), &request.options))
        else {
            return target;
        };
        let rewritten = match TargetUrl::from_url(rewritten) {
            Ok(rewritten) => rewritten,
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "Ignoring invalid rewritten url");
                return target;
            }
        };
        if rewritten == target {
            return target;
        }

        let patch = json!({
            "original_url": target.as_str(),
            "rewritten_url": rewritten.as_str(),
        });
        if let Value::Object(patch) = patch {
            if let Err(e) = self.activity.annotate(task_id, patch).await {
                tracing::warn!(task_id = %task_id, error = %e, "Could not record url rewrite");
            }
        }
        tracing::debug!(task_id = %task_id, from = target.as_str(), to = rewritten.as_str(), "Rewrote url");
        rewritten
    }

    /// Writes a freshly fetched, non-empty document with the configured TTL.
    async fn persist(&self, fetched: &FetchedDocument) -> Result<(), SearchError> {
        let Some(ttl) = self.cache_ttl else {
            return Ok(());
        };
        if fetched.from_cache || !fetched.document.has_text() {
            return Ok(());
        }

        let document = fetched
            .document
            .clone()
            .with_expires_at(add_duration(&now_utc(), ttl));
        match self.cache.set(document).await {
            Ok(stored) => {
                tracing::debug!(url = %stored.url, id = ?stored.id, ttl_s = ttl.as_secs(), "Cached document");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(url = %fetched.document.url, error = %e, "Cache write failed");
                Err(e.into())
            }
        }
    }

    async fn fail(&self, task_id: Uuid, error: &SearchError) {
        if let Err(e) = self.activity.failed(task_id, &error.to_string()).await {
            tracing::warn!(task_id = %task_id, error = %e, "Could not mark task failed");
        }
    }
}
