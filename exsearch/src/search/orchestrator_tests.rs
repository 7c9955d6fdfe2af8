//! End-to-end tests for SearchOrchestrator over in-memory stores.

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    use crate::activity::{MockActivityLogStore, TaskStatus, UNRESOLVED_TARGET};
    use crate::cancellation::CancellationToken;
    use crate::config::{DownloadConfig, ExSearchConfig};
    use crate::errors::{ErrorKind, StoreError};
    use crate::extraction::ResultItem;
    use crate::routing::{QueryParamRewriter, QueryUrlBuilder, SiteOptions, SiteRoute};
    use crate::search::{SearchOrchestrator, SearchRequest, TASK_NOT_CREATED};
    use crate::stores::{
        DomainLockRecord, DomainLockStatus, InMemoryDomainLockStore, MockContentCacheStore,
        MockDomainLockStore,
    };
    use crate::testing::{
        assert_response_failed, assert_response_ok, assert_task_status, FailingExtractor,
        MockDownloader, StaticExtractor, TestHarness,
    };
    use crate::utils::now_utc;

    const URL: &str = "https://example.com/search?q=console";

    fn items() -> Vec<ResultItem> {
        vec![
            ResultItem::new("Console A").with_price(100).with_point(10),
            ResultItem::new("Console B").with_price(200),
        ]
    }

    fn shop(
        downloader: MockDownloader,
        extractor: StaticExtractor,
    ) -> (TestHarness, Arc<MockDownloader>, Arc<StaticExtractor>) {
        let downloader = Arc::new(downloader);
        let extractor = Arc::new(extractor);
        let harness = TestHarness::new().with_site("shop", downloader.clone(), extractor.clone());
        (harness, downloader, extractor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_search_fetches_extracts_caches_and_completes() {
        let (harness, downloader, extractor) =
            shop(MockDownloader::new().with_text("<html>list</html>"), StaticExtractor::new(items()));
        let orchestrator = harness.orchestrator().unwrap();

        let response = orchestrator.search(&SearchRequest::for_url("shop", URL)).await;

        assert_response_ok(&response);
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.results[0].title.as_deref(), Some("Console A"));
        assert_eq!(response.results[0].url.as_deref(), Some(URL));
        assert_eq!(response.results[0].sitename.as_deref(), Some("shop"));
        assert_eq!(response.results[0].others.as_ref().unwrap()["point"], json!(10));
        assert_eq!(response.results[1].others.as_ref().unwrap()["point"], json!(0));
        assert_eq!(downloader.call_count(), 1);
        assert_eq!(extractor.call_count(), 1);

        let tasks = harness.tasks();
        assert_eq!(tasks.len(), 1);
        assert_task_status(&tasks[0], TaskStatus::Completed);
        assert_eq!(tasks[0].target_table, "example.com");

        let cached = harness.cached(URL);
        assert_eq!(cached.len(), 1);
        let ttl = cached[0].expires_at.unwrap() - cached[0].created_at;
        assert!(ttl.num_seconds() >= 299 && ttl.num_seconds() <= 300);
        assert_eq!(cached[0].text, "<html>list</html>");

        assert_eq!(
            harness.locks.peek("example.com").unwrap().status,
            DomainLockStatus::Completed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_search_is_served_from_cache() {
        let (harness, downloader, extractor) =
            shop(MockDownloader::new().with_text("<html>list</html>"), StaticExtractor::new(items()));
        let orchestrator = harness.orchestrator().unwrap();
        let request = SearchRequest::for_url("shop", URL);

        assert_response_ok(&orchestrator.search(&request).await);
        let second = orchestrator.search(&request).await;

        assert_response_ok(&second);
        assert_eq!(second.results.len(), 2);
        assert_eq!(downloader.call_count(), 1);
        assert_eq!(extractor.call_count(), 2);
        assert_eq!(harness.cached(URL).len(), 1);
        assert!(harness.tasks().iter().all(|t| t.status == TaskStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cache_refetches_and_adds_an_entry() {
        let (harness, downloader, _) =
            shop(MockDownloader::new().with_text("v1").with_text("v2"), StaticExtractor::new(items()));
        let orchestrator = harness.orchestrator().unwrap();

        orchestrator.search(&SearchRequest::for_url("shop", URL)).await;
        let response = orchestrator
            .search(&SearchRequest::for_url("shop", URL).with_no_cache(true))
            .await;

        assert_response_ok(&response);
        assert_eq!(downloader.call_count(), 2);
        assert_eq!(harness.cached(URL).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_site_keyword_records_failed_task_without_target() {
        let (harness, downloader, _) = shop(MockDownloader::new(), StaticExtractor::new(items()));

        let response = harness
            .orchestrator().unwrap()
            .search(&SearchRequest::for_keyword("nowhere", "ps5"))
            .await;

        assert_response_failed(&response, ErrorKind::Validation);
        assert_eq!(response.error_msg, "not supported sitename : nowhere");
        let tasks = harness.tasks();
        assert_eq!(tasks.len(), 1);
        assert_task_status(&tasks[0], TaskStatus::Failed);
        assert_eq!(tasks[0].target_table, UNRESOLVED_TARGET);
        assert_eq!(downloader.call_count(), 0);
        assert!(harness.locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_url_and_missing_target_fail_fast() {
        let (harness, downloader, _) = shop(MockDownloader::new(), StaticExtractor::new(items()));
        let orchestrator = harness.orchestrator().unwrap();

        let invalid = orchestrator
            .search(&SearchRequest::for_url("shop", "ftp://example.com/list"))
            .await;
        assert_response_failed(&invalid, ErrorKind::Validation);

        let empty = orchestrator.search(&SearchRequest::for_url("shop", "  ")).await;
        assert_response_failed(&empty, ErrorKind::Validation);

        let tasks = harness.tasks();
        assert_eq!(tasks.len(), 2);
        assert!(tasks
            .iter()
            .all(|t| t.status == TaskStatus::Failed && t.target_table == UNRESOLVED_TARGET));
        assert_eq!(downloader.call_count(), 0);
        assert!(harness.locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_site_with_url_records_origin() {
        let (harness, downloader, _) = shop(MockDownloader::new(), StaticExtractor::new(items()));

        let response = harness
            .orchestrator().unwrap()
            .search(&SearchRequest::for_url("elsewhere", URL))
            .await;

        assert_response_failed(&response, ErrorKind::Validation);
        let tasks = harness.tasks();
        assert_eq!(tasks[0].target_table, "example.com");
        assert_task_status(&tasks[0], TaskStatus::Failed);
        assert_eq!(downloader.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keyword_is_resolved_by_the_site_url_builder() {
        let downloader = Arc::new(MockDownloader::new().with_text("<html/>"));
        let route = SiteRoute::new(
            "shop",
            downloader.clone(),
            Arc::new(StaticExtractor::new(Vec::new())),
        )
        .with_url_builder(Arc::new(
            QueryUrlBuilder::new("https://shop.example/search", "q").unwrap(),
        ));
        let harness = TestHarness::new().with_route(route);

        let response = harness
            .orchestrator().unwrap()
            .search(&SearchRequest::for_keyword("shop", "ps5"))
            .await;

        assert_response_ok(&response);
        assert_eq!(downloader.calls()[0].0, "https://shop.example/search?q=ps5");
        assert_eq!(harness.tasks()[0].target_table, "shop.example");
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_failure_marks_task_and_lock_failed() {
        let (harness, _, extractor) = shop(
            MockDownloader::new().with_error("connection reset"),
            StaticExtractor::new(items()),
        );

        let response = harness
            .orchestrator().unwrap()
            .search(&SearchRequest::for_url("shop", URL))
            .await;

        assert_response_failed(&response, ErrorKind::Transport);
        assert!(response.error_msg.starts_with("download error, connection reset"));
        let task = &harness.tasks()[0];
        assert_task_status(task, TaskStatus::Failed);
        assert_eq!(task.error_msg.as_deref(), Some(response.error_msg.as_str()));
        assert_eq!(
            harness.locks.peek("example.com").unwrap().status,
            DomainLockStatus::Failed
        );
        assert_eq!(extractor.call_count(), 0);
        assert!(harness.cached(URL).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_failure_fails_task_but_keeps_document() {
        let downloader = Arc::new(MockDownloader::new().with_text("<html>odd</html>"));
        let extractor = Arc::new(FailingExtractor::new("ValueError", "no price"));
        let harness = TestHarness::new().with_site("shop", downloader.clone(), extractor.clone());
        let orchestrator = harness.orchestrator().unwrap();

        let response = orchestrator.search(&SearchRequest::for_url("shop", URL)).await;

        assert_response_failed(&response, ErrorKind::Extraction);
        assert_eq!(response.error_msg, "parse error. ValueError: no price");
        assert_task_status(&harness.tasks()[0], TaskStatus::Failed);
        assert_eq!(harness.cached(URL).len(), 1);

        // the cached document spares the next request a fetch
        orchestrator.search(&SearchRequest::for_url("shop", URL)).await;
        assert_eq!(downloader.call_count(), 1);
        assert_eq!(extractor.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_document_is_not_cached() {
        let (harness, _, extractor) =
            shop(MockDownloader::new().with_text(""), StaticExtractor::new(Vec::new()));

        let response = harness
            .orchestrator().unwrap()
            .search(&SearchRequest::for_url("shop", URL))
            .await;

        assert_response_ok(&response);
        assert!(response.results.is_empty());
        assert_eq!(extractor.call_count(), 1);
        assert!(harness.cached(URL).is_empty());
        assert_task_status(&harness.tasks()[0], TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_disabled_writes_nothing() {
        let downloader = Arc::new(MockDownloader::new().with_text("<html/>"));
        let harness = TestHarness::with_config(ExSearchConfig::default().with_cache_expires(0))
            .with_site("shop", downloader, Arc::new(StaticExtractor::new(items())));

        let response = harness
            .orchestrator().unwrap()
            .search(&SearchRequest::for_url("shop", URL))
            .await;

        assert_response_ok(&response);
        assert!(harness.cached(URL).is_empty());
        assert_task_status(&harness.tasks()[0], TaskStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_write_failure_completes_with_errors() {
        let harness = TestHarness::new().with_site(
            "shop",
            Arc::new(MockDownloader::new().with_text("<html/>")),
            Arc::new(StaticExtractor::new(items())),
        );
        let mut cache = MockContentCacheStore::new();
        cache.expect_get().returning(|_, _| Ok(Vec::new()));
        cache
            .expect_set()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("read-only replica".into())));
        let orchestrator = SearchOrchestrator::new(
            &harness.config,
            harness.routes.clone(),
            Arc::new(cache),
            harness.locks.clone(),
            harness.activity.clone(),
        )
        .unwrap();

        let response = orchestrator.search(&SearchRequest::for_url("shop", URL)).await;

        assert_response_ok(&response);
        assert_eq!(response.results.len(), 2);
        let task = &harness.tasks()[0];
        assert_task_status(task, TaskStatus::CompletedWithErrors);
        assert!(task.error_msg.as_deref().unwrap().contains("read-only replica"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicates_are_collapsed_unless_disabled() {
        let duplicated = vec![
            ResultItem::new("A"),
            ResultItem::new("A"),
            ResultItem::new("B"),
        ];
        let (harness, _, _) =
            shop(MockDownloader::new().with_text("<html/>"), StaticExtractor::new(duplicated));
        let orchestrator = harness.orchestrator().unwrap();

        let collapsed = orchestrator.search(&SearchRequest::for_url("shop", URL)).await;
        let summary: Vec<(Option<String>, Option<i64>)> = collapsed
            .results
            .iter()
            .map(|r| (r.title.clone(), r.stock_quantity))
            .collect();
        assert_eq!(
            summary,
            vec![(Some("A".to_string()), Some(2)), (Some("B".to_string()), Some(1))]
        );

        let kept = orchestrator
            .search(
                &SearchRequest::for_url("shop", URL)
                    .with_options(SiteOptions::new().with("remove_duplicates", false)),
            )
            .await;
        assert_eq!(kept.results.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_and_rewrite_are_recorded_in_metadata() {
        let downloader = Arc::new(MockDownloader::new().with_text("<html/>"));
        let route = SiteRoute::new(
            "shop",
            downloader.clone(),
            Arc::new(StaticExtractor::new(Vec::new())),
        )
        .with_rewriter(Arc::new(
            QueryParamRewriter::new("convert_to_direct_search").set_param("direct", "1"),
        ));
        let harness = TestHarness::new().with_route(route);
        let request = SearchRequest::for_url("shop", URL)
            .with_options(SiteOptions::new().with("convert_to_direct_search", true));

        let response = harness.orchestrator().unwrap().search(&request).await;

        assert_response_ok(&response);
        let expected = "https://example.com/search?q=console&direct=1";
        assert_eq!(downloader.calls()[0].0, expected);
        assert_eq!(response.results.len(), 0);

        let metadata = Value::Object(harness.tasks()[0].metadata.clone());
        assert_eq!(metadata["original_url"], json!(URL));
        assert_eq!(metadata["rewritten_url"], json!(expected));
        assert_eq!(metadata["request"]["sitename"], json!("shop"));
        assert_eq!(metadata["request"]["url"], json!(URL));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_store_failure_stops_before_fetch() {
        let (harness, downloader, _) =
            shop(MockDownloader::new().with_text("<html/>"), StaticExtractor::new(items()));
        let mut activity = MockActivityLogStore::new();
        activity
            .expect_create()
            .returning(|_| Err(StoreError::Unavailable("db down".into())));
        let orchestrator = SearchOrchestrator::new(
            &harness.config,
            harness.routes.clone(),
            harness.cache.clone(),
            harness.locks.clone(),
            Arc::new(activity),
        )
        .unwrap();

        let response = orchestrator.search(&SearchRequest::for_url("shop", URL)).await;

        assert_response_failed(&response, ErrorKind::Store);
        assert_eq!(response.error_msg, TASK_NOT_CREATED);
        assert_eq!(downloader.call_count(), 0);
        assert!(harness.locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_leaves_task_pending() {
        let (harness, downloader, _) =
            shop(MockDownloader::new().with_text("<html/>"), StaticExtractor::new(items()));
        harness.locks.insert_record(
            "example.com",
            DomainLockRecord::new(DomainLockStatus::Downloading),
            Duration::from_secs(3600),
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            canceller.cancel("client disconnected");
        });

        let response = harness
            .orchestrator().unwrap()
            .search_with_cancel(&SearchRequest::for_url("shop", URL), Some(&token))
            .await;

        assert_response_failed(&response, ErrorKind::Cancelled);
        assert_task_status(&harness.tasks()[0], TaskStatus::Pending);
        assert_eq!(downloader.call_count(), 0);
        assert_eq!(
            harness.locks.peek("example.com").unwrap().status,
            DomainLockStatus::Downloading
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_origin_times_out_distinctly() {
        let config =
            ExSearchConfig::default().with_download(DownloadConfig::new().with_wait_timeout(2.0));
        let downloader = Arc::new(MockDownloader::new().with_text("<html/>"));
        let harness = TestHarness::with_config(config).with_site(
            "shop",
            downloader.clone(),
            Arc::new(StaticExtractor::new(items())),
        );
        harness.locks.insert_record(
            "example.com",
            DomainLockRecord::new(DomainLockStatus::Downloading),
            Duration::from_secs(3600),
        );

        let response = harness
            .orchestrator().unwrap()
            .search(&SearchRequest::for_url("shop", URL))
            .await;

        assert_response_failed(&response, ErrorKind::Timeout);
        assert!(response.error_msg.contains("DOWNLOADING"));
        assert_task_status(&harness.tasks()[0], TaskStatus::Failed);
        assert_eq!(downloader.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_origin_searches_do_not_overlap() {
        let (harness, downloader, _) = shop(
            MockDownloader::new()
                .with_text("<html/>")
                .with_latency(Duration::from_secs(2)),
            StaticExtractor::new(items()),
        );
        let orchestrator = harness.orchestrator().unwrap();
        let requests = vec![
            SearchRequest::for_url("shop", URL),
            SearchRequest::for_url("shop", "https://example.com/search?q=handheld"),
        ];

        let responses = orchestrator.search_all(&requests).await;

        assert!(responses.iter().all(|r| r.is_ok()));
        assert_eq!(downloader.call_count(), 2);
        assert_eq!(downloader.peak_in_flight(), 1);
        assert_eq!(harness.tasks().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_workers_that_both_see_no_lock_both_fetch() {
        let (harness, downloader, extractor) = shop(
            MockDownloader::new()
                .with_text("<html/>")
                .with_latency(Duration::from_secs(2)),
            StaticExtractor::new(items()),
        );
        let mut locks = MockDomainLockStore::new();
        locks.expect_get().times(2).returning(|_| Ok(None));
        locks
            .expect_set()
            .withf(|_, status, _| *status == DomainLockStatus::Downloading)
            .times(2)
            .returning(|_, _, _| Ok(()));
        locks
            .expect_set()
            .withf(|_, status, _| *status == DomainLockStatus::Completed)
            .times(2)
            .returning(|_, _, _| Ok(()));
        let orchestrator = SearchOrchestrator::new(
            &harness.config,
            harness.routes.clone(),
            harness.cache.clone(),
            Arc::new(locks),
            harness.activity.clone(),
        )
        .unwrap();
        let requests = vec![
            SearchRequest::for_url("shop", URL),
            SearchRequest::for_url("shop", URL),
        ];

        let responses = orchestrator.search_all(&requests).await;

        assert!(responses.iter().all(|r| r.is_ok()));
        assert_eq!(downloader.call_count(), 2);
        assert_eq!(downloader.peak_in_flight(), 2);
        assert_eq!(extractor.call_count(), 2);

        let tasks = harness.tasks();
        assert_eq!(tasks.len(), 2);
        for task in &tasks {
            assert_task_status(task, TaskStatus::Completed);
        }

        let cached = harness.cached(URL);
        assert_eq!(cached.len(), 2);
        assert_ne!(cached[0].id, cached[1].id);
        assert!(cached.iter().all(|doc| doc.text == "<html/>"));
    }

    #[test]
    fn test_invalid_config_is_rejected_at_construction() {
        let zero_poll = TestHarness::with_config(
            ExSearchConfig::default().with_download(DownloadConfig::new().with_poll_interval(0.0)),
        );
        let err = zero_poll.orchestrator().err().unwrap();
        assert!(err.to_string().contains("poll_interval_seconds"));
        assert!(zero_poll.html_downloader().is_err());

        let huge_wait = TestHarness::with_config(
            ExSearchConfig::default().with_download(DownloadConfig::new().with_wait_timeout(1e20)),
        );
        assert!(huge_wait.orchestrator().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_clears_stale_locks_when_configured() {
        let harness = TestHarness::new();
        harness.locks.insert_record(
            "example.com",
            DomainLockRecord::new(DomainLockStatus::Downloading),
            Duration::from_secs(3600),
        );
        assert_eq!(harness.orchestrator().unwrap().startup().await.unwrap(), 1);
        assert!(harness.locks.is_empty());

        let mut config = ExSearchConfig::default();
        config.domain_lock.clear_on_startup = false;
        let locks = Arc::new(InMemoryDomainLockStore::new());
        locks.insert_record(
            "example.com",
            DomainLockRecord {
                status: DomainLockStatus::Failed,
                updated_at: now_utc(),
            },
            Duration::from_secs(3600),
        );
        let orchestrator = SearchOrchestrator::new(
            &config,
            harness.routes.clone(),
            harness.cache.clone(),
            locks.clone(),
            harness.activity.clone(),
        )
        .unwrap();
        assert_eq!(orchestrator.startup().await.unwrap(), 0);
        assert_eq!(locks.len(), 1);
    }
}
