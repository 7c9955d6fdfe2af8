//! Downloader and extractor doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::download::{Downloader, FetchOptions};
use crate::errors::{DownloadError, ExtractionError};
use crate::extraction::{ExtractionStrategy, ResultItem};
use crate::routing::SiteOptions;
use crate::stores::DownloadType;

/// A scripted downloader.
///
/// Outcomes are returned in order; the last one repeats once the script is
/// exhausted. Every call is recorded before the configured latency elapses.
#[derive(Debug)]
pub struct MockDownloader {
    script: Mutex<Vec<Result<String, DownloadError>>>,
    latency: Duration,
    download_type: DownloadType,
    calls: Mutex<Vec<(String, FetchOptions)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for MockDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDownloader {
    /// Creates a downloader that returns empty text.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            download_type: DownloadType::DirectHttp,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Appends a successful outcome.
    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        self.script.get_mut().push(Ok(text.to_string()));
        self
    }

    /// Appends a transport failure.
    #[must_use]
    pub fn with_error(self, message: &str) -> Self {
        self.with_failure(DownloadError::Transport(message.to_string()))
    }

    /// Appends an arbitrary failure.
    #[must_use]
    pub fn with_failure(mut self, error: DownloadError) -> Self {
        self.script.get_mut().push(Err(error));
        self
    }

    /// Sleeps this long inside every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reports a different backend.
    #[must_use]
    pub fn with_download_type(mut self, download_type: DownloadType) -> Self {
        self.download_type = download_type;
        self
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Recorded `(url, options)` pairs.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, FetchOptions)> {
        self.calls.lock().clone()
    }

    /// Highest number of calls that were running at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<String, DownloadError> {
        let mut script = self.script.lock();
        match script.len() {
            0 => Ok(String::new()),
            1 => script[0].clone(),
            _ => script.remove(0),
        }
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    fn download_type(&self) -> DownloadType {
        self.download_type
    }

    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, DownloadError> {
        self.calls.lock().push((url.to_string(), options.clone()));
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.next_outcome()
    }
}

/// Returns the same items for every document.
#[derive(Debug)]
pub struct StaticExtractor {
    items: Vec<ResultItem>,
    calls: Mutex<Vec<String>>,
}

impl StaticExtractor {
    /// Creates an extractor returning `items`.
    #[must_use]
    pub fn new(items: Vec<ResultItem>) -> Self {
        Self {
            items,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Texts it was called with.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ExtractionStrategy for StaticExtractor {
    fn name(&self) -> &str {
        "static"
    }

    fn extract(
        &self,
        text: &str,
        _url: &str,
        _options: &SiteOptions,
    ) -> Result<Vec<ResultItem>, ExtractionError> {
        self.calls.lock().push(text.to_string());
        Ok(self.items.clone())
    }
}

/// Fails every extraction.
#[derive(Debug)]
pub struct FailingExtractor {
    kind: String,
    message: String,
    calls: AtomicUsize,
}

impl FailingExtractor {
    /// Fails with the given error type and message.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExtractionStrategy for FailingExtractor {
    fn name(&self) -> &str {
        "failing"
    }

    fn extract(
        &self,
        _text: &str,
        _url: &str,
        _options: &SiteOptions,
    ) -> Result<Vec<ResultItem>, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExtractionError::Failed {
            kind: self.kind.clone(),
            message: self.message.clone(),
        })
    }
}
