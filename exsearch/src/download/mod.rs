//! Downloaders: URL plus options in, document text out.
//!
//! A [`Downloader`] owns its own retry budget ([`RetryPolicy`]). The
//! coordination layer wraps each call in a per-origin deadline, so the
//! retry budget always runs nested inside that deadline.

mod retry;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
mod render_api;

pub use retry::{with_retry, BackoffStrategy, RetryPolicy};

#[cfg(feature = "http")]
pub use http::HttpDownloader;
#[cfg(feature = "http")]
pub use render_api::{RenderApiDownloader, RenderResponse};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::DownloadError;
use crate::stores::DownloadType;

/// A cookie sent with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Cookie domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Cookie path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Cookie {
    /// Creates a cookie.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
        }
    }
}

/// Renders cookies as a `Cookie` header value.
#[must_use]
pub fn cookie_header(cookies: &[Cookie]) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Cookie handling on the rendering service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderCookieOptions {
    /// Cookies to install before loading the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_dict_list: Option<Vec<Cookie>>,
    /// Return the browser's cookies with the response.
    #[serde(default)]
    pub return_cookies: bool,
    /// Persist cookies on the service.
    #[serde(default)]
    pub save: bool,
    /// Load previously persisted cookies.
    #[serde(default)]
    pub load: bool,
}

/// What to do when the awaited selector never appears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorErrorPolicy {
    /// `"raise"` or `"retry"`.
    #[serde(default = "default_action_type")]
    pub action_type: String,
    /// Reload attempts for `"retry"`.
    #[serde(default)]
    pub max_retries: u32,
    /// Seconds between reloads.
    #[serde(default)]
    pub wait_time: f64,
    /// Selector whose presence ends the retry loop early.
    #[serde(default)]
    pub check_exist_tag: String,
}

fn default_action_type() -> String {
    "raise".to_string()
}

impl Default for SelectorErrorPolicy {
    fn default() -> Self {
        Self {
            action_type: default_action_type(),
            max_retries: 0,
            wait_time: 0.0,
            check_exist_tag: String::new(),
        }
    }
}

/// Wait for a CSS selector before capturing the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitCssSelector {
    /// Selector to wait for.
    pub selector: String,
    /// Seconds to wait.
    #[serde(default = "default_selector_timeout")]
    pub timeout: u64,
    /// Failure policy.
    #[serde(default)]
    pub on_error: SelectorErrorPolicy,
    /// Seconds to sleep before starting to wait.
    #[serde(default)]
    pub pre_wait_time: f64,
}

fn default_selector_timeout() -> u64 {
    10
}

impl WaitCssSelector {
    /// Waits for `selector` with default settings.
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            timeout: default_selector_timeout(),
            on_error: SelectorErrorPolicy::default(),
            pre_wait_time: 0.0,
        }
    }
}

/// Browser rendering options, forwarded verbatim to the rendering service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Cookie handling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<RenderCookieOptions>,
    /// Selector to wait for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_css_selector: Option<WaitCssSelector>,
    /// Fixed sleep after load, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_wait_time: Option<f64>,
}

/// Per-call downloader options.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Timeout of one attempt.
    pub request_timeout: Duration,
    /// Retry budget.
    pub retry: RetryPolicy,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Cookies sent with the request.
    pub cookies: Vec<Cookie>,
    /// Rendering options, for rendering downloaders.
    pub render: Option<RenderOptions>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
            headers: BTreeMap::new(),
            cookies: Vec::new(),
            render: None,
        }
    }
}

impl FetchOptions {
    /// Creates options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Adds a request header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Adds a cookie.
    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Sets the rendering options.
    #[must_use]
    pub fn with_render(mut self, render: RenderOptions) -> Self {
        self.render = Some(render);
        self
    }
}

/// Fetches raw document text from a backend.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Which backend this downloader drives.
    fn download_type(&self) -> DownloadType;

    /// Fetches `url`, retrying transient failures per `options.retry`.
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<String, DownloadError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cookie_header() {
        assert_eq!(cookie_header(&[]), None);
        let cookies = vec![Cookie::new("session", "abc"), Cookie::new("age_check", "1")];
        assert_eq!(
            cookie_header(&cookies).as_deref(),
            Some("session=abc; age_check=1")
        );
    }

    #[test]
    fn test_render_options_skip_unset_fields() {
        let options = RenderOptions {
            wait_css_selector: Some(WaitCssSelector::new(".item")),
            ..RenderOptions::default()
        };

        assert_eq!(
            serde_json::to_value(&options).unwrap(),
            json!({
                "wait_css_selector": {
                    "selector": ".item",
                    "timeout": 10,
                    "on_error": {
                        "action_type": "raise",
                        "max_retries": 0,
                        "wait_time": 0.0,
                        "check_exist_tag": ""
                    },
                    "pre_wait_time": 0.0
                }
            })
        );
    }

    #[test]
    fn test_render_options_from_request_json() {
        let options: RenderOptions = serde_json::from_value(json!({
            "cookie": {"cookie_dict_list": [{"name": "a", "value": "1"}], "return_cookies": true},
            "page_wait_time": 2.5
        }))
        .unwrap();

        let cookie = options.cookie.unwrap();
        assert!(cookie.return_cookies);
        assert_eq!(cookie.cookie_dict_list.unwrap()[0].name, "a");
        assert_eq!(options.page_wait_time, Some(2.5));
    }
}
