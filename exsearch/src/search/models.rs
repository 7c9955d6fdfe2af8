//! Request and response types of the search entry point.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ErrorKind, SearchError};
use crate::extraction::ResultItem;
use crate::routing::SiteOptions;

/// An incoming search.
///
/// Either `url` or `search_keyword` must be set. A URL wins when both are.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Search-result page URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Keyword to turn into a URL with the site's URL builder.
    #[serde(default)]
    pub search_keyword: Option<String>,
    /// Routing key.
    pub sitename: String,
    /// Per-site options.
    #[serde(default)]
    pub options: SiteOptions,
    /// Skip the content cache.
    #[serde(default)]
    pub no_cache: bool,
}

impl SearchRequest {
    /// Searches a URL.
    #[must_use]
    pub fn for_url(sitename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            sitename: sitename.into(),
            ..Self::default()
        }
    }

    /// Searches a keyword.
    #[must_use]
    pub fn for_keyword(sitename: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            search_keyword: Some(keyword.into()),
            sitename: sitename.into(),
            ..Self::default()
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

    /// The URL, when one was given.
    #[must_use]
    pub fn given_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// The keyword, when one was given.
    #[must_use]
    pub fn given_keyword(&self) -> Option<&str> {
        self.search_keyword
            .as_deref()
            .filter(|k| !k.trim().is_empty())
    }
}

/// One normalized result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Item title.
    pub title: Option<String>,
    /// Price.
    pub price: Option<i64>,
    /// Whether the price includes tax.
    #[serde(default)]
    pub taxin: bool,
    /// Condition label.
    pub condition: Option<String>,
    /// Whether the item is on sale.
    #[serde(default)]
    pub on_sale: bool,
    /// Sale name.
    pub salename: Option<String>,
    /// Whether the item is available.
    #[serde(default)]
    pub is_success: bool,
    /// Page the item was found on.
    pub url: Option<String>,
    /// Routing key of the site.
    pub sitename: Option<String>,
    /// Image URL.
    pub image_url: Option<String>,
    /// Stock message.
    pub stock_msg: Option<String>,
    /// Available quantity.
    pub stock_quantity: Option<i64>,
    /// Detail page URLs.
    pub sub_urls: Option<Vec<String>>,
    /// Site-specific extras.
    pub others: Option<Map<String, Value>>,
}

/// Key under which loyalty points are carried in [`SearchResult::others`].
pub const POINT_KEY: &str = "point";

impl SearchResult {
    /// Normalizes an extracted item found on `url` of `sitename`.
    #[must_use]
    pub fn from_item(item: ResultItem, sitename: &str, url: &str) -> Self {
        let sub_urls = (!item.detail_url.is_empty()).then(|| vec![item.detail_url]);
        let mut others = item.others;
        others.insert(POINT_KEY.to_string(), Value::from(item.point));
        Self {
            title: Some(item.title),
            price: item.price,
            taxin: true,
            condition: Some(item.condition),
            on_sale: item.on_sale,
            salename: Some(String::new()),
            is_success: item.is_success,
            url: Some(url.to_string()),
            sitename: Some(sitename.to_string()),
            image_url: Some(item.image_url),
            stock_msg: Some(String::new()),
            stock_quantity: Some(item.stock_quantity),
            sub_urls,
            others: Some(others),
        }
    }
}

/// Outcome of one search. An empty `error_msg` means success.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Results, possibly empty.
    #[serde(default)]
    pub results: Vec<SearchResult>,
    /// Failure message.
    #[serde(default)]
    pub error_msg: String,
    /// Failure class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl SearchResponse {
    /// A successful response.
    #[must_use]
    pub fn ok(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    /// A failed response.
    #[must_use]
    pub fn failure(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            results: Vec::new(),
            error_msg: message.into(),
            error_kind: Some(kind),
        }
    }

    /// Whether the search succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error_msg.is_empty()
    }
}

impl From<Result<Vec<SearchResult>, SearchError>> for SearchResponse {
    fn from(result: Result<Vec<SearchResult>, SearchError>) -> Self {
        match result {
            Ok(results) => Self::ok(results),
            Err(e) => Self::failure(e.to_string(), e.kind()),
        }
    }
}
