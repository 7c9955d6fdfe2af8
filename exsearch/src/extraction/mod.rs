//! Extraction strategies: document text to result items.
//!
//! A strategy is a pure, synchronous function of `(text, url, options)`.
//! Duplicate collapsing is a separate post-step ([`collapse_duplicates`])
//! applied uniformly by the orchestrator, whatever strategy produced the
//! items.

mod dedup;

#[cfg(feature = "rules")]
mod catalog;
#[cfg(feature = "rules")]
mod rules;

pub use dedup::{collapse_duplicates, duplicate_key};

#[cfg(feature = "rules")]
pub use catalog::{CatalogExtractor, RuleSetCatalog, RuleSetVersion};
#[cfg(feature = "rules")]
pub use rules::{FieldRule, RuleSet, RuleSetExtractor, ValueKind};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ExtractionError;
use crate::routing::SiteOptions;

/// One item found on a result page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Item title.
    pub title: String,
    /// Price in the smallest currency unit.
    #[serde(default)]
    pub price: Option<i64>,
    /// Condition label (new, used, ...).
    #[serde(default)]
    pub condition: String,
    /// Whether the item is on sale.
    #[serde(default)]
    pub on_sale: bool,
    /// Whether the item is available.
    #[serde(default)]
    pub is_success: bool,
    /// Image URL.
    #[serde(default)]
    pub image_url: String,
    /// Available quantity; 0 means unknown.
    #[serde(default)]
    pub stock_quantity: i64,
    /// Loyalty points.
    #[serde(default)]
    pub point: i64,
    /// Detail page URL.
    #[serde(default)]
    pub detail_url: String,
    /// Site-specific extras.
    #[serde(default)]
    pub others: Map<String, Value>,
}

impl ResultItem {
    /// Creates an available item with a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            is_success: true,
            ..Self::default()
        }
    }

    /// Sets the price.
    #[must_use]
    pub fn with_price(mut self, price: i64) -> Self {
        self.price = Some(price);
        self
    }

    /// Sets the stock quantity.
    #[must_use]
    pub fn with_stock_quantity(mut self, quantity: i64) -> Self {
        self.stock_quantity = quantity;
        self
    }

    /// Sets the loyalty points.
    #[must_use]
    pub fn with_point(mut self, point: i64) -> Self {
        self.point = point;
        self
    }

    /// Sets the detail URL.
    #[must_use]
    pub fn with_detail_url(mut self, url: impl Into<String>) -> Self {
        self.detail_url = url.into();
        self
    }
}

/// Maps a fetched document to result items.
pub trait ExtractionStrategy: Send + Sync {
    /// Strategy name, for logs.
    fn name(&self) -> &str;

    /// Extracts items from `text`, fetched from `url`.
    fn extract(
        &self,
        text: &str,
        url: &str,
        options: &SiteOptions,
    ) -> Result<Vec<ResultItem>, ExtractionError>;
}
