//! Shared stores used to coordinate independent workers.
//!
//! Two TTL-bearing key-value stores back the download protocol:
//!
//! - [`ContentCacheStore`] keeps previously fetched documents keyed by URL.
//! - [`DomainLockStore`] keeps one advisory status record per origin.
//!
//! Neither store offers transactions or compare-and-swap. Every operation is
//! a single keyed read or write, so the traits map directly onto a networked
//! key-value backend. The in-memory implementations are used in tests and
//! single-process deployments.

mod content_cache;
mod domain_lock;
mod keys;

pub use content_cache::{InMemoryContentCache, PurgeFilter};
pub use domain_lock::InMemoryDomainLockStore;
pub use keys::{cache_key, domain_lock_key, CACHE_KEY_PREFIX, DOMAIN_LOCK_KEY_PATTERN};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::utils::{parse_timestamp, to_iso, Timestamp};

/// How a document was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadType {
    /// Plain HTTP GET.
    DirectHttp,
    /// Rendered by a locally driven browser.
    BrowserRendered,
    /// Rendered by a remote browser-automation service.
    ExternalRenderApi,
}

impl fmt::Display for DownloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectHttp => write!(f, "DIRECT_HTTP"),
            Self::BrowserRendered => write!(f, "BROWSER_RENDERED"),
            Self::ExternalRenderApi => write!(f, "EXTERNAL_RENDER_API"),
        }
    }
}

/// A stored copy of a fetched document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDocument {
    /// Assigned by the store on insert.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Origin the document was fetched from.
    pub domain: String,
    /// Request URL; the cache key.
    pub url: String,
    /// Which backend produced the text.
    pub download_type: DownloadType,
    /// Document body.
    pub text: String,
    /// Reuse deadline. `None` means the document is never reused.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
    /// Downloader failure message, if any.
    #[serde(default)]
    pub error_msg: Option<String>,
    /// Insert time.
    pub created_at: Timestamp,
}

impl CachedDocument {
    /// Creates an unpersisted document with no expiry.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        domain: impl Into<String>,
        download_type: DownloadType,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            domain: domain.into(),
            url: url.into(),
            download_type,
            text: text.into(),
            expires_at: None,
            error_msg: None,
            created_at: crate::utils::now_utc(),
        }
    }

    /// Sets the reuse deadline.
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    /// Whether the document may be served at `at`.
    #[must_use]
    pub fn is_fresh_at(&self, at: &Timestamp) -> bool {
        self.expires_at.is_some_and(|expires| expires >= *at)
    }

    /// Whether the body is usable as a cache hit.
    #[must_use]
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Picks the most recently created document.
///
/// Ties keep the earlier entry, since stores return newest first.
#[must_use]
pub fn newest_document(docs: Vec<CachedDocument>) -> Option<CachedDocument> {
    docs.into_iter()
        .reduce(|best, doc| if doc.created_at > best.created_at { doc } else { best })
}

/// Durable store of fetched documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentCacheStore: Send + Sync {
    /// Returns documents for `url` whose expiry is at or after
    /// `not_expired_after`, newest first.
    async fn get(
        &self,
        url: &str,
        not_expired_after: Timestamp,
    ) -> Result<Vec<CachedDocument>, StoreError>;

    /// Inserts a document. Existing entries for the URL are kept.
    async fn set(&self, document: CachedDocument) -> Result<CachedDocument, StoreError>;
}

/// Status held in a domain lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainLockStatus {
    /// A worker believes it is fetching from the origin.
    Downloading,
    /// The last fetch succeeded.
    Completed,
    /// The last fetch failed.
    Failed,
}

impl DomainLockStatus {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "DOWNLOADING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parses a wire name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DOWNLOADING" => Some(Self::Downloading),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether a fetch has finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Downloading)
    }
}

impl fmt::Display for DomainLockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory per-origin marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainLockRecord {
    /// Current status.
    pub status: DomainLockStatus,
    /// Time of the last write.
    pub updated_at: Timestamp,
}

impl DomainLockRecord {
    /// Creates a record stamped now.
    #[must_use]
    pub fn new(status: DomainLockStatus) -> Self {
        Self {
            status,
            updated_at: crate::utils::now_utc(),
        }
    }

    /// Encodes the record as a string hash.
    #[must_use]
    pub fn to_fields(&self) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), self.status.as_str().to_string());
        fields.insert("updated_at".to_string(), to_iso(&self.updated_at));
        fields
    }

    /// Decodes a string hash written by [`DomainLockRecord::to_fields`].
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, StoreError> {
        let status = fields
            .get("status")
            .and_then(|s| DomainLockStatus::parse(s))
            .ok_or_else(|| StoreError::Serialization("missing or unknown status".to_string()))?;
        let updated_at = fields
            .get("updated_at")
            .ok_or_else(|| StoreError::Serialization("missing updated_at".to_string()))
            .and_then(|s| {
                parse_timestamp(s).map_err(|e| StoreError::Serialization(e.to_string()))
            })?;
        Ok(Self { status, updated_at })
    }
}

/// Shared store of per-origin lock records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomainLockStore: Send + Sync {
    /// Returns the live record for `origin`, if any.
    async fn get(&self, origin: &str) -> Result<Option<DomainLockRecord>, StoreError>;

    /// Overwrites the record for `origin`, stamped now, with a TTL.
    async fn set(
        &self,
        origin: &str,
        status: DomainLockStatus,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Drops every record. Returns how many were removed.
    async fn clear_all(&self) -> Result<usize, StoreError>;
}
