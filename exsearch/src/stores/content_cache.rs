//! In-memory content cache.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{CachedDocument, ContentCacheStore};
use crate::errors::StoreError;
use crate::utils::{generate_uuid, now_utc, Timestamp};

struct StoredDocument {
    seq: u64,
    document: CachedDocument,
}

/// Selects documents to delete in [`InMemoryContentCache::purge`].
///
/// Every populated field must match. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct PurgeFilter {
    /// Only documents from this origin.
    pub domain: Option<String>,
    /// Only documents that expire before this time (or never expire).
    pub expires_before: Option<Timestamp>,
    /// Only documents carrying a downloader error.
    pub errors_only: bool,
}

impl PurgeFilter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to one origin.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Restricts to documents expiring before `at`.
    #[must_use]
    pub fn with_expires_before(mut self, at: Timestamp) -> Self {
        self.expires_before = Some(at);
        self
    }

    /// Restricts to documents with an error message.
    #[must_use]
    pub fn errors_only(mut self) -> Self {
        self.errors_only = true;
        self
    }

    fn matches(&self, doc: &CachedDocument) -> bool {
        if let Some(ref domain) = self.domain {
            if &doc.domain != domain {
                return false;
            }
        }
        if let Some(ref before) = self.expires_before {
            if doc.expires_at.is_some_and(|e| e >= *before) {
                return false;
            }
        }
        if self.errors_only && doc.error_msg.as_deref().map_or(true, str::is_empty) {
            return false;
        }
        true
    }
}

/// Keeps every inserted document per URL. Expired entries stay until purged.
#[derive(Default)]
pub struct InMemoryContentCache {
    entries: RwLock<HashMap<String, Vec<StoredDocument>>>,
    next_seq: AtomicU64,
}

impl InMemoryContentCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every stored document for `url`, expired ones included.
    #[must_use]
    pub fn all_for(&self, url: &str) -> Vec<CachedDocument> {
        self.entries
            .read()
            .get(url)
            .map(|docs| docs.iter().map(|s| s.document.clone()).collect())
            .unwrap_or_default()
    }

    /// Deletes matching documents. Returns how many were removed.
    pub fn purge(&self, filter: &PurgeFilter) -> usize {
        let mut entries = self.entries.write();
        let mut removed = 0;
        entries.retain(|_, docs| {
            let before = docs.len();
            docs.retain(|s| !filter.matches(&s.document));
            removed += before - docs.len();
            !docs.is_empty()
        });
        if removed > 0 {
            tracing::info!(removed, "Purged cached documents");
        }
        removed
    }
}

#[async_trait]
impl ContentCacheStore for InMemoryContentCache {
    async fn get(
        &self,
        url: &str,
        not_expired_after: Timestamp,
    ) -> Result<Vec<CachedDocument>, StoreError> {
        let entries = self.entries.read();
        let Some(docs) = entries.get(url) else {
            return Ok(Vec::new());
        };

        let mut fresh: Vec<&StoredDocument> = docs
            .iter()
            .filter(|s| s.document.is_fresh_at(&not_expired_after))
            .collect();
        fresh.sort_by(|a, b| {
            b.document
                .created_at
                .cmp(&a.document.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(fresh.into_iter().map(|s| s.document.clone()).collect())
    }

    async fn set(&self, mut document: CachedDocument) -> Result<CachedDocument, StoreError> {
        document.id = Some(generate_uuid());
        document.created_at = now_utc();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        self.entries
            .write()
            .entry(document.url.clone())
            .or_default()
            .push(StoredDocument {
                seq,
                document: document.clone(),
            });

        tracing::debug!(url = %document.url, expires_at = ?document.expires_at, "Cached document");
        Ok(document)
    }
}
