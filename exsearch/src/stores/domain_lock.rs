//! In-memory domain lock store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;

use super::{DomainLockRecord, DomainLockStatus, DomainLockStore};
use crate::errors::StoreError;
use crate::utils::{add_duration, now_utc, Timestamp};

struct LockEntry {
    record: DomainLockRecord,
    expires_at: Timestamp,
}

/// Per-origin records with TTL, dropped lazily on read once expired.
#[derive(Default)]
pub struct InMemoryDomainLockStore {
    entries: DashMap<String, LockEntry>,
}

impl InMemoryDomainLockStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record as-is, with its own `updated_at`.
    ///
    /// Lets tests stage stale or freshly written records.
    pub fn insert_record(&self, origin: &str, record: DomainLockRecord, ttl: Duration) {
        let expires_at = add_duration(&record.updated_at, ttl);
        self.entries
            .insert(origin.to_string(), LockEntry { record, expires_at });
    }

    /// Returns the live record without going through the trait.
    #[must_use]
    pub fn peek(&self, origin: &str) -> Option<DomainLockRecord> {
        let now = now_utc();
        if let Some(entry) = self.entries.get(origin) {
            if entry.expires_at > now {
                return Some(entry.record.clone());
            }
            // Expired
            drop(entry);
            self.entries.remove(origin);
        }
        None
    }

    /// Number of records, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DomainLockStore for InMemoryDomainLockStore {
    async fn get(&self, origin: &str) -> Result<Option<DomainLockRecord>, StoreError> {
        Ok(self.peek(origin))
    }

    async fn set(
        &self,
        origin: &str,
        status: DomainLockStatus,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.insert_record(origin, DomainLockRecord::new(status), ttl);
        tracing::debug!(origin, status = %status, "Domain lock updated");
        Ok(())
    }

    async fn clear_all(&self) -> Result<usize, StoreError> {
        let count = self.entries.len();
        self.entries.clear();
        Ok(count)
    }
}
