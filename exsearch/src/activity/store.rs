//! Activity log persistence.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{SearchTask, TaskQuery, TaskUpdate};
use crate::errors::StoreError;
use crate::utils::generate_uuid_v7;

/// Durable store of task rows with per-row update semantics.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityLogStore: Send + Sync {
    /// Inserts a task and returns it with its id assigned.
    async fn create(&self, task: SearchTask) -> Result<SearchTask, StoreError>;

    /// Applies an update to one task and returns the new row.
    async fn update(&self, id: Uuid, update: TaskUpdate) -> Result<SearchTask, StoreError>;

    /// Fetches one task.
    async fn get(&self, id: Uuid) -> Result<Option<SearchTask>, StoreError>;

    /// Returns every task matching the filter.
    async fn query(&self, query: &TaskQuery) -> Result<Vec<SearchTask>, StoreError>;
}

/// Activity log kept in process memory.
#[derive(Default)]
pub struct InMemoryActivityLog {
    tasks: RwLock<HashMap<Uuid, SearchTask>>,
}

impl InMemoryActivityLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every task, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<SearchTask> {
        let mut tasks: Vec<SearchTask> = self.tasks.read().values().cloned().collect();
        // v7 ids sort by creation time
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }
}

#[async_trait]
impl ActivityLogStore for InMemoryActivityLog {
    async fn create(&self, mut task: SearchTask) -> Result<SearchTask, StoreError> {
        let id = generate_uuid_v7();
        task.id = Some(id);
        self.tasks.write().insert(id, task.clone());
        Ok(task)
    }

    async fn update(&self, id: Uuid, update: TaskUpdate) -> Result<SearchTask, StoreError> {
        let mut tasks = self.tasks.write();
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.apply(update)?;
        Ok(task.clone())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SearchTask>, StoreError> {
        Ok(self.tasks.read().get(&id).cloned())
    }

    async fn query(&self, query: &TaskQuery) -> Result<Vec<SearchTask>, StoreError> {
        Ok(self
            .tasks
            .read()
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }
}
