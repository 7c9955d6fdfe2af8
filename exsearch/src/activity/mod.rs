//! Activity log: one task row per incoming request.
//!
//! A task is created PENDING and moved once to a terminal status.
//! [`ActivityLog`] wraps an [`ActivityLogStore`] with the lifecycle calls the
//! orchestrator makes and logs every transition.

mod models;
mod store;

pub use models::{
    SearchTask, TaskQuery, TaskStatus, TaskUpdate, SEARCH_ACTIVITY, UNRESOLVED_TARGET,
};
pub use store::{ActivityLogStore, InMemoryActivityLog};

#[cfg(test)]
pub use store::MockActivityLogStore;

use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::StoreError;

/// Lifecycle front-end over an [`ActivityLogStore`].
#[derive(Clone)]
pub struct ActivityLog {
    store: Arc<dyn ActivityLogStore>,
}

impl ActivityLog {
    /// Creates a log over a store.
    #[must_use]
    pub fn new(store: Arc<dyn ActivityLogStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ActivityLogStore> {
        &self.store
    }

    /// Opens a PENDING task.
    pub async fn create(
        &self,
        target_table: &str,
        activity_type: &str,
        caller_type: &str,
        metadata: Map<String, Value>,
    ) -> Result<SearchTask, StoreError> {
        let task = SearchTask::new(target_table, activity_type)
            .with_caller_type(caller_type)
            .with_metadata(metadata);
        let task = self.store.create(task).await?;
        tracing::info!(
            task_id = ?task.id,
            target_table,
            activity_type,
            "Task created"
        );
        Ok(task)
    }

    /// Records a request that failed before any work started.
    pub async fn create_failed(
        &self,
        target_table: &str,
        activity_type: &str,
        caller_type: &str,
        error_msg: &str,
    ) -> Result<SearchTask, StoreError> {
        let task = SearchTask::new(target_table, activity_type)
            .with_caller_type(caller_type)
            .with_status(TaskStatus::Failed)
            .with_error(error_msg);
        let task = self.store.create(task).await?;
        tracing::info!(task_id = ?task.id, target_table, error = error_msg, "Task failed on creation");
        Ok(task)
    }

    /// Marks a task COMPLETED.
    pub async fn completed(&self, id: Uuid) -> Result<SearchTask, StoreError> {
        self.transition(id, TaskUpdate::status(TaskStatus::Completed))
            .await
    }

    /// Marks a task COMPLETED_WITH_ERRORS.
    pub async fn completed_with_errors(
        &self,
        id: Uuid,
        error_msg: &str,
    ) -> Result<SearchTask, StoreError> {
        self.transition(
            id,
            TaskUpdate::status(TaskStatus::CompletedWithErrors).with_error(error_msg),
        )
        .await
    }

    /// Marks a task FAILED.
    pub async fn failed(&self, id: Uuid, error_msg: &str) -> Result<SearchTask, StoreError> {
        self.transition(id, TaskUpdate::status(TaskStatus::Failed).with_error(error_msg))
            .await
    }

    /// Merges a metadata patch without touching the status.
    pub async fn annotate(
        &self,
        id: Uuid,
        metadata: Map<String, Value>,
    ) -> Result<SearchTask, StoreError> {
        self.store
            .update(id, TaskUpdate::default().with_metadata(metadata))
            .await
    }

    /// Applies an arbitrary update.
    pub async fn update(&self, id: Uuid, update: TaskUpdate) -> Result<SearchTask, StoreError> {
        self.transition(id, update).await
    }

    /// Returns the most recently updated task matching the query.
    pub async fn latest(&self, query: &TaskQuery) -> Result<Option<SearchTask>, StoreError> {
        let tasks = self.store.query(query).await?;
        Ok(tasks.into_iter().max_by_key(|t| t.updated_at))
    }

    async fn transition(&self, id: Uuid, update: TaskUpdate) -> Result<SearchTask, StoreError> {
        let task = self.store.update(id, update).await?;
        tracing::info!(
            task_id = %id,
            status = %task.status,
            error = task.error_msg.as_deref().unwrap_or(""),
            "Task updated"
        );
        Ok(task)
    }
}
