//! Task records and their state machine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::utils::{generate_uuid, now_utc, Timestamp};

/// Activity type written by the search orchestrator.
pub const SEARCH_ACTIVITY: &str = "searchclient";

/// Target table recorded when no origin could be resolved.
pub const UNRESOLVED_TARGET: &str = "None";

/// Lifecycle status of a [`SearchTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created, not finished.
    #[default]
    Pending,
    /// Finished without problems.
    Completed,
    /// Finished, but a secondary step failed.
    CompletedWithErrors,
    /// Failed.
    Failed,
}

impl TaskStatus {
    /// Whether no further transitions are allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the task produced a usable result.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::CompletedWithErrors => write!(f, "COMPLETED_WITH_ERRORS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One activity log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTask {
    /// Row id, assigned by the store.
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Request-scoped identifier.
    pub target_id: String,
    /// Routing key, usually the request origin.
    pub target_table: String,
    /// Kind of activity.
    pub activity_type: String,
    /// Who issued the request.
    #[serde(default)]
    pub caller_type: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Failure message.
    #[serde(default)]
    pub error_msg: Option<String>,
    /// Free-form annotations, merged on update.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last update time.
    pub updated_at: Timestamp,
}

impl SearchTask {
    /// Creates a PENDING task with a fresh target id.
    #[must_use]
    pub fn new(target_table: impl Into<String>, activity_type: impl Into<String>) -> Self {
        let now = now_utc();
        Self {
            id: None,
            target_id: generate_uuid().to_string(),
            target_table: target_table.into(),
            activity_type: activity_type.into(),
            caller_type: String::new(),
            status: TaskStatus::Pending,
            error_msg: None,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the caller type.
    #[must_use]
    pub fn with_caller_type(mut self, caller_type: impl Into<String>) -> Self {
        self.caller_type = caller_type.into();
        self
    }

    /// Sets the initial status.
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the error message.
    #[must_use]
    pub fn with_error(mut self, error_msg: impl Into<String>) -> Self {
        self.error_msg = Some(error_msg.into());
        self
    }

    /// Sets the initial metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Applies an update in place.
    ///
    /// A terminal task only accepts metadata and error patches; a status
    /// change is rejected.
    pub fn apply(&mut self, update: TaskUpdate) -> Result<(), StoreError> {
        if let Some(status) = update.status {
            if self.status.is_terminal() && status != self.status {
                return Err(StoreError::InvalidTransition {
                    id: self.id.map(|id| id.to_string()).unwrap_or_default(),
                    from: self.status.to_string(),
                    to: status.to_string(),
                });
            }
            self.status = status;
        }
        if let Some(error_msg) = update.error_msg {
            self.error_msg = Some(error_msg);
        }
        if let Some(patch) = update.metadata {
            self.metadata.extend(patch);
        }
        self.updated_at = now_utc();
        Ok(())
    }
}

/// A partial update to a [`SearchTask`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    /// New status.
    pub status: Option<TaskStatus>,
    /// New error message.
    pub error_msg: Option<String>,
    /// Keys merged over the existing metadata.
    pub metadata: Option<Map<String, Value>>,
}

impl TaskUpdate {
    /// An update moving to `status`.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Adds an error message.
    #[must_use]
    pub fn with_error(mut self, error_msg: impl Into<String>) -> Self {
        self.error_msg = Some(error_msg.into());
        self
    }

    /// Adds a metadata patch.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Filter for [`crate::activity::ActivityLogStore::query`].
///
/// Empty lists and `None` match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    /// Accepted activity types.
    pub activity_types: Vec<String>,
    /// Accepted statuses.
    pub statuses: Vec<TaskStatus>,
    /// Required target table.
    pub target_table: Option<String>,
}

impl TaskQuery {
    /// Matches successful tasks of one activity type.
    #[must_use]
    pub fn successful(activity_type: impl Into<String>) -> Self {
        Self {
            activity_types: vec![activity_type.into()],
            statuses: vec![TaskStatus::Completed, TaskStatus::CompletedWithErrors],
            target_table: None,
        }
    }

    /// Restricts to a target table.
    #[must_use]
    pub fn with_target_table(mut self, target_table: impl Into<String>) -> Self {
        self.target_table = Some(target_table.into());
        self
    }

    /// Replaces the accepted statuses.
    #[must_use]
    pub fn with_statuses(mut self, statuses: Vec<TaskStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    /// Whether `task` passes the filter.
    #[must_use]
    pub fn matches(&self, task: &SearchTask) -> bool {
        (self.activity_types.is_empty() || self.activity_types.contains(&task.activity_type))
            && (self.statuses.is_empty() || self.statuses.contains(&task.status))
            && self
                .target_table
                .as_ref()
                .map_or(true, |t| t == &task.target_table)
    }
}
