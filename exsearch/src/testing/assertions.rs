//! Assertions for search responses and tasks.

use crate::activity::{SearchTask, TaskStatus};
use crate::errors::ErrorKind;
use crate::search::SearchResponse;

/// Asserts that the search succeeded.
pub fn assert_response_ok(response: &SearchResponse) {
    assert!(
        response.is_ok(),
        "Expected success, got error: {} ({:?})",
        response.error_msg,
        response.error_kind
    );
}

/// Asserts that the search failed with the given kind.
pub fn assert_response_failed(response: &SearchResponse, kind: ErrorKind) {
    assert!(!response.is_ok(), "Expected failure, got {} results", response.results.len());
    assert_eq!(
        response.error_kind,
        Some(kind),
        "Expected error kind {:?}, got {:?}: {}",
        kind,
        response.error_kind,
        response.error_msg
    );
}

/// Asserts the status of a task.
pub fn assert_task_status(task: &SearchTask, expected: TaskStatus) {
    assert_eq!(
        task.status, expected,
        "Expected task status {:?}, got {:?} (error: {:?})",
        expected, task.status, task.error_msg
    );
}
