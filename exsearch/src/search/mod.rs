//! Search entry point.
//!
//! [`SearchOrchestrator`] turns a [`SearchRequest`] into a
//! [`SearchResponse`]: it resolves the target URL, opens an activity task,
//! fetches through the coordinating downloader, extracts, collapses
//! duplicates and writes fresh documents to the content cache.

mod models;
mod orchestrator;
mod orchestrator_tests;

pub use models::{SearchRequest, SearchResponse, SearchResult, POINT_KEY};
pub use orchestrator::{SearchOrchestrator, DEFAULT_CALLER_TYPE, TASK_NOT_CREATED};
