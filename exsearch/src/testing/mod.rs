//! Testing utilities for exsearch.
//!
//! This module provides:
//! - A scripted downloader and fixed extractors
//! - Assertions for search responses and tasks
//! - An in-memory harness wiring the orchestrator

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_response_failed, assert_response_ok, assert_task_status};
pub use fixtures::TestHarness;
pub use mocks::{FailingExtractor, MockDownloader, StaticExtractor};
