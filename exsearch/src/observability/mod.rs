//! Observability utilities.
//!
//! Components log through the `tracing` facade with structured fields
//! (`origin`, `url`, `site`, `task_id`, `status`). Binaries install a
//! subscriber once with [`init_tracing`].

mod logging;

pub use logging::{init_tracing, LogFormat, LoggingConfig, DEFAULT_FILTER};
