//! Wait-for-downloadable protocol.
//!
//! Polls the domain lock record for an origin until no fetch is believed
//! to be running there. The loop is bounded by the accumulated sleep time
//! and wakes immediately when the caller cancels.

use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::errors::SearchError;
use crate::stores::{DomainLockStatus, DomainLockStore};
use crate::utils::{age_of, now_utc};

/// Shortest sleep between lock reads. Smaller intervals are raised to it so
/// the accumulated sleep always reaches the budget.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll interval and total budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Sleep between reads; also the age under which a finished record is
    /// still considered warm.
    pub poll_interval: Duration,
    /// Budget of accumulated sleep while a fetch is in flight.
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            timeout: Duration::from_secs(300),
        }
    }
}

impl WaitPolicy {
    /// Creates a policy. The poll interval is raised to at least
    /// [`MIN_POLL_INTERVAL`].
    #[must_use]
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            timeout,
        }
    }
}

/// How a successful wait went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitReport {
    /// Total time slept.
    pub waited: Duration,
    /// Number of sleeps.
    pub polls: u32,
}

/// Sleeps for `duration`, or returns early with a cancellation error.
pub(crate) async fn pause(
    duration: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<(), SearchError> {
    match cancel {
        Some(token) => {
            tokio::select! {
                () = token.cancelled() => Err(cancelled(token)),
                () = tokio::time::sleep(duration) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}

fn cancelled(token: &CancellationToken) -> SearchError {
    SearchError::Cancelled(token.reason().unwrap_or_else(|| "caller disconnected".to_string()))
}

/// Waits until `origin` is downloadable.
///
/// - No record: return at once.
/// - `DOWNLOADING`: sleep and re-read until the record changes or the
///   accumulated sleep reaches the budget, then fail with
///   [`SearchError::WaitTimeout`].
/// - `COMPLETED`/`FAILED` younger than one poll interval: sleep once, then
///   re-read. Older finished records are downloadable.
///
/// A failed read is treated as "not locked". Nothing is written.
pub async fn wait_for_downloadable(
    store: &dyn DomainLockStore,
    origin: &str,
    policy: &WaitPolicy,
    cancel: Option<&CancellationToken>,
) -> Result<WaitReport, SearchError> {
    let poll_interval = policy.poll_interval.max(MIN_POLL_INTERVAL);
    let mut report = WaitReport::default();
    let mut warm_waited = false;

    loop {
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(cancelled(token));
            }
        }

        let record = match store.get(origin).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(origin, error = %e, "Domain lock read failed, treating as unlocked");
                None
            }
        };
        let Some(record) = record else {
            return Ok(report);
        };

        let age = age_of(&record.updated_at, &now_utc());
        match record.status {
            DomainLockStatus::Downloading => {
                if report.waited >= policy.timeout {
                    tracing::info!(
                        origin,
                        waited_ms = u64::try_from(report.waited.as_millis()).unwrap_or(u64::MAX),
                        "Gave up waiting for domain"
                    );
                    return Err(SearchError::WaitTimeout {
                        origin: origin.to_string(),
                        status: record.status.to_string(),
                        age_seconds: age.as_secs_f64(),
                        waited: report.waited,
                    });
                }
            }
            DomainLockStatus::Completed | DomainLockStatus::Failed => {
                if warm_waited || age >= poll_interval {
                    return Ok(report);
                }
                warm_waited = true;
            }
        }

        tracing::debug!(origin, status = %record.status, polls = report.polls, "Waiting for domain");
        pause(poll_interval, cancel).await?;
        report.waited = report.waited.saturating_add(poll_interval);
        report.polls += 1;
    }
}
