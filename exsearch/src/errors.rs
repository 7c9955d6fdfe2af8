//! Error types for the exsearch orchestration layer.
//!
//! Every component returns these as values. The orchestrator is the only
//! place that flattens them into a response message, so each layer can add
//! context before the failure is written to the activity log.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Broad classification of a [`SearchError`].
///
/// Callers use this to tell "system busy, try later" apart from
/// "target fetch failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad URL, keyword or routing key.
    Validation,
    /// The fetch failed after its retry budget.
    Transport,
    /// Waiting for the origin to become downloadable took too long.
    Timeout,
    /// The extraction strategy rejected the document.
    Extraction,
    /// The caller went away while the request was waiting.
    Cancelled,
    /// A shared store rejected a write.
    Store,
    /// Configuration was missing or invalid.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Transport => write!(f, "transport"),
            Self::Timeout => write!(f, "timeout"),
            Self::Extraction => write!(f, "extraction"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Store => write!(f, "store"),
            Self::Config => write!(f, "config"),
        }
    }
}

/// The main error type for search orchestration.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The request itself is malformed.
    #[error("{0}")]
    Validation(String),

    /// No route is registered for the site identifier.
    #[error("not supported sitename : {0}")]
    UnknownSite(String),

    /// The downloader gave up.
    #[error("download error, {message} , url:{url}")]
    Transport {
        /// Target URL.
        url: String,
        /// Downloader failure message.
        message: String,
    },

    /// The per-origin download deadline elapsed.
    #[error("download timed out after {:.1}s , url:{url}", .timeout.as_secs_f64())]
    DownloadTimeout {
        /// Target URL.
        url: String,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The origin stayed busy for longer than the wait budget.
    #[error(
        "timed out waiting for {origin} to become downloadable after {:.1}s \
         (last record: status={status}, updated {age_seconds:.1}s ago)",
        .waited.as_secs_f64()
    )]
    WaitTimeout {
        /// The origin being waited on.
        origin: String,
        /// Status of the last observed lock record.
        status: String,
        /// Age of the last observed lock record in seconds.
        age_seconds: f64,
        /// Total time spent waiting.
        waited: Duration,
    },

    /// The extraction strategy failed.
    #[error("parse error. {kind}: {message}")]
    Extraction {
        /// Error type reported by the strategy.
        kind: String,
        /// Error message reported by the strategy.
        message: String,
    },

    /// The caller cancelled while the request was suspended.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SearchError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a transport error for a URL.
    #[must_use]
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns the broad error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::UnknownSite(_) => ErrorKind::Validation,
            Self::Transport { .. } | Self::DownloadTimeout { .. } => ErrorKind::Transport,
            Self::WaitTimeout { .. } => ErrorKind::Timeout,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Store(_) => ErrorKind::Store,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));

        match self {
            Self::Transport { url, .. } | Self::DownloadTimeout { url, .. } => {
                map.insert("url".to_string(), serde_json::json!(url));
            }
            Self::WaitTimeout {
                origin,
                status,
                age_seconds,
                waited,
            } => {
                map.insert("origin".to_string(), serde_json::json!(origin));
                map.insert("status".to_string(), serde_json::json!(status));
                map.insert("age_seconds".to_string(), serde_json::json!(age_seconds));
                map.insert(
                    "waited_seconds".to_string(),
                    serde_json::json!(waited.as_secs_f64()),
                );
            }
            Self::Extraction { kind, .. } => {
                map.insert("error_type".to_string(), serde_json::json!(kind));
            }
            _ => {}
        }

        map
    }
}

impl From<ExtractionError> for SearchError {
    fn from(err: ExtractionError) -> Self {
        Self::Extraction {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

/// Errors raised by the shared stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A task update tried to leave a terminal state.
    #[error("invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        /// Task id.
        id: String,
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by a downloader.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// Connection, DNS or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("HTTP status {status} for {url}")]
    Status {
        /// Status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// A single attempt exceeded its request timeout.
    #[error("request timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The remote rendering service reported a failure.
    #[error("{kind}: {message}")]
    Remote {
        /// Error type reported by the service.
        kind: String,
        /// Error message reported by the service.
        message: String,
    },

    /// The response body had an unexpected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The client could not be built or the request could not be formed.
    #[error("client error: {0}")]
    Client(String),
}

impl DownloadError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::Timeout(_)
        )
    }
}

/// Errors raised by an extraction strategy.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// A CSS selector in a rule set did not compile.
    #[error("invalid selector '{selector}': {message}")]
    Selector {
        /// The offending selector.
        selector: String,
        /// Parser message.
        message: String,
    },

    /// The document could not be mapped to result items.
    #[error("{0}")]
    Parse(String),

    /// No usable rule set is registered for the label.
    #[error("no rule set available for label '{0}'")]
    NoRuleSet(String),

    /// A rule set digest did not match its content.
    #[error("rule set '{label}' v{version} failed integrity check")]
    Integrity {
        /// Rule set label.
        label: String,
        /// Rule set version.
        version: u32,
    },

    /// Any other strategy failure, with its own type name.
    #[error("{message}")]
    Failed {
        /// Error type name.
        kind: String,
        /// Error message.
        message: String,
    },
}

impl ExtractionError {
    /// Returns the error type name recorded in the activity log.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Selector { .. } => "SelectorError",
            Self::Parse(_) => "ParseError",
            Self::NoRuleSet(_) => "NoRuleSet",
            Self::Integrity { .. } => "IntegrityError",
            Self::Failed { kind, .. } => kind,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field path.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Reading the configuration file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A global subscriber was already installed.
    #[error("tracing subscriber already initialised: {0}")]
    Subscriber(String),
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for SearchError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
