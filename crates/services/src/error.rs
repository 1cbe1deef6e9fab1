//! Shared error types for the services crate.

use thiserror::Error;

use marathon_core::model::StageError;

/// Failures of a single remote call.
///
/// Every variant is recoverable: callers fall back to local storage or drop
/// the remote write.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("remote request exceeded its deadline")]
    Timeout,
    #[error("remote responded with status {0}")]
    Unavailable(reqwest::StatusCode),
    #[error("remote transport failed: {0}")]
    Network(String),
    #[error("remote response could not be decoded: {0}")]
    Decode(String),
    #[error("remote sync is not configured")]
    Disabled,
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::Unavailable(status)
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

/// Errors emitted by `SyncCoordinator` and `MarathonSession`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncError {
    #[error("progress has not finished loading")]
    NotReady,
    #[error("progress is already loaded for this session")]
    AlreadyLoaded,
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// Invalid configuration from the environment or command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid remote url {raw:?}: {reason}")]
    InvalidRemoteUrl { raw: String, reason: String },
    #[error("{var} must be a whole number of milliseconds, got {raw:?}")]
    InvalidMillis { var: &'static str, raw: String },
}
