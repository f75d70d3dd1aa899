use std::path::PathBuf;

use thiserror::Error;

/// Errors that halt a training run.
///
/// Per-request failures never show up here: they are absorbed by the retry
/// loop and only reach the controller as a lower reward.
#[derive(Debug, Error)]
pub enum TuneError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to access agent state at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed agent state in {path}: {source}")]
    StateFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("agent state in {path} violates invariants: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}

impl TuneError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        TuneError::InvalidConfiguration(msg.into())
    }

    /// True for errors caused by reading or writing agent state.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            TuneError::Persistence { .. }
                | TuneError::StateFormat { .. }
                | TuneError::CorruptState { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TuneError>;

/// Failure of a single request attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}
