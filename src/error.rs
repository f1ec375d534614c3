//! Error types for governor-broker.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Another writer holds the event store lock. Retried on the next cycle.
    #[error("event store is locked by another writer")]
    StoreLocked,

    #[error("storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    #[error("cluster error: {0}")]
    Cluster(String),

    #[error("action invocation failed: {0}")]
    Action(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the failed operation should simply be attempted again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreLocked)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => Error::StoreLocked,
            _ => Error::Storage(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
