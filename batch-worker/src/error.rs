use std::str;
use std::time;

use thiserror::Error;

/// Enumeration of reasons a single message could not be processed.
///
/// Any of these fails only the message it was raised for; the rest of the batch carries on.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("message body is not valid utf-8: {0}")]
    InvalidEncoding(#[from] str::Utf8Error),
    #[error("message body is not valid json: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("message rejected: {0}")]
    Rejected(String),
    #[error("repository call failed: {0}")]
    RepositoryError(#[from] RepositoryError),
    #[error("handler did not finish within {0:?}")]
    Timeout(time::Duration),
}

impl ProcessingError {
    /// A short, low-cardinality label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ProcessingError::Timeout(_) => "timeout",
            _ => "error",
        }
    }
}

/// Enumeration of errors a `Repository` can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("a record with key {0} already exists")]
    Conflict(String),
    #[error("repository is unavailable: {0}")]
    Unavailable(String),
}

/// Enumeration of errors related to starting and running the batch worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to bind {bind}: {error}")]
    BindError { bind: String, error: std::io::Error },
    #[error("failed to serve requests: {0}")]
    ServeError(std::io::Error),
}
