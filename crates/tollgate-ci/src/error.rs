//! CI integration error types.

use thiserror::Error;
use tollgate_db::DbError;
use tollgate_scheduler::SchedulerError;

#[derive(Debug, Error)]
pub enum CiError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("{url} responded with HTTP {status}")]
    Api { url: String, status: u16 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl From<reqwest::Error> for CiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CiError::Timeout(e.to_string())
        } else {
            CiError::Request(e.to_string())
        }
    }
}

impl From<serde_json::Error> for CiError {
    fn from(e: serde_json::Error) -> Self {
        CiError::Parse(e.to_string())
    }
}

pub type CiResult<T> = std::result::Result<T, CiError>;
