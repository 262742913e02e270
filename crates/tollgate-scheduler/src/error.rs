//! Scheduler error types.

use thiserror::Error;
use tollgate_db::DbError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Domain(#[from] tollgate_core::Error),

    #[error("storage error: {0}")]
    Db(#[from] DbError),

    /// The task manifest of a commit could not be retrieved.
    #[error("manifest unavailable for {commit}: {message}")]
    Manifest { commit: String, message: String },
}

impl SchedulerError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::Domain(tollgate_core::Error::NotFound(what.into()))
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::Domain(tollgate_core::Error::InvalidInput(message.into()))
    }
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
