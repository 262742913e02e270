//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tollgate_ci::CiError;
use tollgate_db::DbError;
use tollgate_scheduler::SchedulerError;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<tollgate_core::Error> for ApiError {
    fn from(err: tollgate_core::Error) -> Self {
        match err {
            tollgate_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            tollgate_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            tollgate_core::Error::Unauthorized(msg) => ApiError::Unauthorized(msg),
            tollgate_core::Error::Forbidden(msg) => ApiError::Forbidden(msg),
            tollgate_core::Error::Conflict(msg) => ApiError::Conflict(msg),
            tollgate_core::Error::Invariant(msg) => {
                ApiError::Internal(format!("invariant violated: {msg}"))
            }
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => ApiError::NotFound(msg),
            DbError::Duplicate(msg) => ApiError::Conflict(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Domain(e) => e.into(),
            SchedulerError::Db(e) => e.into(),
            SchedulerError::Manifest { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<CiError> for ApiError {
    fn from(err: CiError) -> Self {
        match err {
            CiError::Db(e) => e.into(),
            CiError::Scheduler(e) => e.into(),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_errors_keep_their_status() {
        let forbidden: ApiError =
            SchedulerError::Domain(tollgate_core::Error::Forbidden("not yours".to_string())).into();
        assert!(matches!(forbidden, ApiError::Forbidden(_)));

        let missing: ApiError = SchedulerError::Db(DbError::NotFound("task".to_string())).into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let invariant: ApiError =
            SchedulerError::Domain(tollgate_core::Error::Invariant("trend".to_string())).into();
        assert_eq!(invariant.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
