//! HTTP error body shared by every route.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::ValidationError;
use crate::domain::jobs::JobStoreError;
use crate::services::identity::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    Unauthenticated,
    Forbidden,
    UidMismatch,
    NotJobOwner,
    NotFound,
    InvalidState,
    PublishFailedReverted,
    JobStuckProcessing,
    Internal,
    BadRequest,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "validation_error",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::UidMismatch => "uid_mismatch",
            ErrorCode::NotJobOwner => "not_job_owner",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidState => "invalid_state",
            ErrorCode::PublishFailedReverted => "publish_failed_reverted",
            ErrorCode::JobStuckProcessing => "job_stuck_processing",
            ErrorCode::Internal => "internal_error",
            ErrorCode::BadRequest => "bad_request",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden | ErrorCode::UidMismatch | ErrorCode::NotJobOwner => {
                StatusCode::FORBIDDEN
            }
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidState => StatusCode::CONFLICT,
            ErrorCode::PublishFailedReverted => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::JobStuckProcessing | ErrorCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{}: {detail}", code.as_str())]
pub struct ApiError {
    pub code: ErrorCode,
    pub detail: String,
    pub event_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    detail: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<&'a str>,
}

impl ApiError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
            event_id: None,
        }
    }

    pub fn with_event(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_string());
        self
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, detail)
    }

    pub fn unauthenticated(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, detail)
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.as_str(),
            detail: &self.detail,
            event_id: self.event_id.as_deref(),
        };
        (self.code.status(), Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::validation(e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::unauthenticated(e.to_string())
    }
}

impl From<JobStoreError> for ApiError {
    fn from(e: JobStoreError) -> Self {
        match &e {
            JobStoreError::NotFound(id) => {
                ApiError::new(ErrorCode::NotFound, format!("Job {} not found", id)).with_event(id)
            }
            JobStoreError::PermissionDenied { event_id, .. } => {
                ApiError::new(ErrorCode::NotJobOwner, "You do not own this job").with_event(event_id)
            }
            JobStoreError::InvalidState { event_id, .. } => {
                ApiError::new(ErrorCode::InvalidState, e.to_string()).with_event(event_id)
            }
            JobStoreError::AlreadyExists(id) => {
                ApiError::new(ErrorCode::InvalidState, e.to_string()).with_event(id)
            }
            JobStoreError::Database(_) | JobStoreError::Corrupt { .. } => {
                tracing::error!(error = %e, "[jobs] Store failure");
                ApiError::internal("Job store unavailable")
            }
        }
    }
}
