//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use slidecut_models::{JobId, JobStage};
use slidecut_worker::{FailureKind, JobFailure};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Job(JobFailure),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Job(failure) if failure.is_invalid_input() => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) | ApiError::Job(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JobFailure> for ApiError {
    fn from(failure: JobFailure) -> Self {
        Self::Job(failure)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Body of a failed render.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderFailedResponse<'a> {
    error: &'static str,
    details: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_id: Option<&'a JobId>,
    stage: JobStage,
    kind: FailureKind,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            // Request shape problems read the same as any other bad request.
            ApiError::Job(failure) if failure.is_invalid_input() => {
                let error = failure.message.clone();
                (status, Json(ErrorResponse { error })).into_response()
            }
            ApiError::Job(failure) => {
                let body = RenderFailedResponse {
                    error: "Video rendering failed",
                    details: &failure.message,
                    job_id: failure.job_id.as_ref(),
                    stage: failure.stage,
                    kind: failure.kind,
                };
                (status, Json(body)).into_response()
            }
            ApiError::Internal(_) => {
                // Don't expose internal error details in production
                let error = if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                    "An internal error occurred".to_string()
                } else {
                    self.to_string()
                };
                (status, Json(ErrorResponse { error })).into_response()
            }
            _ => (status, Json(ErrorResponse { error: self.to_string() })).into_response(),
        }
    }
}
