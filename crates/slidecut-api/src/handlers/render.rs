//! Render handlers.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use tracing::{info, warn};

use slidecut_models::{JobId, RenderRequest};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// MIME type served for an output extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "ogv" => "video/ogg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

fn file_response(bytes: Vec<u8>, extension: &str, job_id: &JobId) -> ApiResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(extension))
        .header(header::CONTENT_LENGTH, bytes.len())
        .header("X-Job-Id", job_id.as_str())
        .header("Cross-Origin-Resource-Policy", "cross-origin")
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Run the top/bottom template and answer with the rendered file.
///
/// Blocks until the job finishes. The output stays retrievable through
/// [`get_output`] until its deferred cleanup fires.
pub async fn render_top_bottom(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let output = state.pipeline.run(&request).await?;
    info!(
        job_id = %output.job_id,
        duration = output.duration,
        "Render finished, sending output"
    );

    let bytes = tokio::fs::read(&output.output_path).await.map_err(|e| {
        warn!(job_id = %output.job_id, "Rendered file unreadable: {}", e);
        ApiError::internal(format!("rendered file unreadable: {}", e))
    })?;

    file_response(bytes, &state.pipeline.config().output_extension, &output.job_id)
}

/// Serve a finished job's output while it is retained.
pub async fn get_output(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job_id = JobId::parse(&job_id).ok_or_else(|| ApiError::bad_request("Invalid job id"))?;
    let extension = &state.pipeline.config().output_extension;
    let path = state
        .pipeline
        .jobs()
        .output_path(job_id.as_str(), extension)
        .ok_or_else(|| ApiError::bad_request("Invalid job id"))?;

    match tokio::fs::read(&path).await {
        Ok(bytes) => file_response(bytes, extension, &job_id),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::not_found("Output not found or expired"))
        }
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}
