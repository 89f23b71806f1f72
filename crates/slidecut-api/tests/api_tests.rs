//! API integration tests.
//!
//! The router runs in-process against a real pipeline whose media,
//! transcription and render collaborators are fakes; assets are served by
//! a local mock server.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use slidecut_api::{create_router, ApiConfig, AppState};
use slidecut_media::{ExtractedAudio, SourcePolicy};
use slidecut_models::Word;
use slidecut_worker::toolkit::audio_path_for;
use slidecut_worker::{
    CleanupRegistry, MediaToolkit, RenderInput, RenderPipeline, Renderer, Transcriber,
    WorkerConfig, WorkerError, WorkerResult,
};

struct FakeToolkit;

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn is_playable(&self, path: &Path) -> WorkerResult<bool> {
        Ok(path.exists())
    }

    async fn extract_audio(&self, video: &Path, out_dir: &Path) -> WorkerResult<ExtractedAudio> {
        let path = audio_path_for(video, out_dir);
        tokio::fs::write(&path, b"RIFF").await?;
        Ok(ExtractedAudio {
            path,
            duration: 7.5,
        })
    }
}

struct FakeTranscriber;

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &Path) -> WorkerResult<Vec<Word>> {
        Ok(vec![
            Word::new("hello", 0.2, 0.6, 0.99),
            Word::new("world", 0.7, 1.1, 0.98),
        ])
    }
}

struct FakeRenderer {
    fail: bool,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, input: &RenderInput) -> WorkerResult<PathBuf> {
        if self.fail {
            return Err(WorkerError::render_failed("browser exited"));
        }
        tokio::fs::write(&input.output_path, b"fake video bytes").await?;
        Ok(input.output_path.clone())
    }
}

async fn asset_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/top.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 16]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ugc.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 64]))
        .mount(&server)
        .await;
    server
}

fn test_router(root: &Path, fail_render: bool) -> Router {
    let mut worker = WorkerConfig {
        work_root: root.to_path_buf(),
        ..WorkerConfig::default()
    };
    worker.fetch.policy = SourcePolicy::new(["127.0.0.1"]);
    worker.fetch.timeout = Duration::from_secs(5);

    let pipeline = RenderPipeline::new(
        worker,
        CleanupRegistry::new(),
        Arc::new(FakeToolkit),
        Arc::new(FakeTranscriber),
        Arc::new(FakeRenderer { fail: fail_render }),
    )
    .unwrap();

    create_router(
        AppState::with_pipeline(ApiConfig::default(), pipeline),
        None,
    )
}

fn render_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/render/top-bottom-template")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_greeting() {
    let root = TempDir::new().unwrap();
    let response = test_router(root.path(), false)
        .oneshot(get("/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Hello World!");
}

#[tokio::test]
async fn test_health_endpoint_and_security_headers() {
    let root = TempDir::new().unwrap();
    let response = test_router(root.path(), false)
        .oneshot(get("/health"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers.contains_key("X-Content-Type-Options"));
    assert!(headers.contains_key("X-Frame-Options"));
    assert!(headers.contains_key("X-Request-ID"));

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tracked_jobs"], 0);
}

#[tokio::test]
async fn test_missing_images_is_bad_request() {
    let root = TempDir::new().unwrap();
    let response = test_router(root.path(), false)
        .oneshot(render_request(serde_json::json!({
            "variables": { "imageUrls": [], "ugcVideoUrl": "https://drive.google.com/v" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "imageUrls array is required and cannot be empty");
}

#[tokio::test]
async fn test_missing_video_is_bad_request() {
    let root = TempDir::new().unwrap();
    let response = test_router(root.path(), false)
        .oneshot(render_request(serde_json::json!({
            "variables": { "imageUrls": ["https://drive.google.com/a"] }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "ugcVideoUrl string is required");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let root = TempDir::new().unwrap();
    let response = test_router(root.path(), false)
        .oneshot(render_request(serde_json::json!({ "nothing": true })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_render_returns_file_and_keeps_it_retrievable() {
    let root = TempDir::new().unwrap();
    let server = asset_server().await;
    let app = test_router(root.path(), false);

    let response = app
        .clone()
        .oneshot(render_request(serde_json::json!({
            "variables": {
                "imageUrls": [format!("{}/top.png", server.uri())],
                "ugcVideoUrl": format!("{}/ugc.mp4", server.uri()),
            }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "video/mp4");
    let job_id = response.headers()["x-job-id"].to_str().unwrap().to_string();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"fake video bytes");

    let again = app
        .oneshot(get(&format!("/render/{}/output", job_id)))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_render_failure_reports_stage_and_cleans_up() {
    let root = TempDir::new().unwrap();
    let server = asset_server().await;

    let response = test_router(root.path(), true)
        .oneshot(render_request(serde_json::json!({
            "variables": {
                "imageUrls": [format!("{}/top.png", server.uri())],
                "ugcVideoUrl": format!("{}/ugc.mp4", server.uri()),
            }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Video rendering failed");
    assert_eq!(body["stage"], "rendering");
    assert_eq!(body["kind"], "render-failed");
    assert!(body["details"].as_str().unwrap().contains("browser exited"));
    assert!(body["jobId"].is_string());

    let mut entries = tokio::fs::read_dir(root.path()).await.unwrap();
    assert!(entries.next_entry().await.unwrap().is_none());
}

#[tokio::test]
async fn test_output_lookup_validates_job_id() {
    let root = TempDir::new().unwrap();
    let app = test_router(root.path(), false);

    let bad = app
        .clone()
        .oneshot(get("/render/not-a-job/output"))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .oneshot(get("/render/550e8400-e29b-41d4-a716-446655440000/output"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight() {
    let root = TempDir::new().unwrap();
    let response = test_router(root.path(), false)
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/render/top-bottom-template")
                .header("Origin", "http://localhost:3000")
                .header("Access-Control-Request-Method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status() == StatusCode::OK || response.status() == StatusCode::NO_CONTENT);
}
