//! Renderer collaborator boundary.
//!
//! The renderer receives resolved asset paths and both timelines and must
//! produce the output file. [`CommandRenderer`] hands a JSON manifest to an
//! external program.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use slidecut_models::{CaptionTimeline, ImageSchedule, JobId};

use crate::config::RendererConfig;
use crate::error::{WorkerError, WorkerResult};

/// File name of the manifest written next to the output.
pub const MANIFEST_FILE: &str = "render-manifest.json";

/// A local asset with its public form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderAsset {
    pub path: PathBuf,
    /// Path relative to the served root, e.g. `/<jobId>/images/file_0.jpg`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_path: Option<String>,
}

/// Everything the renderer needs for one job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderInput {
    pub job_id: JobId,
    pub video: RenderAsset,
    pub images: Vec<RenderAsset>,
    pub captions: CaptionTimeline,
    pub image_schedule: ImageSchedule,
    /// Target duration in seconds
    pub duration: f64,
    pub output_path: PathBuf,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `input`, returning the path of the finished file.
    async fn render(&self, input: &RenderInput) -> WorkerResult<PathBuf>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderManifest<'a> {
    #[serde(flatten)]
    input: &'a RenderInput,
    width: u32,
    height: u32,
}

/// Runs an external render program as
/// `<program> <args..> <manifest path> <output path>`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    config: RendererConfig,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(config: RendererConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    async fn write_manifest(&self, input: &RenderInput) -> WorkerResult<PathBuf> {
        let dir = input
            .output_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let manifest_path = dir.join(MANIFEST_FILE);

        let manifest = RenderManifest {
            input,
            width: self.config.width,
            height: self.config.height,
        };
        let bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| WorkerError::render_failed(format!("cannot encode manifest: {}", e)))?;
        tokio::fs::write(&manifest_path, bytes).await.map_err(|e| {
            WorkerError::render_failed(format!(
                "cannot write {}: {}",
                manifest_path.display(),
                e
            ))
        })?;
        Ok(manifest_path)
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, input: &RenderInput) -> WorkerResult<PathBuf> {
        let program = which::which(&self.config.program).map_err(|_| {
            WorkerError::config_error(format!(
                "render program '{}' not found",
                self.config.program
            ))
        })?;

        let manifest_path = self.write_manifest(input).await?;
        debug!(
            job_id = %input.job_id,
            program = %program.display(),
            manifest = %manifest_path.display(),
            "Starting render"
        );

        let child = Command::new(&program)
            .args(&self.config.args)
            .arg(&manifest_path)
            .arg(&input.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| WorkerError::render_failed(format!("cannot start renderer: {}", e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| WorkerError::render_failed(format!("renderer I/O: {}", e)))?
            }
            Err(_) => {
                warn!(job_id = %input.job_id, "Renderer timed out, killing process");
                return Err(WorkerError::render_failed(format!(
                    "renderer timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkerError::render_failed(format!(
                "renderer exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        match tokio::fs::metadata(&input.output_path).await {
            Ok(meta) if meta.len() > 0 => {
                info!(
                    job_id = %input.job_id,
                    output = %input.output_path.display(),
                    bytes = meta.len(),
                    "Render finished"
                );
                Ok(input.output_path.clone())
            }
            _ => Err(WorkerError::render_failed(format!(
                "renderer produced no output at {}",
                input.output_path.display()
            ))),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use std::num::NonZeroUsize;
    use tempfile::TempDir;

    use slidecut_media::{build_caption_timeline, build_image_schedule};

    fn input(dir: &Path) -> RenderInput {
        RenderInput {
            job_id: JobId::new(),
            video: RenderAsset {
                path: dir.join("videos/file_0.mp4"),
                public_path: None,
            },
            images: Vec::new(),
            captions: build_caption_timeline(&[], NonZeroUsize::new(4).unwrap(), Some(3.0)),
            image_schedule: build_image_schedule(1, 3.0, 3.0),
            duration: 3.0,
            output_path: dir.join("out.mp4"),
        }
    }

    fn shell(script: &str, timeout: Duration) -> CommandRenderer {
        CommandRenderer::new(
            RendererConfig {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
                ..RendererConfig::default()
            },
            timeout,
        )
    }

    #[tokio::test]
    async fn test_render_writes_manifest_and_output() {
        let dir = TempDir::new().unwrap();
        let input = input(dir.path());
        let renderer = shell("printf rendered > \"$2\"", Duration::from_secs(10));

        let path = renderer.render(&input).await.unwrap();

        assert_eq!(path, input.output_path);
        let manifest: serde_json::Value = serde_json::from_slice(
            &tokio::fs::read(dir.path().join(MANIFEST_FILE)).await.unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["width"], 1080);
        assert_eq!(manifest["height"], 1920);
        assert_eq!(manifest["jobId"], input.job_id.as_str());
        assert!(manifest["captions"]["batches"].is_array());
    }

    #[tokio::test]
    async fn test_failing_program_is_render_failed() {
        let dir = TempDir::new().unwrap();
        let renderer = shell("echo broken >&2; exit 3", Duration::from_secs(10));

        let err = renderer.render(&input(dir.path())).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::RenderFailed);
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_output_is_render_failed() {
        let dir = TempDir::new().unwrap();
        let renderer = shell("exit 0", Duration::from_secs(10));

        let err = renderer.render(&input(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("no output"));
    }

    #[tokio::test]
    async fn test_render_timeout() {
        let dir = TempDir::new().unwrap();
        let renderer = shell("sleep 5", Duration::from_millis(200));

        let err = renderer.render(&input(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
