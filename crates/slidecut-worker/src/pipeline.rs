//! Staged render pipeline.
//!
//! One job runs fetch, validate, extract, transcribe, schedule and render
//! strictly in sequence, each stage consuming the previous one's typed
//! output. Any error short-circuits to `Failed`, which deletes the job
//! directory before the structured failure is returned. The whole run is
//! bounded by the configured job timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::Instrument;

use slidecut_media::fetch::FetchedAsset;
use slidecut_media::{build_timelines, AssetFetcher, ExtractedAudio};
use slidecut_models::{Job, JobId, JobStage, RenderRequest};

use crate::cleanup::CleanupRegistry;
use crate::config::WorkerConfig;
use crate::error::{JobFailure, WorkerError, WorkerResult};
use crate::lifecycle::{JobManager, JobWorkspace};
use crate::logging::JobLogger;
use crate::metrics;
use crate::render::{RenderAsset, RenderInput, Renderer};
use crate::toolkit::MediaToolkit;
use crate::transcribe::Transcriber;

/// A finished job.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub job_id: JobId,
    pub output_path: PathBuf,
    /// `/<jobId>/output/<jobId>.<ext>`
    pub public_path: Option<String>,
    /// Video duration in seconds
    pub duration: f64,
    pub caption_batches: usize,
    pub image_slots: usize,
}

/// Stage outputs threaded through one run.
struct FetchedInputs {
    images: Vec<FetchedAsset>,
    video: FetchedAsset,
}

/// Runs render jobs end to end.
pub struct RenderPipeline {
    config: WorkerConfig,
    jobs: JobManager,
    fetcher: AssetFetcher,
    toolkit: Arc<dyn MediaToolkit>,
    transcriber: Arc<dyn Transcriber>,
    renderer: Arc<dyn Renderer>,
    job_slots: Arc<Semaphore>,
    slot_count: usize,
}

impl RenderPipeline {
    pub fn new(
        config: WorkerConfig,
        registry: CleanupRegistry,
        toolkit: Arc<dyn MediaToolkit>,
        transcriber: Arc<dyn Transcriber>,
        renderer: Arc<dyn Renderer>,
    ) -> WorkerResult<Self> {
        let fetcher = AssetFetcher::new(config.fetch.clone())?;
        let jobs = JobManager::new(config.work_root.clone(), registry, config.cleanup_delay);
        let slot_count = config.max_concurrent_jobs.max(1);
        let job_slots = Arc::new(Semaphore::new(slot_count));

        Ok(Self {
            config,
            jobs,
            fetcher,
            toolkit,
            transcriber,
            renderer,
            job_slots,
            slot_count,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub fn registry(&self) -> &CleanupRegistry {
        self.jobs.registry()
    }

    /// Run one request to completion.
    ///
    /// Returns the output artifact, or a failure naming the stage that
    /// failed. Request shape is checked before any directory is created.
    pub async fn run(&self, request: &RenderRequest) -> Result<RenderOutput, JobFailure> {
        if let Err(e) = request.validate() {
            return Err(JobFailure::new(None, JobStage::Created, &WorkerError::from(e)));
        }

        let permit = self.job_slots.acquire().await.map_err(|_| {
            JobFailure::new(
                None,
                JobStage::Created,
                &WorkerError::workspace("job slots closed"),
            )
        })?;
        self.report_in_flight();

        let result = match self.jobs.create_job().await {
            Ok((mut job, workspace)) => {
                let logger = JobLogger::new(&job.id);
                let span = logger.span();
                self.run_job(&mut job, &workspace, request, &logger)
                    .instrument(span)
                    .await
            }
            Err(e) => Err(JobFailure::new(None, JobStage::Created, &e)),
        };

        drop(permit);
        self.report_in_flight();
        result
    }

    fn report_in_flight(&self) {
        metrics::set_jobs_in_flight(self.slot_count.saturating_sub(self.job_slots.available_permits()));
    }

    async fn run_job(
        &self,
        job: &mut Job,
        workspace: &JobWorkspace,
        request: &RenderRequest,
        logger: &JobLogger,
    ) -> Result<RenderOutput, JobFailure> {
        let started = Instant::now();
        metrics::record_job_started();
        logger.log_start(
            request.variables.image_urls.len(),
            &request.variables.ugc_video_url,
        );

        let timeout = self.config.job_timeout;
        let result = match tokio::time::timeout(
            timeout,
            self.run_stages(job, workspace, request, logger),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(WorkerError::TimedOut(timeout.as_secs())),
        };
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(output) => {
                if let Err(e) = self.jobs.advance(job, JobStage::Completed).await {
                    logger.log_warning(&e.to_string());
                }
                metrics::record_job_completed(elapsed);
                logger.log_completion(&output.output_path, elapsed);
                Ok(output)
            }
            Err(error) => {
                let stage = job.stage;
                let failure = JobFailure::new(Some(job.id.clone()), stage, &error);
                logger.log_failure(&failure);

                if let Err(e) = self.jobs.advance(job, JobStage::Failed).await {
                    logger.log_warning(&e.to_string());
                }
                metrics::record_job_failed(stage, failure.kind, elapsed);
                Err(failure)
            }
        }
    }

    async fn enter(&self, job: &mut Job, stage: JobStage, logger: &JobLogger) -> WorkerResult<()> {
        self.jobs.advance(job, stage).await?;
        logger.log_stage(stage);
        Ok(())
    }

    async fn run_stages(
        &self,
        job: &mut Job,
        workspace: &JobWorkspace,
        request: &RenderRequest,
        logger: &JobLogger,
    ) -> WorkerResult<RenderOutput> {
        self.enter(job, JobStage::FetchingAssets, logger).await?;
        let inputs = self.fetch_inputs(workspace, request).await?;
        logger.log_progress(&format!("fetched {} images and the video", inputs.images.len()));

        self.enter(job, JobStage::ValidatingVideo, logger).await?;
        if !self.toolkit.is_playable(&inputs.video.local_path).await? {
            return Err(WorkerError::invalid_media(format!(
                "{} is not a playable video",
                inputs.video.source_url
            )));
        }

        self.enter(job, JobStage::ExtractingAudio, logger).await?;
        let audio: ExtractedAudio = self
            .toolkit
            .extract_audio(&inputs.video.local_path, &workspace.audio())
            .await?;

        self.enter(job, JobStage::Transcribing, logger).await?;
        let words = self.transcriber.transcribe(&audio.path).await?;
        if words.is_empty() {
            return Err(WorkerError::transcription_failed(
                "no words returned from transcription",
            ));
        }

        self.enter(job, JobStage::Scheduling, logger).await?;
        let timelines = build_timelines(
            &words,
            inputs.images.len(),
            audio.duration,
            &self.config.scheduler,
        );
        logger.log_progress(&format!(
            "{} caption batches, {} image slots over {:.2}s",
            timelines.captions.batches.len(),
            timelines.images.slots.len(),
            audio.duration
        ));

        self.enter(job, JobStage::Rendering, logger).await?;
        let asset = |fetched: &FetchedAsset| RenderAsset {
            path: fetched.local_path.clone(),
            public_path: workspace.public_path(&fetched.local_path),
        };
        let input = RenderInput {
            job_id: job.id.clone(),
            video: asset(&inputs.video),
            images: inputs.images.iter().map(asset).collect(),
            captions: timelines.captions,
            image_schedule: timelines.images,
            duration: audio.duration,
            output_path: workspace.output_file(&self.config.output_extension),
        };
        let output_path = self.renderer.render(&input).await?;

        Ok(RenderOutput {
            job_id: job.id.clone(),
            public_path: workspace.public_path(&output_path),
            output_path,
            duration: audio.duration,
            caption_batches: input.captions.batches.len(),
            image_slots: input.image_schedule.slots.len(),
        })
    }

    async fn fetch_inputs(
        &self,
        workspace: &JobWorkspace,
        request: &RenderRequest,
    ) -> WorkerResult<FetchedInputs> {
        let vars = &request.variables;
        // Every source is checked before the first byte is downloaded.
        let policy = &self.config.fetch.policy;
        for url in vars.image_urls.iter().chain(std::iter::once(&vars.ugc_video_url)) {
            policy.check(url)?;
        }

        let images = self
            .fetcher
            .fetch(&vars.image_urls, &workspace.images())
            .await?;
        let video = self
            .fetcher
            .fetch(std::slice::from_ref(&vars.ugc_video_url), &workspace.videos())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WorkerError::invalid_media("video download produced no file"))?;

        Ok(FetchedInputs { images, video })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use slidecut_media::SourcePolicy;
    use slidecut_models::Word;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::error::FailureKind;

    struct FakeToolkit {
        playable: bool,
        duration: f64,
    }

    #[async_trait]
    impl MediaToolkit for FakeToolkit {
        async fn is_playable(&self, path: &Path) -> WorkerResult<bool> {
            Ok(self.playable && path.exists())
        }

        async fn extract_audio(&self, video: &Path, out_dir: &Path) -> WorkerResult<ExtractedAudio> {
            let path = crate::toolkit::audio_path_for(video, out_dir);
            tokio::fs::write(&path, b"RIFF").await?;
            Ok(ExtractedAudio {
                path,
                duration: self.duration,
            })
        }
    }

    struct FakeTranscriber {
        words: Vec<Word>,
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, _audio: &Path) -> WorkerResult<Vec<Word>> {
            Ok(self.words.clone())
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        fail: bool,
        delay: Option<Duration>,
        seen: Mutex<Option<RenderInput>>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, input: &RenderInput) -> WorkerResult<PathBuf> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(WorkerError::render_failed("compositor crashed"));
            }
            tokio::fs::write(&input.output_path, b"video").await?;
            *self.seen.lock().unwrap() = Some(input.clone());
            Ok(input.output_path.clone())
        }
    }

    fn words() -> Vec<Word> {
        ["one", "two", "three", "four", "five"]
            .iter()
            .enumerate()
            .map(|(i, w)| Word::new(*w, i as f64, i as f64 + 0.5, 0.9))
            .collect()
    }

    async fn serve_assets() -> MockServer {
        let server = MockServer::start().await;
        for name in ["/a.jpg", "/b.jpg"] {
            Mock::given(method("GET"))
                .and(path(name))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 32]))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![2u8; 64]))
            .mount(&server)
            .await;
        server
    }

    fn config(root: &Path) -> WorkerConfig {
        let mut config = WorkerConfig {
            work_root: root.to_path_buf(),
            ..WorkerConfig::default()
        };
        config.fetch.policy = SourcePolicy::new(["127.0.0.1"]);
        config.fetch.timeout = Duration::from_secs(5);
        config
    }

    fn request(server: &MockServer) -> RenderRequest {
        RenderRequest::new(
            vec![
                format!("{}/a.jpg", server.uri()),
                format!("{}/b.jpg", server.uri()),
            ],
            format!("{}/clip.mp4", server.uri()),
        )
    }

    fn pipeline(
        config: WorkerConfig,
        toolkit: FakeToolkit,
        renderer: Arc<FakeRenderer>,
    ) -> RenderPipeline {
        RenderPipeline::new(
            config,
            CleanupRegistry::new(),
            Arc::new(toolkit),
            Arc::new(FakeTranscriber { words: words() }),
            renderer,
        )
        .unwrap()
    }

    async fn job_dirs(root: &Path) -> usize {
        let mut count = 0;
        let mut entries = tokio::fs::read_dir(root).await.unwrap();
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn test_successful_run_keeps_output_and_arms_cleanup() {
        let root = TempDir::new().unwrap();
        let server = serve_assets().await;
        let renderer = Arc::new(FakeRenderer::default());
        let pipeline = pipeline(
            config(root.path()),
            FakeToolkit {
                playable: true,
                duration: 10.0,
            },
            renderer.clone(),
        );

        let output = pipeline.run(&request(&server)).await.unwrap();

        assert!(output.output_path.is_file());
        assert_eq!(
            output.public_path.as_deref(),
            Some(format!("/{0}/output/{0}.mp4", output.job_id).as_str())
        );
        assert_eq!(output.caption_batches, 2);
        assert_eq!(output.image_slots, 4);

        let input = renderer.seen.lock().unwrap().clone().unwrap();
        assert_eq!(input.images.len(), 2);
        assert!(input.images[0].path.ends_with("images/file_0.jpg"));
        assert_eq!(input.image_schedule.slots[3].image_index, 1);

        let entries = pipeline.registry().active_entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_armed());
    }

    #[tokio::test]
    async fn test_invalid_request_creates_nothing() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline(
            config(root.path()),
            FakeToolkit {
                playable: true,
                duration: 10.0,
            },
            Arc::new(FakeRenderer::default()),
        );

        let failure = pipeline
            .run(&RenderRequest::new(Vec::new(), "https://drive.google.com/x"))
            .await
            .unwrap_err();

        assert!(failure.is_invalid_input());
        assert_eq!(failure.job_id, None);
        assert_eq!(job_dirs(root.path()).await, 0);
    }

    #[tokio::test]
    async fn test_rejected_source_fails_fetch_stage() {
        let root = TempDir::new().unwrap();
        let server = serve_assets().await;
        let pipeline = pipeline(
            config(root.path()),
            FakeToolkit {
                playable: true,
                duration: 10.0,
            },
            Arc::new(FakeRenderer::default()),
        );
        let mut req = request(&server);
        req.variables.ugc_video_url = "https://evil.example.com/clip.mp4".to_string();

        let failure = pipeline.run(&req).await.unwrap_err();

        assert_eq!(failure.stage, JobStage::FetchingAssets);
        assert_eq!(failure.kind, FailureKind::SourceRejected);
        assert_eq!(job_dirs(root.path()).await, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(pipeline.registry().is_empty());
    }

    #[tokio::test]
    async fn test_unplayable_video_fails_validation_and_cleans_up() {
        let root = TempDir::new().unwrap();
        let server = serve_assets().await;
        let pipeline = pipeline(
            config(root.path()),
            FakeToolkit {
                playable: false,
                duration: 10.0,
            },
            Arc::new(FakeRenderer::default()),
        );

        let failure = pipeline.run(&request(&server)).await.unwrap_err();

        assert_eq!(failure.stage, JobStage::ValidatingVideo);
        assert_eq!(failure.kind, FailureKind::InvalidMedia);
        assert!(failure.job_id.is_some());
        assert_eq!(job_dirs(root.path()).await, 0);
    }

    #[tokio::test]
    async fn test_render_failure_names_render_stage() {
        let root = TempDir::new().unwrap();
        let server = serve_assets().await;
        let pipeline = pipeline(
            config(root.path()),
            FakeToolkit {
                playable: true,
                duration: 10.0,
            },
            Arc::new(FakeRenderer {
                fail: true,
                ..FakeRenderer::default()
            }),
        );

        let failure = pipeline.run(&request(&server)).await.unwrap_err();

        assert_eq!(failure.stage, JobStage::Rendering);
        assert_eq!(failure.kind, FailureKind::RenderFailed);
        assert!(failure.message.contains("compositor crashed"));
        assert_eq!(job_dirs(root.path()).await, 0);
        assert!(pipeline.registry().is_empty());
    }

    #[tokio::test]
    async fn test_job_timeout_fails_current_stage_and_cleans_up() {
        let root = TempDir::new().unwrap();
        let server = serve_assets().await;
        let mut config = config(root.path());
        config.job_timeout = Duration::from_millis(300);
        let pipeline = pipeline(
            config,
            FakeToolkit {
                playable: true,
                duration: 10.0,
            },
            Arc::new(FakeRenderer {
                delay: Some(Duration::from_secs(10)),
                ..FakeRenderer::default()
            }),
        );

        let failure = tokio::time::timeout(Duration::from_secs(5), pipeline.run(&request(&server)))
            .await
            .unwrap()
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::TimedOut);
        assert_eq!(failure.stage, JobStage::Rendering);
        assert!(failure.job_id.is_some());
        assert_eq!(job_dirs(root.path()).await, 0);
        assert!(pipeline.registry().is_empty());
    }
}
