//! Application state.

use std::sync::Arc;

use slidecut_worker::{
    CommandRenderer, DeepgramTranscriber, FfmpegToolkit, RenderPipeline, RendererConfig,
    TranscriberConfig, WorkerConfig, WorkerResult,
};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<RenderPipeline>,
}

impl AppState {
    /// Wire the production collaborators from environment config.
    pub fn new(config: ApiConfig, worker: WorkerConfig) -> WorkerResult<Self> {
        let toolkit = Arc::new(FfmpegToolkit::new(worker.extract_timeout));
        let transcriber = Arc::new(DeepgramTranscriber::new(TranscriberConfig::from_env())?);
        let renderer = Arc::new(CommandRenderer::new(
            RendererConfig::from_env(),
            worker.render_timeout,
        ));

        let pipeline = RenderPipeline::new(
            worker,
            Default::default(),
            toolkit,
            transcriber,
            renderer,
        )?;

        Ok(Self::with_pipeline(config, pipeline))
    }

    pub fn with_pipeline(config: ApiConfig, pipeline: RenderPipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
        }
    }
}
