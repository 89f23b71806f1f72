//! Worker configuration.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use slidecut_media::fetch::{FetchConfig, DEFAULT_MAX_BYTES};
use slidecut_media::timeline::{SchedulerSettings, DEFAULT_BATCH_SIZE, DEFAULT_SLOT_SECONDS};
use slidecut_media::SourcePolicy;

/// Parse an environment variable, falling back to `default` when it is
/// missing or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root under which every job directory is created
    pub work_root: PathBuf,
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// How long a completed job's output stays on disk
    pub cleanup_delay: Duration,
    /// Interval between orphan sweeps
    pub sweep_interval: Duration,
    /// Age after which an untracked job directory is swept
    pub sweep_max_age: Duration,
    /// Bound on one whole job, all stages included
    pub job_timeout: Duration,
    /// Bound on the render stage
    pub render_timeout: Duration,
    /// Bound on audio extraction
    pub extract_timeout: Duration,
    /// Timeline scheduling knobs
    pub scheduler: SchedulerSettings,
    /// Extension of the rendered output file
    pub output_extension: String,
    /// Asset download limits and allowlist
    pub fetch: FetchConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_root: PathBuf::from("./public"),
            max_concurrent_jobs: 2,
            cleanup_delay: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(3600),
            sweep_max_age: Duration::from_secs(86_400),
            job_timeout: Duration::from_secs(1800),
            render_timeout: Duration::from_secs(1200),
            extract_timeout: Duration::from_secs(300),
            scheduler: SchedulerSettings::default(),
            output_extension: "mp4".to_string(),
            fetch: FetchConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let batch_size = NonZeroUsize::new(env_or("CAPTION_BATCH_SIZE", DEFAULT_BATCH_SIZE))
            .unwrap_or(defaults.scheduler.batch_size);

        Self {
            work_root: std::env::var("WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_root),
            max_concurrent_jobs: env_or("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs).max(1),
            cleanup_delay: Duration::from_secs(env_or("CLEANUP_DELAY_SECS", 600)),
            sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 3600).max(1)),
            sweep_max_age: Duration::from_secs(env_or("SWEEP_MAX_AGE_SECS", 86_400)),
            job_timeout: Duration::from_secs(env_or("JOB_TIMEOUT_SECS", 1800)),
            render_timeout: Duration::from_secs(env_or("RENDER_TIMEOUT_SECS", 1200)),
            extract_timeout: Duration::from_secs(env_or("EXTRACT_TIMEOUT_SECS", 300)),
            scheduler: SchedulerSettings {
                batch_size,
                slot_length: env_or("IMAGE_SLOT_SECS", DEFAULT_SLOT_SECONDS),
            },
            output_extension: std::env::var("OUTPUT_EXTENSION")
                .ok()
                .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .unwrap_or(defaults.output_extension),
            fetch: fetch_config_from_env(),
        }
    }
}

/// Download limits from `FETCH_*` variables.
pub fn fetch_config_from_env() -> FetchConfig {
    let defaults = FetchConfig::default();

    let policy = match std::env::var("FETCH_ALLOWED_HOSTS") {
        Ok(hosts) if !hosts.trim().is_empty() => SourcePolicy::new(hosts.split(',')),
        _ => defaults.policy,
    };

    FetchConfig {
        max_bytes: env_or("FETCH_MAX_BYTES", DEFAULT_MAX_BYTES),
        timeout: Duration::from_secs(env_or("FETCH_TIMEOUT_SECS", defaults.timeout.as_secs())),
        max_parallel: env_or("FETCH_MAX_PARALLEL", defaults.max_parallel).max(1),
        policy,
        user_agent: std::env::var("FETCH_USER_AGENT").unwrap_or(defaults.user_agent),
    }
}

/// Speech-to-text provider settings.
#[derive(Debug, Clone)]
pub struct TranscriberConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: Option<String>,
    pub timeout: Duration,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.deepgram.com".to_string(),
            model: "nova-2".to_string(),
            language: None,
            timeout: Duration::from_secs(300),
        }
    }
}

impl TranscriberConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: std::env::var("DEEPGRAM_API_KEY").unwrap_or_default(),
            base_url: std::env::var("DEEPGRAM_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("DEEPGRAM_MODEL").unwrap_or(defaults.model),
            language: std::env::var("DEEPGRAM_LANGUAGE")
                .ok()
                .filter(|l| !l.trim().is_empty()),
            timeout: Duration::from_secs(env_or("DEEPGRAM_TIMEOUT_SECS", 300)),
        }
    }
}

/// External render program settings.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Program invoked with the manifest path appended
    pub program: String,
    /// Arguments placed before the manifest path
    pub args: Vec<String>,
    pub width: u32,
    pub height: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: "slidecut-render".to_string(),
            args: Vec::new(),
            width: 1080,
            height: 1920,
        }
    }
}

impl RendererConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            program: std::env::var("RENDERER_PROGRAM").unwrap_or(defaults.program),
            args: std::env::var("RENDERER_ARGS")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            width: env_or("RENDER_WIDTH", defaults.width),
            height: env_or("RENDER_HEIGHT", defaults.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.work_root, PathBuf::from("./public"));
        assert_eq!(config.cleanup_delay, Duration::from_secs(600));
        assert_eq!(config.scheduler.batch_size.get(), 4);
        assert_eq!(config.scheduler.slot_length, 3.0);
        assert_eq!(config.output_extension, "mp4");
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("SLIDECUT_TEST_ENV_OR", "not-a-number");
        assert_eq!(env_or("SLIDECUT_TEST_ENV_OR", 7u64), 7);
        std::env::set_var("SLIDECUT_TEST_ENV_OR", " 12 ");
        assert_eq!(env_or("SLIDECUT_TEST_ENV_OR", 7u64), 12);
        std::env::remove_var("SLIDECUT_TEST_ENV_OR");
    }

    #[test]
    fn test_renderer_defaults_to_vertical_canvas() {
        let config = RendererConfig::default();
        assert_eq!((config.width, config.height), (1080, 1920));
    }
}
