//! Job lifecycle: isolated working directories and stage bookkeeping.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use slidecut_media::remove_tree;
use slidecut_models::{Job, JobId, JobStage, StageTransitionError};

use crate::cleanup::{CleanupRegistry, DeleteOutcome};
use crate::error::{WorkerError, WorkerResult};

/// Sub-directories of every job, named by role.
pub const IMAGES_DIR: &str = "images";
pub const VIDEOS_DIR: &str = "videos";
pub const AUDIO_DIR: &str = "audio";
pub const OUTPUT_DIR: &str = "output";

/// Directory layout of one job: `<root>/<jobId>/{videos,audio,images,output}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobWorkspace {
    job_id: JobId,
    work_root: PathBuf,
    root: PathBuf,
}

impl JobWorkspace {
    pub fn new(work_root: impl Into<PathBuf>, job_id: &JobId) -> Self {
        let work_root = work_root.into();
        Self {
            root: work_root.join(job_id.as_str()),
            job_id: job_id.clone(),
            work_root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn videos(&self) -> PathBuf {
        self.root.join(VIDEOS_DIR)
    }

    pub fn audio(&self) -> PathBuf {
        self.root.join(AUDIO_DIR)
    }

    pub fn output(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Final artifact path, `output/<jobId>.<ext>`.
    pub fn output_file(&self, extension: &str) -> PathBuf {
        self.output()
            .join(format!("{}.{}", self.job_id.as_str(), extension))
    }

    /// Path of `path` as served from the work root, e.g.
    /// `/<jobId>/images/file_0.jpg`. `None` if `path` lies outside it.
    pub fn public_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.work_root).ok()?;
        let joined = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Some(format!("/{}", joined))
    }

    fn subdirectories(&self) -> [PathBuf; 4] {
        [self.videos(), self.audio(), self.images(), self.output()]
    }
}

/// Creates job directories and drives stage transitions, handing
/// directories to the [`CleanupRegistry`] on terminal stages.
#[derive(Debug, Clone)]
pub struct JobManager {
    work_root: PathBuf,
    registry: CleanupRegistry,
    retention: Duration,
}

impl JobManager {
    pub fn new(work_root: impl Into<PathBuf>, registry: CleanupRegistry, retention: Duration) -> Self {
        Self {
            work_root: work_root.into(),
            registry,
            retention,
        }
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn registry(&self) -> &CleanupRegistry {
        &self.registry
    }

    /// Allocate a fresh job and its directory tree.
    ///
    /// The job root is created with `create_dir`, which fails if the path
    /// already exists, so two jobs can never share a directory. A failure
    /// part-way through removes whatever was created.
    pub async fn create_job(&self) -> WorkerResult<(Job, JobWorkspace)> {
        self.create_job_with_id(JobId::new()).await
    }

    async fn create_job_with_id(&self, job_id: JobId) -> WorkerResult<(Job, JobWorkspace)> {
        tokio::fs::create_dir_all(&self.work_root).await.map_err(|e| {
            WorkerError::workspace(format!(
                "cannot create work root {}: {}",
                self.work_root.display(),
                e
            ))
        })?;

        let workspace = JobWorkspace::new(&self.work_root, &job_id);

        tokio::fs::create_dir(workspace.root()).await.map_err(|e| {
            WorkerError::workspace(format!(
                "cannot create job directory {}: {}",
                workspace.root().display(),
                e
            ))
        })?;

        // Tracked from the moment the directory exists.
        if !self.registry.track(&job_id, workspace.root()).await {
            if let Err(e) = remove_tree(workspace.root()).await {
                warn!(job_id = %job_id, "Failed to remove untracked job directory: {}", e);
            }
            return Err(WorkerError::workspace(format!(
                "job id {} is already in use",
                job_id
            )));
        }

        for dir in workspace.subdirectories() {
            if let Err(e) = tokio::fs::create_dir(&dir).await {
                self.registry.cancel_and_delete_now(&job_id).await;
                return Err(WorkerError::workspace(format!(
                    "cannot create {}: {}",
                    dir.display(),
                    e
                )));
            }
        }

        debug!(job_id = %job_id, root = %workspace.root().display(), "Created job workspace");
        Ok((Job::new(job_id, workspace.root()), workspace))
    }

    /// Move `job` to `to`.
    ///
    /// Entering `Failed` deletes the job directory before returning.
    /// Entering `Completed` arms deferred deletion after the retention
    /// window. Illegal transitions change nothing.
    pub async fn advance(&self, job: &mut Job, to: JobStage) -> Result<(), StageTransitionError> {
        job.advance(to)?;

        match to {
            JobStage::Failed => {
                let outcome = self.registry.cancel_and_delete_now(&job.id).await;
                if outcome == DeleteOutcome::Failed {
                    warn!(job_id = %job.id, "Forced cleanup left files behind; the sweep will retry");
                }
            }
            JobStage::Completed => {
                let delete_at = self
                    .registry
                    .arm(&job.id, job.work_dir.clone(), self.retention)
                    .await;
                info!(job_id = %job.id, delete_at = %delete_at, "Job output retained until deletion");
            }
            _ => {}
        }
        Ok(())
    }

    /// Path of a job's output file, when the id is well formed.
    pub fn output_path(&self, job_id: &str, extension: &str) -> Option<PathBuf> {
        let job_id = JobId::parse(job_id)?;
        Some(JobWorkspace::new(&self.work_root, &job_id).output_file(extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn manager(root: &Path) -> JobManager {
        JobManager::new(root, CleanupRegistry::new(), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_create_job_builds_layout() {
        let root = TempDir::new().unwrap();
        let jobs = manager(root.path());

        let (job, ws) = jobs.create_job().await.unwrap();

        assert_eq!(job.stage, JobStage::Created);
        assert_eq!(job.work_dir, root.path().join(job.id.as_str()));
        for dir in [ws.images(), ws.videos(), ws.audio(), ws.output()] {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        assert!(jobs.registry().is_tracked(&job.id));
        assert_eq!(
            ws.output_file("mp4"),
            ws.root().join("output").join(format!("{}.mp4", job.id))
        );
    }

    #[tokio::test]
    async fn test_concurrent_jobs_get_distinct_directories() {
        let root = TempDir::new().unwrap();
        let jobs = manager(root.path());

        let created = futures::future::join_all((0..32).map(|_| jobs.create_job())).await;
        let dirs: HashSet<PathBuf> = created
            .into_iter()
            .map(|r| r.unwrap().0.work_dir)
            .collect();
        assert_eq!(dirs.len(), 32);
    }

    #[tokio::test]
    async fn test_reused_job_id_is_refused() {
        let root = TempDir::new().unwrap();
        let jobs = manager(root.path());
        let id = JobId::new();
        let elsewhere = root.path().join("elsewhere");
        assert!(jobs.registry().track(&id, &elsewhere).await);

        let err = jobs.create_job_with_id(id.clone()).await.unwrap_err();

        assert!(matches!(err, WorkerError::Workspace(_)));
        assert!(!root.path().join(id.as_str()).exists());
        let entries = jobs.registry().active_entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].directory, elsewhere);
    }

    #[tokio::test]
    async fn test_failure_deletes_immediately_once() {
        let root = TempDir::new().unwrap();
        let jobs = manager(root.path());
        let (mut job, ws) = jobs.create_job().await.unwrap();

        jobs.advance(&mut job, JobStage::FetchingAssets).await.unwrap();
        jobs.advance(&mut job, JobStage::Failed).await.unwrap();

        assert!(!ws.root().exists());
        assert!(!jobs.registry().is_tracked(&job.id));
        assert_eq!(job.failed_at_stage, Some(JobStage::FetchingAssets));
        assert!(jobs.advance(&mut job, JobStage::Failed).await.is_err());
    }

    #[tokio::test]
    async fn test_completion_arms_deferred_cleanup() {
        let root = TempDir::new().unwrap();
        let jobs = manager(root.path());
        let (mut job, ws) = jobs.create_job().await.unwrap();

        let mut stage = job.stage;
        while let Some(next) = stage.next() {
            jobs.advance(&mut job, next).await.unwrap();
            stage = next;
        }

        assert!(ws.root().exists());
        let entries = jobs.registry().active_entries().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_armed());
    }

    #[tokio::test]
    async fn test_illegal_transition_has_no_side_effects() {
        let root = TempDir::new().unwrap();
        let jobs = manager(root.path());
        let (mut job, ws) = jobs.create_job().await.unwrap();

        assert!(jobs.advance(&mut job, JobStage::Completed).await.is_err());
        assert!(ws.root().exists());
        assert_eq!(job.stage, JobStage::Created);
    }

    #[test]
    fn test_public_path() {
        let id = JobId::new();
        let ws = JobWorkspace::new("/srv/public", &id);
        let path = ws.images().join("file_0.jpg");
        assert_eq!(
            ws.public_path(&path).unwrap(),
            format!("/{}/images/file_0.jpg", id)
        );
        assert_eq!(ws.public_path(Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn test_output_path_rejects_bad_ids() {
        let jobs = manager(Path::new("/srv/public"));
        assert!(jobs.output_path("../../etc/passwd", "mp4").is_none());
        let id = JobId::new();
        assert!(jobs.output_path(id.as_str(), "mp4").is_some());
    }
}
