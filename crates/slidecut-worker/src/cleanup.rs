//! Cleanup registry and scheduler.
//!
//! Tracks which directory belongs to which job and removes it either after
//! a retention delay, immediately on failure, or from a periodic sweep of
//! old untracked directories. State is in memory only; the sweep covers
//! directories left behind by a previous process.
//!
//! Every job has its own async lock. Operations on one job serialize on it
//! while different jobs proceed independently. The outer map lock is held
//! only for lookups and never across an await.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use slidecut_media::{remove_tree, RemoveOutcome};
use slidecut_models::{CleanupEntry, JobId};

use crate::metrics;

/// Why a directory is being removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// Retention timer fired
    Deferred,
    /// Job failed
    Forced,
    /// Explicit request
    Manual,
    /// Periodic sweep of untracked directories
    Sweep,
}

impl CleanupReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupReason::Deferred => "deferred",
            CleanupReason::Forced => "forced",
            CleanupReason::Manual => "manual",
            CleanupReason::Sweep => "sweep",
        }
    }
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Entry removed and its directory deleted (or already absent on disk)
    Deleted(RemoveOutcome),
    /// No entry for this job; nothing to do
    NotTracked,
    /// Entry removed but the directory could not be deleted
    Failed,
}

/// Counters from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
    pub skipped_tracked: usize,
    pub skipped_young: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct Tracked {
    entry: CleanupEntry,
    timer: Option<Timer>,
}

/// Per-job slot. `None` once the entry is gone or while a sweep owns it.
type Slot = Arc<AsyncMutex<Option<Tracked>>>;

#[derive(Debug, Default)]
struct Inner {
    slots: Mutex<HashMap<JobId, Slot>>,
    next_generation: AtomicU64,
}

/// Shared registry of job directories awaiting deletion.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct CleanupRegistry {
    inner: Arc<Inner>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, Slot>> {
        // A panic while holding the map lock cannot leave the map torn.
        self.inner
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, job_id: &JobId, slot: &Slot) -> bool {
        self.map()
            .get(job_id)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
    }

    /// Lock the slot for `job_id`, if one exists.
    ///
    /// Re-checks membership after acquiring, since the slot may have been
    /// removed while waiting.
    async fn lock_slot(&self, job_id: &JobId) -> Option<(Slot, OwnedMutexGuard<Option<Tracked>>)> {
        loop {
            let slot = self.map().get(job_id).cloned()?;
            let guard = slot.clone().lock_owned().await;
            if self.is_current(job_id, &slot) {
                return Some((slot, guard));
            }
        }
    }

    /// Lock the slot for `job_id`, creating an empty one when absent.
    async fn lock_or_insert(&self, job_id: &JobId) -> (Slot, OwnedMutexGuard<Option<Tracked>>) {
        loop {
            let slot = self
                .map()
                .entry(job_id.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
                .clone();
            let guard = slot.clone().lock_owned().await;
            if self.is_current(job_id, &slot) {
                return (slot, guard);
            }
        }
    }

    fn forget(&self, job_id: &JobId, slot: &Slot) {
        let mut map = self.map();
        if map.get(job_id).map(|s| Arc::ptr_eq(s, slot)).unwrap_or(false) {
            map.remove(job_id);
        }
        metrics::set_cleanup_tracked(map.len());
    }

    /// Start tracking a freshly created job directory with no timer.
    ///
    /// Returns `false` if the job is already tracked.
    pub async fn track(&self, job_id: &JobId, directory: impl Into<PathBuf>) -> bool {
        let (_slot, mut guard) = self.lock_or_insert(job_id).await;
        if guard.is_some() {
            warn!(job_id = %job_id, "Job is already tracked for cleanup");
            return false;
        }
        *guard = Some(Tracked {
            entry: CleanupEntry::new(job_id.clone(), directory.into()),
            timer: None,
        });
        metrics::set_cleanup_tracked(self.len());
        debug!(job_id = %job_id, "Tracking job directory");
        true
    }

    /// Schedule deletion of `directory` after `delay`.
    ///
    /// Replaces any pending timer for the job. The timer holds only a weak
    /// reference to the registry and fires at most once.
    pub async fn arm(
        &self,
        job_id: &JobId,
        directory: impl Into<PathBuf>,
        delay: Duration,
    ) -> chrono::DateTime<Utc> {
        let directory = directory.into();
        let (_slot, mut guard) = self.lock_or_insert(job_id).await;

        let tracked = guard.get_or_insert_with(|| Tracked {
            entry: CleanupEntry::new(job_id.clone(), directory.clone()),
            timer: None,
        });
        tracked.entry.directory = directory;

        if let Some(previous) = tracked.timer.take() {
            previous.handle.abort();
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let delete_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        tracked.entry.delete_at = Some(delete_at);

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let timer_job = job_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                CleanupRegistry { inner }.fire(&timer_job, generation).await;
            }
        });
        tracked.timer = Some(Timer { generation, handle });

        metrics::set_cleanup_tracked(self.len());
        info!(
            job_id = %job_id,
            delay_secs = delay.as_secs(),
            delete_at = %delete_at,
            "Armed deferred cleanup"
        );
        delete_at
    }

    /// Timer callback. A stale generation means the timer was replaced or
    /// the entry already deleted, and the call does nothing.
    async fn fire(&self, job_id: &JobId, generation: u64) -> DeleteOutcome {
        let Some((slot, mut guard)) = self.lock_slot(job_id).await else {
            return DeleteOutcome::NotTracked;
        };

        let is_live = guard
            .as_ref()
            .and_then(|t| t.timer.as_ref())
            .map(|t| t.generation == generation)
            .unwrap_or(false);
        if !is_live {
            debug!(job_id = %job_id, generation, "Ignoring stale cleanup timer");
            return DeleteOutcome::NotTracked;
        }

        // This task is the timer; detach rather than abort it.
        if let Some(tracked) = guard.as_mut() {
            tracked.timer = None;
        }
        self.delete_locked(job_id, &slot, &mut guard, CleanupReason::Deferred)
            .await
    }

    /// Delete the job's directory now. A no-op when the job is not tracked.
    pub async fn delete_now(&self, job_id: &JobId) -> DeleteOutcome {
        self.remove(job_id, CleanupReason::Manual).await
    }

    /// Cancel any pending timer and delete the job's directory now.
    pub async fn cancel_and_delete_now(&self, job_id: &JobId) -> DeleteOutcome {
        self.remove(job_id, CleanupReason::Forced).await
    }

    async fn remove(&self, job_id: &JobId, reason: CleanupReason) -> DeleteOutcome {
        let Some((slot, mut guard)) = self.lock_slot(job_id).await else {
            debug!(job_id = %job_id, reason = reason.as_str(), "Nothing to clean up");
            return DeleteOutcome::NotTracked;
        };
        self.delete_locked(job_id, &slot, &mut guard, reason).await
    }

    async fn delete_locked(
        &self,
        job_id: &JobId,
        slot: &Slot,
        guard: &mut OwnedMutexGuard<Option<Tracked>>,
        reason: CleanupReason,
    ) -> DeleteOutcome {
        let Some(tracked) = guard.take() else {
            self.forget(job_id, slot);
            return DeleteOutcome::NotTracked;
        };

        if let Some(timer) = tracked.timer {
            timer.handle.abort();
        }
        self.forget(job_id, slot);

        let directory = tracked.entry.directory;
        match remove_tree(&directory).await {
            Ok(outcome) => {
                metrics::record_cleanup_deleted(reason.as_str());
                info!(
                    job_id = %job_id,
                    reason = reason.as_str(),
                    directory = %directory.display(),
                    ?outcome,
                    "Cleaned up job directory"
                );
                DeleteOutcome::Deleted(outcome)
            }
            Err(e) => {
                metrics::record_cleanup_failed(reason.as_str());
                error!(
                    job_id = %job_id,
                    reason = reason.as_str(),
                    directory = %directory.display(),
                    "Failed to clean up job directory: {}",
                    e
                );
                DeleteOutcome::Failed
            }
        }
    }

    /// Whether the job currently has an entry.
    pub fn is_tracked(&self, job_id: &JobId) -> bool {
        self.map().contains_key(job_id)
    }

    /// Number of slots in the map.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of current entries, for diagnostics.
    pub async fn active_entries(&self) -> Vec<CleanupEntry> {
        let slots: Vec<Slot> = self.map().values().cloned().collect();
        let mut entries = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(tracked) = slot.lock().await.as_ref() {
                entries.push(tracked.entry.clone());
            }
        }
        entries.sort_by(|a, b| a.registered_at.cmp(&b.registered_at));
        entries
    }

    /// Delete job directories under `root` that are older than `max_age`
    /// and not tracked by this registry.
    ///
    /// Only directories named like a job id are considered. Age is measured
    /// from the directory's modification time.
    pub async fn sweep(&self, root: &Path, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();

        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(root = %root.display(), "Cleanup sweep cannot read root: {}", e);
                return report;
            }
        };

        let now = SystemTime::now();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(root = %root.display(), "Cleanup sweep stopped early: {}", e);
                    break;
                }
            };

            let Some(job_id) = entry.file_name().to_str().and_then(JobId::parse) else {
                continue;
            };
            let Ok(meta) = tokio::fs::symlink_metadata(entry.path()).await else {
                continue;
            };
            if !meta.is_dir() {
                continue;
            }
            report.scanned += 1;

            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                report.skipped_young += 1;
                continue;
            }

            match self.sweep_one(&job_id, &entry.path()).await {
                SweepResult::Deleted => report.deleted += 1,
                SweepResult::Tracked => report.skipped_tracked += 1,
                SweepResult::Failed => report.failed += 1,
            }
        }

        if report.deleted > 0 || report.failed > 0 {
            info!(
                root = %root.display(),
                scanned = report.scanned,
                deleted = report.deleted,
                failed = report.failed,
                "Cleanup sweep finished"
            );
        } else {
            debug!(root = %root.display(), scanned = report.scanned, "Cleanup sweep found nothing");
        }
        report
    }

    async fn sweep_one(&self, job_id: &JobId, directory: &Path) -> SweepResult {
        // Claim the key so no other operation on this job interleaves.
        let (slot, guard) = self.lock_or_insert(job_id).await;
        if guard.is_some() {
            return SweepResult::Tracked;
        }

        let result = match remove_tree(directory).await {
            Ok(_) => {
                metrics::record_cleanup_deleted(CleanupReason::Sweep.as_str());
                info!(job_id = %job_id, directory = %directory.display(), "Swept orphaned job directory");
                SweepResult::Deleted
            }
            Err(e) => {
                metrics::record_cleanup_failed(CleanupReason::Sweep.as_str());
                error!(job_id = %job_id, directory = %directory.display(), "Sweep failed: {}", e);
                SweepResult::Failed
            }
        };

        self.forget(job_id, &slot);
        drop(guard);
        result
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `shutdown` flips to
    /// `true` or its sender is dropped. The first pass runs immediately.
    pub fn spawn_sweeper(
        &self,
        root: PathBuf,
        interval: Duration,
        max_age: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            info!(
                root = %root.display(),
                interval_secs = interval.as_secs(),
                max_age_secs = max_age.as_secs(),
                "Starting cleanup sweeper"
            );
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        registry.sweep(&root, max_age).await;
                    }
                }
            }
            info!("Cleanup sweeper stopped");
        })
    }
}

enum SweepResult {
    Deleted,
    Tracked,
    Failed,
}
