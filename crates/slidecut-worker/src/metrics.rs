//! Job and cleanup metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder that exports them.

use metrics::{counter, gauge, histogram};

use crate::error::FailureKind;
use slidecut_models::JobStage;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "slidecut_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "slidecut_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "slidecut_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "slidecut_job_duration_seconds";
    pub const JOBS_IN_FLIGHT: &str = "slidecut_jobs_in_flight";

    pub const CLEANUP_DELETED_TOTAL: &str = "slidecut_cleanup_deleted_total";
    pub const CLEANUP_FAILED_TOTAL: &str = "slidecut_cleanup_failed_total";
    pub const CLEANUP_TRACKED: &str = "slidecut_cleanup_tracked";
}

pub fn record_job_started() {
    counter!(names::JOBS_STARTED_TOTAL).increment(1);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "completed").record(duration_secs);
}

pub fn record_job_failed(stage: JobStage, kind: FailureKind, duration_secs: f64) {
    let labels = [
        ("stage", stage.as_str().to_string()),
        ("kind", kind.as_str().to_string()),
    ];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "failed").record(duration_secs);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

/// Record a directory removal. `reason` is one of `deferred`, `forced`,
/// `manual` or `sweep`.
pub fn record_cleanup_deleted(reason: &'static str) {
    counter!(names::CLEANUP_DELETED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_cleanup_failed(reason: &'static str) {
    counter!(names::CLEANUP_FAILED_TOTAL, "reason" => reason).increment(1);
}

pub fn set_cleanup_tracked(count: usize) {
    gauge!(names::CLEANUP_TRACKED).set(count as f64);
}
