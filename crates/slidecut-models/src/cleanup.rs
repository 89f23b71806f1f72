//! Cleanup registry entries.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::JobId;

/// A job directory tracked for deletion.
///
/// Present from the moment the directory is created until it is removed.
/// `delete_at` is set once deferred deletion has been armed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CleanupEntry {
    pub job_id: JobId,
    pub directory: PathBuf,
    pub registered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_at: Option<DateTime<Utc>>,
}

impl CleanupEntry {
    pub fn new(job_id: JobId, directory: impl Into<PathBuf>) -> Self {
        Self {
            job_id,
            directory: directory.into(),
            registered_at: Utc::now(),
            delete_at: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.delete_at.is_some()
    }
}
