//! Read-only aggregates returned by the queue for dashboards and CLIs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::job::JobStatus;

/// Job counts per status. Every status is always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn get(&self, status: JobStatus) -> usize {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Processing => self.processing,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    pub(crate) fn increment(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
    }
}

/// A job currently held by a worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingJob {
    pub job_id: String,
    pub topic: String,
    pub domain: String,
    pub progress: f64,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
}

/// A job waiting to be claimed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedJob {
    pub job_id: String,
    pub topic: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatus {
    pub total_jobs: usize,
    pub by_status: StatusCounts,
    pub by_domain: BTreeMap<String, usize>,
    pub processing_jobs: Vec<ProcessingJob>,
    /// Oldest queued jobs, in the order workers will claim them.
    pub next_jobs: Vec<QueuedJob>,
    /// Completed jobs that have an artifact mapping.
    pub completed_videos: usize,
    pub max_concurrent_jobs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_warning: Option<String>,
}

/// A completed job together with its artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedVideo {
    pub job_id: String,
    pub topic: String,
    pub domain: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub video_path: String,
    /// False when the mapped file is no longer on disk.
    pub video_exists: bool,
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub jobs_removed: usize,
    pub video_mappings_removed: usize,
    pub cutoff_hours: i64,
}
