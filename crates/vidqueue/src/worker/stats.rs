use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cumulative counters for one worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerStats {
    /// Jobs claimed, whatever their outcome.
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Live view of the job a worker is producing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentJob {
    pub job_id: String,
    pub topic: String,
    pub domain: String,
    pub progress: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub is_running: bool,
    pub refill_capable: bool,
    pub current_job: Option<CurrentJob>,
    pub stats: WorkerStats,
}
