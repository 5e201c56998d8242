pub mod job_queue;
pub mod report;

pub use job_queue::JobQueue;
pub use report::{CleanupStats, CompletedVideo, ProcessingJob, QueueStatus, QueuedJob, StatusCounts};
