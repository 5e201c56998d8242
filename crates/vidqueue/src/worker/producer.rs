//! The external collaborator that turns a job into an artifact.

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;
use crate::job::JobRecord;

/// Result of one `produce` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProduceOutcome {
    pub success: bool,
    /// File or URI of the finished video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
    /// Opaque payload stored on the job as `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProduceOutcome {
    pub fn succeeded(artifact_path: impl Into<String>) -> Self {
        Self {
            success: true,
            artifact_path: Some(artifact_path.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }
}

/// Receives intermediate progress while a producer runs.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: f64, message: &str);
}

/// Discards progress updates.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _progress: f64, _message: &str) {}
}

/// Generates the artifact for one job.
///
/// Calls may block for minutes. The core never retries a call; an `Err`, a
/// failed outcome, or a panic all mark the job as failed.
pub trait Producer: Send + Sync {
    fn produce(
        &self,
        job: &JobRecord,
        progress: &dyn ProgressSink,
    ) -> Result<ProduceOutcome, WorkerError>;
}

impl<F> Producer for F
where
    F: Fn(&JobRecord, &dyn ProgressSink) -> Result<ProduceOutcome, WorkerError> + Send + Sync,
{
    fn produce(
        &self,
        job: &JobRecord,
        progress: &dyn ProgressSink,
    ) -> Result<ProduceOutcome, WorkerError> {
        self(job, progress)
    }
}
