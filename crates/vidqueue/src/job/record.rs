use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::JobStatus;

/// Parameters forwarded untouched to the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub script_length: String,
    pub voice: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub img_style_prompt: String,
    pub include_dialogs: bool,
    pub use_different_voices: bool,
    pub add_captions: bool,
    pub add_title_card: bool,
    pub add_end_card: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            script_length: "medium".to_string(),
            voice: "alloy".to_string(),
            width: 1024,
            height: 576,
            fps: 24,
            img_style_prompt: "cinematic, professional".to_string(),
            include_dialogs: true,
            use_different_voices: true,
            add_captions: true,
            add_title_card: true,
            add_end_card: true,
        }
    }
}

impl GenerationParams {
    /// Parameters used for jobs created from topic refills.
    pub fn for_domain(domain: &str) -> Self {
        Self {
            img_style_prompt: format!("professional, {}-themed, high quality", domain),
            ..Self::default()
        }
    }
}

/// Optional fields applied together with a status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }
}

/// One requested unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier, immutable once assigned.
    pub job_id: String,
    /// Insertion order, used to break creation-time ties.
    #[serde(default)]
    pub sequence: u64,
    pub topic: String,
    /// Grouping tag. Never interpreted by the queue.
    pub domain: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque payload returned by the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(flatten)]
    pub params: GenerationParams,
}

impl JobRecord {
    /// Creates a queued job with a fresh identifier.
    pub fn new(
        sequence: u64,
        topic: impl Into<String>,
        domain: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            sequence,
            topic: topic.into(),
            domain: domain.into(),
            status: JobStatus::Queued,
            progress: 0.0,
            message: String::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            params,
        }
    }

    /// Applies `to` if the state machine allows it. A rejected transition
    /// leaves the record untouched.
    pub fn apply(&mut self, to: JobStatus, update: StatusUpdate, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(to) {
            return false;
        }

        self.status = to;

        if let Some(progress) = update.progress.filter(|p| p.is_finite()) {
            self.progress = progress.clamp(0.0, 1.0);
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
        if let Some(result) = update.result {
            self.result = Some(result);
        }

        if to == JobStatus::Processing && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }

        true
    }

    /// Returns true once the job reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// FIFO ordering key: creation time, then insertion order.
    pub fn fifo_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}
