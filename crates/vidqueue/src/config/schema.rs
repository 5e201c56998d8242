use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::topic::TopicCandidate;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub workforce: WorkforceConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Candidates for the refill worker's topic source.
    #[serde(default)]
    pub topics: Vec<TopicCandidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Directory holding both store files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_jobs_file")]
    pub jobs_file: String,
    #[serde(default = "default_mapping_file")]
    pub mapping_file: String,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_auto_cleanup_hours")]
    pub auto_cleanup_hours: u64,
    /// How many queued jobs the status summary previews.
    #[serde(default = "default_next_jobs_preview")]
    pub next_jobs_preview: usize,
    /// Fail jobs that were still processing when the previous process exited.
    #[serde(default)]
    pub fail_interrupted_on_load: bool,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("vidqueue"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_jobs_file() -> String {
    "job_queue.json".to_string()
}

fn default_mapping_file() -> String {
    "job_video_mapping.json".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_auto_cleanup_hours() -> u64 {
    24
}

fn default_next_jobs_preview() -> usize {
    5
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            jobs_file: default_jobs_file(),
            mapping_file: default_mapping_file(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            auto_cleanup_hours: default_auto_cleanup_hours(),
            next_jobs_preview: default_next_jobs_preview(),
            fail_interrupted_on_load: false,
        }
    }
}

impl QueueConfig {
    pub fn jobs_path(&self) -> PathBuf {
        self.data_dir.join(&self.jobs_file)
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.data_dir.join(&self.mapping_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Sleep between polls when no job can be claimed.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// The refill-capable worker refills when fewer jobs than this are queued.
    #[serde(default = "default_refill_low_water_mark")]
    pub refill_low_water_mark: usize,
    /// Candidates requested per domain on each refill.
    #[serde(default = "default_refill_batch_size")]
    pub refill_batch_size: usize,
    #[serde(default = "default_refill_domains")]
    pub refill_domains: Vec<String>,
    /// How long `stop` waits for a worker loop before detaching it.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_refill_low_water_mark() -> usize {
    5
}

fn default_refill_batch_size() -> usize {
    3
}

fn default_refill_domains() -> Vec<String> {
    ["indian_mythology", "technology", "science", "history", "health"]
        .iter()
        .map(|d| d.to_string())
        .collect()
}

fn default_stop_timeout_ms() -> u64 {
    30_000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            refill_low_water_mark: default_refill_low_water_mark(),
            refill_batch_size: default_refill_batch_size(),
            refill_domains: default_refill_domains(),
            stop_timeout_ms: default_stop_timeout_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkforceConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

fn default_worker_count() -> usize {
    1
}

impl Default for WorkforceConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
        }
    }
}

/// External generator invoked by the binary's command producer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProducerConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directives, overridden by `RUST_LOG` when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "vidqueue=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_log_filter(),
        }
    }
}
