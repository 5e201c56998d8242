//! Isolated environment for queue and workforce tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use vidqueue::config::{QueueConfig, WorkerConfig};
use vidqueue::{JobQueue, JsonFileStore};

/// Temp directory holding the store files and produced videos.
pub struct TestHarness {
    temp_dir: TempDir,
    /// Directory for `job_queue.json` and `job_video_mapping.json`.
    pub data_dir: PathBuf,
    /// Where scripted producers write their artifacts.
    pub videos_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().join("data");
        let videos_dir = temp_dir.path().join("videos");
        std::fs::create_dir_all(&videos_dir).expect("Failed to create videos dir");

        Self {
            temp_dir,
            data_dir,
            videos_dir,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            data_dir: self.data_dir.clone(),
            ..QueueConfig::default()
        }
    }

    /// Worker settings with millisecond polling.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            poll_interval_ms: 10,
            stop_timeout_ms: 5_000,
            ..WorkerConfig::default()
        }
    }

    /// Opens (or reopens) the persistent queue in this harness.
    pub fn open_queue(&self) -> Arc<JobQueue> {
        Arc::new(JobQueue::from_config(self.queue_config()))
    }

    pub fn open_queue_with(&self, config: QueueConfig) -> Arc<JobQueue> {
        Arc::new(JobQueue::from_config(config))
    }

    pub fn store(&self) -> JsonFileStore {
        let config = self.queue_config();
        JsonFileStore::new(config.jobs_path(), config.mapping_path())
    }

    pub fn jobs_path(&self) -> PathBuf {
        self.queue_config().jobs_path()
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.queue_config().mapping_path()
    }

    pub fn write_video(&self, name: &str) -> PathBuf {
        let path = self.videos_dir.join(name);
        std::fs::write(&path, b"fake mp4").expect("Failed to write video");
        path
    }

    pub fn read_jobs_json(&self) -> serde_json::Value {
        let content = std::fs::read_to_string(self.jobs_path()).expect("Failed to read jobs file");
        serde_json::from_str(&content).expect("Jobs file is not JSON")
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
