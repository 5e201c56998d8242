//! The managed set of workers sharing one queue.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use log::{info, warn};
use serde::Serialize;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::queue::JobQueue;
use crate::topic::TopicSource;
use crate::worker::{Producer, Worker, WorkerStatus};

/// Counters summed over every worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkforceTotals {
    pub jobs_processed: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkforceStatus {
    pub is_running: bool,
    pub num_workers: usize,
    /// Keyed by worker id (`worker-1`, `worker-2`, ...).
    pub workers: BTreeMap<String, WorkerStatus>,
    pub totals: WorkforceTotals,
}

/// Owns a fixed-size pool of workers as one unit.
///
/// Create one per process and share it. `start` and `stop` are serialized;
/// `is_running` and `status` can be called from any thread at any time.
pub struct WorkforceManager {
    queue: Arc<JobQueue>,
    producer: Arc<dyn Producer>,
    topics: Option<Arc<dyn TopicSource>>,
    config: WorkerConfig,
    lifecycle: Mutex<()>,
    workers: Mutex<Vec<Arc<Worker>>>,
    running: AtomicBool,
}

fn recover<'a, T>(
    result: std::sync::LockResult<MutexGuard<'a, T>>,
    what: &str,
) -> MutexGuard<'a, T> {
    match result {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Workforce {} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

impl WorkforceManager {
    pub fn new(queue: Arc<JobQueue>, producer: Arc<dyn Producer>, config: WorkerConfig) -> Self {
        Self {
            queue,
            producer,
            topics: None,
            config,
            lifecycle: Mutex::new(()),
            workers: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Topic source handed to the single refill-capable worker.
    pub fn with_topic_source(mut self, topics: Arc<dyn TopicSource>) -> Self {
        self.topics = Some(topics);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts `num_workers` workers. Returns the current status unchanged if
    /// the workforce is already running.
    pub fn start(&self, num_workers: usize) -> Result<WorkforceStatus, WorkerError> {
        let _lifecycle = recover(self.lifecycle.lock(), "lifecycle");
        if self.is_running() {
            info!("Workforce already running");
            return Ok(self.status());
        }
        if num_workers == 0 {
            return Err(WorkerError::NoWorkers);
        }

        let workers: Vec<Arc<Worker>> = (0..num_workers)
            .map(|i| {
                let worker = Worker::new(
                    format!("worker-{}", i + 1),
                    Arc::clone(&self.queue),
                    Arc::clone(&self.producer),
                    self.config.clone(),
                );
                match (&self.topics, i) {
                    (Some(topics), 0) => Arc::new(worker.with_refill(Arc::clone(topics))),
                    _ => Arc::new(worker),
                }
            })
            .collect();

        for (started, worker) in workers.iter().enumerate() {
            if let Err(e) = worker.start() {
                warn!("Failed to start {}: {}", worker.id(), e);
                for earlier in &workers[..started] {
                    earlier.stop();
                }
                return Err(e);
            }
        }

        *recover(self.workers.lock(), "workers") = workers;
        self.running.store(true, Ordering::SeqCst);
        info!("Started {} workers", num_workers);

        Ok(self.status())
    }

    /// Stops every worker, waiting at most the configured stop timeout in
    /// total. Returns false if any worker had to be detached.
    ///
    /// Stopped workers stay listed in `status` until the next `start`.
    pub fn stop(&self) -> bool {
        let _lifecycle = recover(self.lifecycle.lock(), "lifecycle");
        if !self.running.swap(false, Ordering::SeqCst) {
            return true;
        }

        info!("Stopping all workers...");
        let workers: Vec<Arc<Worker>> = recover(self.workers.lock(), "workers").clone();

        let signalled: Vec<_> = workers
            .iter()
            .filter_map(|worker| worker.signal_stop().map(|run| (worker, run)))
            .collect();

        let deadline = Instant::now() + self.config.stop_timeout();
        let mut all_stopped = true;
        for (worker, run) in signalled {
            let remaining = deadline.saturating_duration_since(Instant::now());
            all_stopped &= worker.wait_stopped(run, remaining);
        }

        if all_stopped {
            info!("All workers stopped");
        } else {
            warn!("Some workers were still busy and have been detached");
        }
        all_stopped
    }

    pub fn status(&self) -> WorkforceStatus {
        let workers: Vec<Arc<Worker>> = recover(self.workers.lock(), "workers").clone();

        let mut totals = WorkforceTotals::default();
        let statuses: BTreeMap<String, WorkerStatus> = workers
            .iter()
            .map(|worker| {
                let status = worker.status();
                totals.jobs_processed += status.stats.jobs_processed;
                totals.jobs_completed += status.stats.jobs_completed;
                totals.jobs_failed += status.stats.jobs_failed;
                (status.worker_id.clone(), status)
            })
            .collect();

        WorkforceStatus {
            is_running: self.is_running(),
            num_workers: statuses.len(),
            workers: statuses,
            totals,
        }
    }
}

impl Drop for WorkforceManager {
    fn drop(&mut self) {
        if self.is_running() {
            for worker in recover(self.workers.lock(), "workers").iter() {
                let _ = worker.signal_stop();
            }
        }
    }
}
