use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, info_span, warn};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::job::{JobRecord, JobStatus, StatusUpdate};
use crate::logging::JobLogger;
use crate::queue::JobQueue;
use crate::topic::{group_by_domain, TopicSource};

use super::producer::{ProduceOutcome, Producer, ProgressSink};
use super::stats::{CurrentJob, WorkerStats, WorkerStatus};

/// What one pass of the worker loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Completed(String),
    Failed(String),
    /// Nothing to claim; the refill added this many jobs.
    Refilled(usize),
    Idle,
}

#[derive(Default)]
struct WorkerState {
    stats: WorkerStats,
    current_job_id: Option<String>,
}

/// Everything the loop thread needs. Cheap to clone.
#[derive(Clone)]
struct WorkerCore {
    id: String,
    queue: Arc<JobQueue>,
    producer: Arc<dyn Producer>,
    topics: Option<Arc<dyn TopicSource>>,
    config: WorkerConfig,
    state: Arc<Mutex<WorkerState>>,
}

/// Handle to a running loop thread.
pub(crate) struct RunningLoop {
    thread: JoinHandle<()>,
    done: Receiver<()>,
    shutdown: Arc<AtomicBool>,
    wake: Sender<()>,
}

/// Drains the shared queue on its own thread.
pub struct Worker {
    core: WorkerCore,
    running: Mutex<Option<RunningLoop>>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<JobQueue>,
        producer: Arc<dyn Producer>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            core: WorkerCore {
                id: id.into(),
                queue,
                producer,
                topics: None,
                config,
                state: Arc::new(Mutex::new(WorkerState::default())),
            },
            running: Mutex::new(None),
        }
    }

    /// Makes this worker refill the queue from `topics` when it runs low.
    pub fn with_refill(mut self, topics: Arc<dyn TopicSource>) -> Self {
        self.core.topics = Some(topics);
        self
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn is_refill_capable(&self) -> bool {
        self.core.topics.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|run| !run.shutdown.load(Ordering::SeqCst))
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Worker {} handle lock was poisoned, recovering", self.core.id);
                poisoned.into_inner()
            }
        }
    }

    /// Spawns the loop thread.
    pub fn start(&self) -> Result<(), WorkerError> {
        let mut running = self.lock_running();
        if running.is_some() {
            return Err(WorkerError::AlreadyRunning(self.core.id.clone()));
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        self.core.lock_state().stats.started_at = Some(Utc::now());

        let core = self.core.clone();
        let loop_shutdown = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name(self.core.id.clone())
            .spawn(move || {
                core.run(loop_shutdown, wake_rx);
                let _ = done_tx.send(());
            })
            .map_err(|e| WorkerError::SpawnFailed {
                worker_id: self.core.id.clone(),
                source: e,
            })?;

        *running = Some(RunningLoop {
            thread,
            done: done_rx,
            shutdown,
            wake: wake_tx,
        });
        info!(worker_id = %self.core.id, "Worker started");
        Ok(())
    }

    /// Signals the loop to exit after its current iteration. Returns the
    /// handle to wait on, or `None` if the worker was not running.
    pub(crate) fn signal_stop(&self) -> Option<RunningLoop> {
        let run = self.lock_running().take()?;
        info!(worker_id = %self.core.id, "Stopping worker");
        run.shutdown.store(true, Ordering::SeqCst);
        let _ = run.wake.try_send(());
        Some(run)
    }

    /// Waits up to `timeout` for the loop to exit. A loop still busy in a
    /// producer call after that is detached and finishes on its own.
    pub(crate) fn wait_stopped(&self, run: RunningLoop, timeout: Duration) -> bool {
        match run.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if run.thread.join().is_err() {
                    warn!(worker_id = %self.core.id, "Worker thread panicked");
                }
                info!(worker_id = %self.core.id, "Worker stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    worker_id = %self.core.id,
                    "Worker did not stop within {:?}, detaching", timeout
                );
                false
            }
        }
    }

    /// Stops the loop, waiting at most the configured stop timeout.
    /// Returns false if the loop had to be detached.
    pub fn stop(&self) -> bool {
        match self.signal_stop() {
            Some(run) => self.wait_stopped(run, self.core.config.stop_timeout()),
            None => true,
        }
    }

    /// Runs a single loop iteration on the calling thread.
    pub fn run_once(&self) -> Tick {
        self.core.tick()
    }

    pub fn stats(&self) -> WorkerStats {
        self.core.lock_state().stats.clone()
    }

    pub fn status(&self) -> WorkerStatus {
        let (current_job_id, stats) = {
            let state = self.core.lock_state();
            (state.current_job_id.clone(), state.stats.clone())
        };

        let current_job = current_job_id
            .and_then(|id| self.core.queue.get_job(&id))
            .map(|job| CurrentJob {
                job_id: job.job_id,
                topic: job.topic,
                domain: job.domain,
                progress: job.progress,
                message: job.message,
            });

        WorkerStatus {
            worker_id: self.core.id.clone(),
            is_running: self.is_running(),
            refill_capable: self.is_refill_capable(),
            current_job,
            stats,
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Never block in drop; the loop exits on its next check.
        let _ = self.signal_stop();
    }
}

impl WorkerCore {
    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Worker {} state lock was poisoned, recovering", self.id);
                poisoned.into_inner()
            }
        }
    }

    fn run(&self, shutdown: Arc<AtomicBool>, wake: Receiver<()>) {
        let span = info_span!("worker", worker_id = %self.id, refill = self.topics.is_some());
        let _guard = span.enter();
        debug!("Worker loop started");

        while !shutdown.load(Ordering::SeqCst) {
            match self.tick() {
                Tick::Completed(_) | Tick::Failed(_) => {}
                Tick::Refilled(_) | Tick::Idle => {
                    // Returns early when stop sends a wake-up.
                    let _ = wake.recv_timeout(self.config.poll_interval());
                }
            }
        }

        debug!("Worker loop ended");
    }

    fn tick(&self) -> Tick {
        if let Some(job) = self.queue.claim_next_job(&self.id) {
            return self.process(job);
        }

        match self.refill() {
            Some(added) => Tick::Refilled(added),
            None => Tick::Idle,
        }
    }

    fn process(&self, job: JobRecord) -> Tick {
        let logger = JobLogger::new(&job.job_id, &self.id);
        let _span = logger.span().entered();

        {
            let mut state = self.lock_state();
            state.current_job_id = Some(job.job_id.clone());
            state.stats.jobs_processed += 1;
            state.stats.last_activity = Some(Utc::now());
        }
        logger.log_start(&job.topic);

        let sink = QueueProgress {
            queue: &self.queue,
            logger: &logger,
        };
        let produced = panic::catch_unwind(AssertUnwindSafe(|| self.producer.produce(&job, &sink)));

        let succeeded = match produced {
            Ok(Ok(outcome)) if outcome.success => {
                self.complete(&job, outcome, &logger);
                true
            }
            Ok(Ok(outcome)) => {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "Unknown error occurred".to_string());
                self.fail(
                    &job,
                    format!("Video generation failed (Worker: {})", self.id),
                    error,
                    &logger,
                );
                false
            }
            Ok(Err(e)) => {
                self.fail(
                    &job,
                    format!("Processing error (Worker: {})", self.id),
                    e.to_string(),
                    &logger,
                );
                false
            }
            Err(payload) => {
                self.fail(
                    &job,
                    format!("Processing error (Worker: {})", self.id),
                    format!("producer panicked: {}", panic_message(payload.as_ref())),
                    &logger,
                );
                false
            }
        };

        let mut state = self.lock_state();
        state.current_job_id = None;
        state.stats.last_activity = Some(Utc::now());
        if succeeded {
            state.stats.jobs_completed += 1;
            Tick::Completed(job.job_id)
        } else {
            state.stats.jobs_failed += 1;
            Tick::Failed(job.job_id)
        }
    }

    fn complete(&self, job: &JobRecord, outcome: ProduceOutcome, logger: &JobLogger) {
        let mut update = StatusUpdate::new()
            .progress(1.0)
            .message(format!("Video generation completed (Worker: {})", self.id));
        if let Some(result) = outcome.result {
            update = update.result(result);
        }

        if !self
            .queue
            .update_job_status(&job.job_id, JobStatus::Completed, update)
        {
            logger.log_warning("completion was not recorded");
        }

        let artifact = outcome.artifact_path.filter(|path| !path.is_empty());
        if let Some(path) = &artifact {
            self.queue.map_job_to_video(&job.job_id, path);
        }
        logger.log_completion(artifact.as_deref());
    }

    fn fail(&self, job: &JobRecord, message: String, error: String, logger: &JobLogger) {
        logger.log_error(&error);
        let update = StatusUpdate::new().message(message).error(error);
        if !self
            .queue
            .update_job_status(&job.job_id, JobStatus::Failed, update)
        {
            logger.log_warning("failure was not recorded");
        }
    }

    /// Tops up the queue when this worker is refill-capable and the queue is
    /// below the low-water mark.
    fn refill(&self) -> Option<usize> {
        let topics = self.topics.as_ref()?;
        let queued = self.queue.queued_count();
        if queued >= self.config.refill_low_water_mark {
            return None;
        }

        info!(queued, "Queue is low, refilling from topic source");
        let fetched = panic::catch_unwind(AssertUnwindSafe(|| {
            topics.next_candidates(&self.config.refill_domains, self.config.refill_batch_size)
        }));
        let candidates = match fetched {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                warn!("Topic refill failed: {}", e);
                return None;
            }
            Err(payload) => {
                warn!("Topic source panicked: {}", panic_message(payload.as_ref()));
                return None;
            }
        };
        if candidates.is_empty() {
            debug!("Topic source had no new candidates");
            return Some(0);
        }

        let grouped = group_by_domain(candidates.clone());
        let added: usize = self.queue.bulk_add_jobs_from_topics(&grouped).values().sum();
        topics.mark_used(&candidates);

        info!(added, "Refilled queue");
        Some(added)
    }
}

/// Forwards producer progress to the queue as PROCESSING updates.
struct QueueProgress<'a> {
    queue: &'a JobQueue,
    logger: &'a JobLogger,
}

impl ProgressSink for QueueProgress<'_> {
    fn report(&self, progress: f64, message: &str) {
        self.logger.log_progress(progress, message);
        self.queue.update_job_status(
            self.logger.job_id(),
            JobStatus::Processing,
            StatusUpdate::new().progress(progress).message(message),
        );
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
