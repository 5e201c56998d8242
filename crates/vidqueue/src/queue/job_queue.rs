//! Job queue: the single source of truth for job state.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Utc};

use crate::config::QueueConfig;
use crate::events::{JobEvent, JobEventBroadcaster};
use crate::job::{GenerationParams, JobRecord, JobStatus, StatusUpdate};
use crate::store::{JsonFileStore, MemoryStore, PersistentStore};
use crate::topic::TopicCandidate;

use super::report::{
    CleanupStats, CompletedVideo, ProcessingJob, QueueStatus, QueuedJob, StatusCounts,
};

const INTERRUPTED_ERROR: &str = "interrupted by process restart";
const MAX_CLEANUP_HOURS: i64 = 24 * 365 * 100;

struct QueueState {
    jobs: HashMap<String, JobRecord>,
    videos: HashMap<String, String>,
    next_sequence: u64,
    persistence_warning: Option<String>,
    /// Jobs failed as interrupted before a broadcaster was attached.
    unannounced: Vec<String>,
}

impl QueueState {
    fn count(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|j| j.status == status).count()
    }

    /// Oldest queued job by creation time, then insertion order.
    fn oldest_queued_id(&self) -> Option<String> {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .min_by(|a, b| {
                a.fifo_key()
                    .cmp(&b.fifo_key())
                    .then_with(|| a.job_id.cmp(&b.job_id))
            })
            .map(|j| j.job_id.clone())
    }

    fn queued_in_fifo_order(&self) -> Vec<&JobRecord> {
        let mut queued: Vec<&JobRecord> = self
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .collect();
        queued.sort_by(|a, b| {
            a.fifo_key()
                .cmp(&b.fifo_key())
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        queued
    }
}

/// Persistent job queue shared by workers and external callers.
///
/// Every read and write of the job table and the video mapping happens under
/// one mutex, and every mutation is written through to the store before the
/// lock is released. Construct one per process and share it behind an `Arc`.
pub struct JobQueue {
    state: Mutex<QueueState>,
    store: Arc<dyn PersistentStore>,
    config: QueueConfig,
    events: Option<JobEventBroadcaster>,
    /// False when the store could not be loaded; its contents are then
    /// unknown and must not be replaced.
    write_through: bool,
}

impl JobQueue {
    /// Opens the queue backed by the JSON files named in `config`.
    pub fn from_config(config: QueueConfig) -> Self {
        let store = JsonFileStore::new(config.jobs_path(), config.mapping_path());
        Self::with_store(config, Arc::new(store))
    }

    /// Queue without durable storage.
    pub fn in_memory(config: QueueConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Loads existing state from `store` and takes ownership of its writes.
    ///
    /// If the store cannot be loaded at all the queue starts empty with
    /// write-through disabled, so the unread state is never overwritten.
    pub fn with_store(config: QueueConfig, store: Arc<dyn PersistentStore>) -> Self {
        let (snapshot, persistence_warning, write_through) = match store.load() {
            Ok(snapshot) => {
                let warning = (!snapshot.warnings.is_empty()).then(|| snapshot.warnings.join("; "));
                (snapshot, warning, true)
            }
            Err(e) => {
                log::error!(
                    "Failed to load job queue state, starting empty without persistence: {}",
                    e
                );
                (Default::default(), Some(e.to_string()), false)
            }
        };

        let next_sequence = snapshot
            .jobs
            .values()
            .map(|j| j.sequence)
            .max()
            .map_or(1, |max| max + 1);

        let queue = Self {
            state: Mutex::new(QueueState {
                jobs: snapshot.jobs,
                videos: snapshot.videos,
                next_sequence,
                persistence_warning,
                unannounced: Vec::new(),
            }),
            store,
            config,
            events: None,
            write_through,
        };

        queue.reconcile_interrupted();

        let state = queue.lock();
        log::info!(
            "Job queue initialized with {} existing jobs ({} queued, {} processing)",
            state.jobs.len(),
            state.count(JobStatus::Queued),
            state.count(JobStatus::Processing)
        );
        drop(state);

        queue
    }

    /// Publishes a [`JobEvent`] for every applied change, starting with the
    /// jobs failed as interrupted while loading.
    pub fn with_events(mut self, events: JobEventBroadcaster) -> Self {
        self.events = Some(events);
        {
            let mut state = self.lock();
            for job_id in std::mem::take(&mut state.unannounced) {
                if let Some(job) = state.jobs.get(&job_id) {
                    self.publish(job);
                }
            }
        }
        self
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.config.max_concurrent_jobs
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job queue lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Writes the full snapshot. Failures are logged and remembered; the
    /// in-memory state stays authoritative.
    fn persist(&self, state: &mut QueueState) {
        if !self.write_through {
            return;
        }
        match self.store.save(&state.jobs, &state.videos) {
            Ok(()) => {
                if state.persistence_warning.take().is_some() {
                    log::info!("Job queue persistence recovered");
                }
            }
            Err(e) => {
                log::error!("Failed to persist job queue: {}", e);
                state.persistence_warning = Some(e.to_string());
            }
        }
    }

    fn publish(&self, job: &JobRecord) {
        if let Some(events) = &self.events {
            events.send(JobEvent::from_record(job));
        }
    }

    fn reconcile_interrupted(&self) {
        let mut state = self.lock();
        let interrupted: Vec<String> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .map(|j| j.job_id.clone())
            .collect();

        if interrupted.is_empty() {
            return;
        }

        if !self.config.fail_interrupted_on_load {
            log::warn!(
                "{} job(s) were processing when the previous process stopped; they stay processing",
                interrupted.len()
            );
            return;
        }

        let now = Utc::now();
        for job_id in &interrupted {
            if let Some(job) = state.jobs.get_mut(job_id) {
                job.apply(
                    JobStatus::Failed,
                    StatusUpdate::new()
                        .message("Job interrupted")
                        .error(INTERRUPTED_ERROR),
                    now,
                );
            }
        }
        log::warn!(
            "Marked {} interrupted job(s) as failed",
            interrupted.len()
        );
        state.unannounced = interrupted;
        self.persist(&mut state);
    }

    /// Adds a queued job and returns its id.
    pub fn add_job(&self, topic: &str, domain: &str, params: GenerationParams) -> String {
        let mut state = self.lock();
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        let job = JobRecord::new(sequence, topic, domain, params);
        let job_id = job.job_id.clone();
        self.publish(&job);
        state.jobs.insert(job_id.clone(), job);
        self.persist(&mut state);

        log::info!("Added job {}: {}", job_id, topic);
        job_id
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobRecord> {
        self.lock().jobs.get(job_id).cloned()
    }

    /// Returns the oldest queued job without changing it, or `None` when the
    /// queue is empty or `max_concurrent_jobs` jobs are already processing.
    ///
    /// Callers that go on to claim the job race with each other; workers use
    /// [`JobQueue::claim_next_job`] instead.
    pub fn get_next_job(&self) -> Option<JobRecord> {
        let state = self.lock();
        if state.count(JobStatus::Processing) >= self.config.max_concurrent_jobs {
            return None;
        }
        let job_id = state.oldest_queued_id()?;
        state.jobs.get(&job_id).cloned()
    }

    /// Selects the oldest queued job and moves it to processing in one
    /// critical section, so two workers never receive the same job.
    pub fn claim_next_job(&self, worker_id: &str) -> Option<JobRecord> {
        let mut state = self.lock();
        if state.count(JobStatus::Processing) >= self.config.max_concurrent_jobs {
            return None;
        }
        let job_id = state.oldest_queued_id()?;

        let claimed = {
            let job = state.jobs.get_mut(&job_id)?;
            let applied = job.apply(
                JobStatus::Processing,
                StatusUpdate::new()
                    .progress(0.0)
                    .message(format!("Starting video generation (Worker: {})", worker_id)),
                Utc::now(),
            );
            applied.then(|| job.clone())
        }?;

        self.publish(&claimed);
        self.persist(&mut state);
        log::debug!("Worker {} claimed job {}", worker_id, job_id);
        Some(claimed)
    }

    /// Applies a status transition. Returns false for unknown jobs and for
    /// transitions the state machine does not allow.
    pub fn update_job_status(&self, job_id: &str, status: JobStatus, update: StatusUpdate) -> bool {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(job_id) else {
            return false;
        };

        let from = job.status;
        if !job.apply(status, update, Utc::now()) {
            log::warn!(
                "Rejected transition {} -> {} for job {}",
                from,
                status,
                job_id
            );
            return false;
        }
        let job = job.clone();

        self.publish(&job);
        self.persist(&mut state);
        true
    }

    /// Records the artifact produced for `job_id`.
    pub fn map_job_to_video(&self, job_id: &str, video_path: &str) {
        let mut state = self.lock();
        state
            .videos
            .insert(job_id.to_string(), video_path.to_string());
        self.persist(&mut state);
        log::info!("Mapped job {} to video: {}", job_id, video_path);
    }

    pub fn get_video_for_job(&self, job_id: &str) -> Option<String> {
        self.lock().videos.get(job_id).cloned()
    }

    /// Drops the artifact mapping while keeping the job record.
    pub fn remove_video_mapping(&self, job_id: &str) -> bool {
        let mut state = self.lock();
        if state.videos.remove(job_id).is_none() {
            return false;
        }
        self.persist(&mut state);
        true
    }

    /// Cancels a job that has not been claimed yet.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        let mut state = self.lock();
        let Some(job) = state.jobs.get_mut(job_id) else {
            return false;
        };
        if job.status != JobStatus::Queued {
            return false;
        }

        job.apply(
            JobStatus::Cancelled,
            StatusUpdate::new().message("Job cancelled by user"),
            Utc::now(),
        );
        let job = job.clone();

        self.publish(&job);
        self.persist(&mut state);
        log::info!("Cancelled job {}", job_id);
        true
    }

    pub fn queued_count(&self) -> usize {
        self.lock().count(JobStatus::Queued)
    }

    pub fn processing_count(&self) -> usize {
        self.lock().count(JobStatus::Processing)
    }

    /// Last persistence error, cleared by the next successful save.
    pub fn persistence_warning(&self) -> Option<String> {
        self.lock().persistence_warning.clone()
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        let state = self.lock();

        let mut by_status = StatusCounts::default();
        let mut by_domain: BTreeMap<String, usize> = BTreeMap::new();
        for job in state.jobs.values() {
            by_status.increment(job.status);
            *by_domain.entry(job.domain.clone()).or_insert(0) += 1;
        }

        let mut processing_jobs: Vec<ProcessingJob> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Processing)
            .map(|j| ProcessingJob {
                job_id: j.job_id.clone(),
                topic: j.topic.clone(),
                domain: j.domain.clone(),
                progress: j.progress,
                message: j.message.clone(),
                started_at: j.started_at,
            })
            .collect();
        processing_jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));

        let next_jobs = state
            .queued_in_fifo_order()
            .into_iter()
            .take(self.config.next_jobs_preview)
            .map(|j| QueuedJob {
                job_id: j.job_id.clone(),
                topic: j.topic.clone(),
                domain: j.domain.clone(),
                created_at: j.created_at,
            })
            .collect();

        let completed_videos = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Completed && state.videos.contains_key(&j.job_id))
            .count();

        QueueStatus {
            total_jobs: state.jobs.len(),
            by_status,
            by_domain,
            processing_jobs,
            next_jobs,
            completed_videos,
            max_concurrent_jobs: self.config.max_concurrent_jobs,
            persistence_warning: state.persistence_warning.clone(),
        }
    }

    /// Completed jobs with an artifact mapping, newest completion first.
    pub fn get_completed_jobs_with_videos(&self, limit: usize) -> Vec<CompletedVideo> {
        let mut completed: Vec<CompletedVideo> = {
            let state = self.lock();
            state
                .jobs
                .values()
                .filter(|j| j.status == JobStatus::Completed)
                .filter_map(|j| {
                    state.videos.get(&j.job_id).map(|path| CompletedVideo {
                        job_id: j.job_id.clone(),
                        topic: j.topic.clone(),
                        domain: j.domain.clone(),
                        created_at: j.created_at,
                        completed_at: j.completed_at,
                        video_path: path.clone(),
                        video_exists: false,
                        result: j.result.clone(),
                    })
                })
                .collect()
        };

        completed.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        completed.truncate(limit);

        // File checks run outside the lock.
        for video in &mut completed {
            video.video_exists =
                !video.video_path.is_empty() && Path::new(&video.video_path).exists();
        }

        completed
    }

    /// Removes terminal jobs (and their mappings) completed more than
    /// `max_age` ago. Queued and processing jobs are never removed.
    /// `None` uses the configured `auto_cleanup_hours`.
    pub fn cleanup_old_jobs(&self, max_age: Option<Duration>) -> CleanupStats {
        let max_age = max_age.unwrap_or_else(|| {
            let hours = i64::try_from(self.config.auto_cleanup_hours)
                .unwrap_or(MAX_CLEANUP_HOURS)
                .min(MAX_CLEANUP_HOURS);
            Duration::hours(hours)
        });
        let mut stats = CleanupStats {
            cutoff_hours: max_age.num_hours(),
            ..Default::default()
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return stats;
        };

        let mut state = self.lock();
        let expired: Vec<String> = state
            .jobs
            .values()
            .filter(|j| j.is_finished())
            .filter(|j| j.completed_at.is_some_and(|at| at < cutoff))
            .map(|j| j.job_id.clone())
            .collect();

        for job_id in &expired {
            state.jobs.remove(job_id);
            stats.jobs_removed += 1;
            if state.videos.remove(job_id).is_some() {
                stats.video_mappings_removed += 1;
            }
        }

        if stats.jobs_removed > 0 {
            self.persist(&mut state);
            log::info!("Cleaned up {} old jobs", stats.jobs_removed);
        }

        stats
    }

    /// Adds a job for every unused candidate. Marking candidates as used is
    /// left to the topic source. Returns the number of jobs created per domain.
    pub fn bulk_add_jobs_from_topics(
        &self,
        topics_by_domain: &BTreeMap<String, Vec<TopicCandidate>>,
    ) -> BTreeMap<String, usize> {
        let mut added = BTreeMap::new();

        for (domain, candidates) in topics_by_domain {
            let mut count = 0;
            for candidate in candidates.iter().filter(|c| !c.used) {
                self.add_job(
                    &candidate.topic,
                    domain,
                    GenerationParams::for_domain(domain),
                );
                count += 1;
            }
            if count > 0 {
                log::info!("Added {} jobs for domain '{}'", count, domain);
            }
            added.insert(domain.clone(), count);
        }

        added
    }

    /// Jobs of one domain, newest first, optionally filtered by status.
    pub fn get_jobs_by_domain(&self, domain: &str, status: Option<JobStatus>) -> Vec<JobRecord> {
        let state = self.lock();
        let mut jobs: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|j| j.domain == domain)
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.fifo_key().cmp(&a.fifo_key()));
        jobs
    }

    /// All jobs, newest first, optionally filtered by status.
    pub fn list_jobs(&self, status: Option<JobStatus>) -> Vec<JobRecord> {
        let state = self.lock();
        let mut jobs: Vec<JobRecord> = state
            .jobs
            .values()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.fifo_key().cmp(&a.fifo_key()));
        jobs
    }
}
