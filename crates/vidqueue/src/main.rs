use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use log::{error, info, warn};

use vidqueue::config::{load_config, validate_config, Config};
use vidqueue::error::ConfigError;
use vidqueue::logging::init_logging;
use vidqueue::{CommandProducer, JobQueue, StaticTopicSource, VidqueueError, WorkforceManager};

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

fn main() {
    if let Err(e) = run() {
        // Logging may not be up yet.
        eprintln!("vidqueue: {}", e);
        std::process::exit(1);
    }
}

fn config_path() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("VIDQUEUE_CONFIG").map(PathBuf::from))
}

fn run() -> vidqueue::Result<()> {
    let config = match config_path() {
        Some(path) => load_config(&path)?,
        None => {
            let config = Config::default();
            validate_config(&config)?;
            config
        }
    };

    init_logging(&config.logging)?;
    info!("Starting vidqueue v{}", env!("CARGO_PKG_VERSION"));

    let producer = CommandProducer::from_config(&config.producer).ok_or_else(|| {
        VidqueueError::from(ConfigError::Validation {
            message: "producer.command is required to run workers".to_string(),
        })
    })?;
    info!("Using producer command '{}'", producer.program());

    let queue = Arc::new(JobQueue::from_config(config.queue.clone()));
    info!(
        "Job queue open, at most {} jobs processing at once",
        queue.max_concurrent_jobs()
    );
    let cleaned = queue.cleanup_old_jobs(None);
    if cleaned.jobs_removed > 0 {
        info!(
            "Removed {} jobs older than {}h",
            cleaned.jobs_removed, cleaned.cutoff_hours
        );
    }

    let topics = Arc::new(StaticTopicSource::new(config.topics.clone()));
    let manager = WorkforceManager::new(Arc::clone(&queue), Arc::new(producer), config.worker.clone())
        .with_topic_source(topics);

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;

    manager.start(config.workforce.worker_count)?;

    loop {
        match shutdown_rx.recv_timeout(STATUS_INTERVAL) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let status = queue.get_queue_status();
                info!(
                    "Queue: {} queued, {} processing, {} completed, {} failed",
                    status.by_status.queued,
                    status.by_status.processing,
                    status.by_status.completed,
                    status.by_status.failed
                );
                if let Some(warning) = status.persistence_warning {
                    warn!("Job queue is not being persisted: {}", warning);
                }
            }
        }
    }

    info!("Received shutdown signal");
    if !manager.stop() {
        error!("Some workers did not stop in time; their jobs stay processing");
    }

    let totals = manager.status().totals;
    info!(
        "Shut down after {} jobs ({} completed, {} failed)",
        totals.jobs_processed, totals.jobs_completed, totals.jobs_failed
    );
    Ok(())
}
