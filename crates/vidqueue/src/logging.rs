//! Subscriber setup for the binary and structured job logging.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, VidqueueError};

/// Installs the global tracing subscriber and routes `log` records into it.
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| {
            VidqueueError::Logging(format!("invalid filter '{}': {}", config.filter, e))
        })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        ),
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(false)
                    .with_line_number(false),
            ),
        ),
    };
    installed.map_err(|e| VidqueueError::Logging(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| VidqueueError::Logging(e.to_string()))?;

    Ok(())
}

/// Logs job lifecycle events with the job and worker attached.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    worker_id: String,
}

impl JobLogger {
    pub fn new(job_id: &str, worker_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            worker_id: worker_id.to_string(),
        }
    }

    pub fn log_start(&self, topic: &str) {
        info!(
            job_id = %self.job_id,
            worker_id = %self.worker_id,
            "Job started: {}", topic
        );
    }

    pub fn log_progress(&self, progress: f64, message: &str) {
        tracing::debug!(
            job_id = %self.job_id,
            worker_id = %self.worker_id,
            progress,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            worker_id = %self.worker_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            worker_id = %self.worker_id,
            "Job failed: {}", message
        );
    }

    pub fn log_completion(&self, artifact: Option<&str>) {
        info!(
            job_id = %self.job_id,
            worker_id = %self.worker_id,
            artifact = artifact.unwrap_or("-"),
            "Job completed"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, worker_id = %self.worker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_fields() {
        let logger = JobLogger::new("job-1", "worker-1");
        assert_eq!(logger.job_id(), "job-1");
        // Logging without a subscriber is a no-op.
        logger.log_start("topic");
        logger.log_completion(None);
        let _span = logger.span().entered();
    }
}
