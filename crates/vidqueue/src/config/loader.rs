use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let queue = &config.queue;

    if queue.max_concurrent_jobs == 0 {
        return Err(invalid("queue.max_concurrent_jobs must be at least 1"));
    }
    if queue.jobs_file.trim().is_empty() || queue.mapping_file.trim().is_empty() {
        return Err(invalid("queue.jobs_file and queue.mapping_file must not be empty"));
    }
    if queue.jobs_file == queue.mapping_file {
        return Err(invalid(format!(
            "queue.jobs_file and queue.mapping_file must differ (both '{}')",
            queue.jobs_file
        )));
    }

    if config.worker.poll_interval_ms == 0 {
        return Err(invalid("worker.poll_interval_ms must be at least 1"));
    }

    if config.workforce.worker_count == 0 {
        return Err(invalid("workforce.worker_count must be at least 1"));
    }

    if let Some(candidate) = config
        .topics
        .iter()
        .find(|c| c.topic.trim().is_empty() || c.domain.trim().is_empty())
    {
        return Err(invalid(format!(
            "topics entries need a topic and a domain (got '{}' / '{}')",
            candidate.topic, candidate.domain
        )));
    }

    if let Some(command) = &config.producer.command {
        if command.trim().is_empty() {
            return Err(invalid("producer.command must not be blank when set"));
        }
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}
