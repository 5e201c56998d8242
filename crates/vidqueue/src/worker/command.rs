//! Producer that shells out to an external generator.
//!
//! The job is written to the child's stdin as one JSON object (id, topic,
//! domain and the flattened generation parameters). The child reports on
//! stdout, one JSON object per line:
//!
//! ```text
//! {"progress": 0.4, "message": "Rendering scenes"}
//! {"success": true, "artifact_path": "/videos/abc.mp4", "result": {...}}
//! ```
//!
//! The last line carrying `success` is the outcome. Other lines are logged.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Serialize;

use crate::config::ProducerConfig;
use crate::error::WorkerError;
use crate::job::{GenerationParams, JobRecord};

use super::producer::{ProduceOutcome, Producer, ProgressSink};

#[derive(Serialize)]
struct ProduceRequest<'a> {
    job_id: &'a str,
    topic: &'a str,
    domain: &'a str,
    #[serde(flatten)]
    params: &'a GenerationParams,
}

#[derive(Debug, Clone)]
pub struct CommandProducer {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandProducer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    /// Returns `None` when no command is configured.
    pub fn from_config(config: &ProducerConfig) -> Option<Self> {
        let program = config.command.as_ref()?;
        Some(Self {
            program: program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Producer for CommandProducer {
    fn produce(
        &self,
        job: &JobRecord,
        progress: &dyn ProgressSink,
    ) -> Result<ProduceOutcome, WorkerError> {
        let request = serde_json::to_vec(&ProduceRequest {
            job_id: &job.job_id,
            topic: &job.topic,
            domain: &job.domain,
            params: &job.params,
        })
        .map_err(|e| WorkerError::ProducerCommand(format!("failed to encode job: {}", e)))?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            WorkerError::ProducerCommand(format!("failed to start '{}': {}", self.program, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit without reading its input.
            if let Err(e) = stdin.write_all(&request) {
                log::debug!("Producer did not accept job input: {}", e);
            }
        }

        let mut outcome: Option<ProduceOutcome> = None;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("Failed to read producer output: {}", e);
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match serde_json::from_str::<serde_json::Value>(line) {
                    Ok(value) if value.get("success").is_some() => {
                        match serde_json::from_value::<ProduceOutcome>(value) {
                            Ok(parsed) => outcome = Some(parsed),
                            Err(e) => log::warn!("Malformed producer outcome: {}", e),
                        }
                    }
                    Ok(value) if value.get("progress").is_some() => {
                        let fraction = value["progress"].as_f64().unwrap_or(0.0);
                        let message = value["message"].as_str().unwrap_or_default();
                        progress.report(fraction, message);
                    }
                    _ => log::debug!("producer: {}", line),
                }
            }
        }

        let status = child.wait().map_err(|e| {
            WorkerError::ProducerCommand(format!("failed to wait for '{}': {}", self.program, e))
        })?;

        if !status.success() {
            let error = outcome
                .and_then(|o| o.error)
                .unwrap_or_else(|| format!("producer exited with {}", status));
            return Ok(ProduceOutcome::failed(error));
        }

        Ok(outcome.unwrap_or_else(|| ProduceOutcome::failed("producer reported no outcome")))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<(f64, String)>>,
    }

    impl ProgressSink for RecordingSink {
        fn report(&self, progress: f64, message: &str) {
            self.reports
                .lock()
                .unwrap()
                .push((progress, message.to_string()));
        }
    }

    fn job() -> JobRecord {
        JobRecord::new(1, "The story of Hanuman", "indian_mythology", GenerationParams::default())
    }

    fn shell(script: &str) -> CommandProducer {
        CommandProducer::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[test]
    fn test_successful_command() {
        let producer = shell(
            r#"cat > /dev/null
echo '{"progress": 0.5, "message": "Rendering"}'
echo 'plain chatter'
echo '{"success": true, "artifact_path": "/videos/a.mp4", "result": {"scenes": 4}}'"#,
        );
        let sink = RecordingSink::default();

        let outcome = producer.produce(&job(), &sink).unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.artifact_path.as_deref(), Some("/videos/a.mp4"));
        assert_eq!(outcome.result.unwrap()["scenes"], 4);
        assert_eq!(
            *sink.reports.lock().unwrap(),
            vec![(0.5, "Rendering".to_string())]
        );
    }

    #[test]
    fn test_job_is_written_to_stdin() {
        let producer = shell(
            r#"input=$(cat)
case "$input" in
  *'"topic":"The story of Hanuman"'*'"voice":"alloy"'*) echo '{"success": true, "artifact_path": "ok"}' ;;
  *) echo '{"success": false, "error": "unexpected input"}' ;;
esac"#,
        );
        let outcome = producer.produce(&job(), &RecordingSink::default()).unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
    }

    #[test]
    fn test_non_zero_exit_fails() {
        let producer = shell("cat > /dev/null; exit 3");
        let outcome = producer.produce(&job(), &RecordingSink::default()).unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("exited"));
    }

    #[test]
    fn test_reported_error_survives_non_zero_exit() {
        let producer = shell(
            r#"cat > /dev/null; echo '{"success": false, "error": "tts quota exceeded"}'; exit 1"#,
        );
        let outcome = producer.produce(&job(), &RecordingSink::default()).unwrap();
        assert_eq!(outcome.error.as_deref(), Some("tts quota exceeded"));
    }

    #[test]
    fn test_missing_outcome_fails() {
        let producer = shell("cat > /dev/null; echo done");
        let outcome = producer.produce(&job(), &RecordingSink::default()).unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("producer reported no outcome"));
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let producer = CommandProducer::new("/nonexistent/vidqueue-producer", vec![]);
        let err = producer.produce(&job(), &RecordingSink::default()).unwrap_err();
        assert!(matches!(err, WorkerError::ProducerCommand(_)));
    }

    #[test]
    fn test_from_config() {
        assert!(CommandProducer::from_config(&ProducerConfig::default()).is_none());
        let config = ProducerConfig {
            command: Some("python3".to_string()),
            args: vec!["generate.py".to_string()],
            working_dir: None,
        };
        assert_eq!(CommandProducer::from_config(&config).unwrap().program(), "python3");
    }
}
