//! Scripted collaborators and small builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use vidqueue::job::JobRecord;
use vidqueue::worker::{ProduceOutcome, Producer, ProgressSink};
use vidqueue::{TopicCandidate, WorkerError};

/// How the scripted producer handles one call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Writes `<job_id>.mp4` into the videos directory.
    Succeed,
    Fail(String),
    Error(String),
    Panic(String),
}

/// Producer that follows a script, then succeeds for every further call.
pub struct ScriptedProducer {
    videos_dir: PathBuf,
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProducer {
    pub fn new(videos_dir: impl Into<PathBuf>) -> Self {
        Self {
            videos_dir: videos_dir.into(),
            steps: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    /// Job ids in the order they were produced.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Producer for ScriptedProducer {
    fn produce(
        &self,
        job: &JobRecord,
        progress: &dyn ProgressSink,
    ) -> Result<ProduceOutcome, WorkerError> {
        self.calls.lock().unwrap().push(job.job_id.clone());
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Succeed);

        progress.report(0.5, "Generating scenes");
        match step {
            Step::Succeed => {
                let path = self.videos_dir.join(format!("{}.mp4", job.job_id));
                std::fs::write(&path, b"fake mp4").unwrap();
                Ok(ProduceOutcome::succeeded(path.to_string_lossy()).with_result(
                    serde_json::json!({"final_video": {"file_path": path.to_string_lossy()}}),
                ))
            }
            Step::Fail(error) => Ok(ProduceOutcome::failed(error)),
            Step::Error(error) => Err(WorkerError::ProducerCommand(error)),
            Step::Panic(message) => panic!("{}", message),
        }
    }
}

pub fn candidates(domain: &str, topics: &[&str]) -> Vec<TopicCandidate> {
    topics
        .iter()
        .map(|topic| TopicCandidate::new(*topic, domain))
        .collect()
}
