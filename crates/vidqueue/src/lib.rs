pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod logging;
pub mod queue;
pub mod store;
pub mod topic;
pub mod worker;
pub mod workforce;

pub use config::{load_config, Config};
pub use error::{ConfigError, Result, StoreError, VidqueueError, WorkerError};
pub use events::{JobEvent, JobEventBroadcaster};
pub use job::{GenerationParams, JobRecord, JobStatus, StatusUpdate};
pub use queue::{CleanupStats, CompletedVideo, JobQueue, QueueStatus};
pub use store::{JsonFileStore, MemoryStore, PersistentStore, Snapshot};
pub use topic::{StaticTopicSource, TopicCandidate, TopicSource};
pub use worker::{CommandProducer, ProduceOutcome, Producer, ProgressSink, Worker};
pub use workforce::{WorkforceManager, WorkforceStatus};
