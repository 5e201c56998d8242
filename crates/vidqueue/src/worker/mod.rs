pub mod command;
pub mod producer;
pub mod runner;
pub mod stats;

pub use command::CommandProducer;
pub use producer::{NoopProgress, ProduceOutcome, Producer, ProgressSink};
pub use runner::{Tick, Worker};
pub use stats::{CurrentJob, WorkerStats, WorkerStatus};
