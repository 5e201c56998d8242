use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidqueueError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Not overwriting '{path}': it could not be read or moved aside at startup")]
    Held { path: PathBuf },

    #[error("Failed to replace '{path}' with '{tmp_path}': {source}")]
    Rename {
        tmp_path: PathBuf,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("File '{path}' is not a JSON object")]
    NotAnObject { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker '{worker_id}': {source}")]
    SpawnFailed {
        worker_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker '{0}' is already running")]
    AlreadyRunning(String),

    #[error("A workforce needs at least one worker")]
    NoWorkers,

    #[error("Producer command failed: {0}")]
    ProducerCommand(String),

    #[error("Topic source failed: {0}")]
    TopicSource(String),
}

pub type Result<T> = std::result::Result<T, VidqueueError>;
