//! Durable storage for job records and the job→artifact mapping.

pub mod json_file;
pub mod memory;

use std::collections::HashMap;

use crate::error::StoreError;
use crate::job::JobRecord;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// Full contents of both tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Job records keyed by job id.
    pub jobs: HashMap<String, JobRecord>,
    /// Artifact path keyed by job id.
    pub videos: HashMap<String, String>,
    /// Tables that could not be read and were left out of this snapshot.
    pub warnings: Vec<String>,
}

/// Write-through persistence used by the job queue.
///
/// `load` skips malformed entries instead of failing. A table that cannot
/// be read is left out and reported in [`Snapshot::warnings`]; the store
/// must then make sure a later `save` does not destroy it. An error means
/// nothing could be loaded. `save` persists the complete snapshot every time.
pub trait PersistentStore: Send + Sync {
    fn load(&self) -> Result<Snapshot, StoreError>;

    fn save(
        &self,
        jobs: &HashMap<String, JobRecord>,
        videos: &HashMap<String, String>,
    ) -> Result<(), StoreError>;
}
