use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::job::JobRecord;

use super::{PersistentStore, Snapshot};

/// In-process store. State lives only as long as the value does.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Snapshot>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that returns `snapshot` from the first `load`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            ..Self::default()
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    /// Makes every subsequent save fail with a write error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::Relaxed);
    }

    /// Makes every subsequent load fail with a read error.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }

    /// Returns a copy of the last saved snapshot.
    pub fn snapshot(&self) -> Snapshot {
        match self.snapshot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl PersistentStore for MemoryStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(StoreError::ReadFile {
                path: "memory".into(),
                source: std::io::Error::other("simulated read failure"),
            });
        }
        Ok(self.snapshot())
    }

    fn save(
        &self,
        jobs: &HashMap<String, JobRecord>,
        videos: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::Relaxed) {
            return Err(StoreError::WriteFile {
                path: "memory".into(),
                source: std::io::Error::other("simulated write failure"),
            });
        }

        let mut guard = match self.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.jobs = jobs.clone();
        guard.videos = videos.clone();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
