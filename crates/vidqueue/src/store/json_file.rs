//! Two JSON files: one for job records, one for the job→video mapping.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::error::StoreError;
use crate::job::JobRecord;

use super::{PersistentStore, Snapshot};

pub struct JsonFileStore {
    jobs_path: PathBuf,
    videos_path: PathBuf,
    /// Files that could neither be read nor moved aside. Saves skip them.
    held: Mutex<HashSet<PathBuf>>,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(jobs_path: P, videos_path: Q) -> Self {
        Self {
            jobs_path: jobs_path.as_ref().to_path_buf(),
            videos_path: videos_path.as_ref().to_path_buf(),
            held: Mutex::new(HashSet::new()),
        }
    }

    /// Places both files inside `dir` using the given file names.
    pub fn in_directory<P: AsRef<Path>>(dir: P, jobs_file: &str, videos_file: &str) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(jobs_file), dir.join(videos_file))
    }

    pub fn jobs_path(&self) -> &Path {
        &self.jobs_path
    }

    pub fn videos_path(&self) -> &Path {
        &self.videos_path
    }

    fn load_jobs(&self) -> Result<HashMap<String, JobRecord>, StoreError> {
        let mut jobs = HashMap::new();
        let Some(entries) = read_object(&self.jobs_path)? else {
            return Ok(jobs);
        };

        for (key, value) in entries {
            match serde_json::from_value::<JobRecord>(value) {
                Ok(job) if job.job_id == key => {
                    jobs.insert(key, job);
                }
                Ok(job) => {
                    log::warn!(
                        "Skipping job entry '{}': record carries mismatched id '{}'",
                        key,
                        job.job_id
                    );
                }
                Err(e) => {
                    log::warn!("Skipping malformed job entry '{}': {}", key, e);
                }
            }
        }

        Ok(jobs)
    }

    fn load_videos(&self) -> Result<HashMap<String, String>, StoreError> {
        let mut videos = HashMap::new();
        let Some(entries) = read_object(&self.videos_path)? else {
            return Ok(videos);
        };

        for (key, value) in entries {
            match value {
                serde_json::Value::String(path) => {
                    videos.insert(key, path);
                }
                other => {
                    log::warn!(
                        "Skipping video mapping for '{}': expected a path string, found {}",
                        key,
                        other
                    );
                }
            }
        }

        Ok(videos)
    }

    fn held(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        match self.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// True when saves leave `path` untouched.
    pub fn is_held(&self, path: &Path) -> bool {
        self.held().contains(path)
    }

    /// Handles a table file that could not be read: moves it aside, or
    /// holds it when that fails. Returns the warning to report.
    fn set_aside(&self, path: &Path, err: StoreError) -> String {
        log::error!("{}", err);
        if quarantine(path) {
            return format!("{} (moved aside)", err);
        }
        self.held().insert(path.to_path_buf());
        log::error!(
            "{} will not be written until the process restarts",
            path.display()
        );
        StoreError::Held {
            path: path.to_path_buf(),
        }
        .to_string()
    }
}

impl PersistentStore for JsonFileStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        let mut snapshot = Snapshot::default();
        match self.load_jobs() {
            Ok(jobs) => snapshot.jobs = jobs,
            Err(e) => snapshot.warnings.push(self.set_aside(&self.jobs_path, e)),
        }
        match self.load_videos() {
            Ok(videos) => snapshot.videos = videos,
            Err(e) => snapshot.warnings.push(self.set_aside(&self.videos_path, e)),
        }
        log::debug!(
            "Loaded {} jobs and {} video mappings from {:?}",
            snapshot.jobs.len(),
            snapshot.videos.len(),
            self.jobs_path.parent()
        );
        Ok(snapshot)
    }

    fn save(
        &self,
        jobs: &HashMap<String, JobRecord>,
        videos: &HashMap<String, String>,
    ) -> Result<(), StoreError> {
        // Sorted output keeps the files diffable between saves.
        let jobs: BTreeMap<&String, &JobRecord> = jobs.iter().collect();
        let videos: BTreeMap<&String, &String> = videos.iter().collect();

        let tables = [
            (&self.jobs_path, serde_json::to_vec_pretty(&jobs)?),
            (&self.videos_path, serde_json::to_vec_pretty(&videos)?),
        ];

        let mut skipped = None;
        for (path, bytes) in &tables {
            if self.is_held(path) {
                skipped.get_or_insert_with(|| path.to_path_buf());
                continue;
            }
            write_atomic(path, bytes)?;
        }

        match skipped {
            Some(path) => Err(StoreError::Held { path }),
            None => Ok(()),
        }
    }
}

/// Reads a top-level JSON object. A missing or blank file yields `None`.
fn read_object(path: &Path) -> Result<Option<serde_json::Map<String, serde_json::Value>>, StoreError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(None);
    }

    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(StoreError::NotAnObject {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(StoreError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn quarantine(path: &Path) -> bool {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store.json".to_string());
    let target = path.with_file_name(format!(
        "{}.corrupt-{}",
        file_name,
        Utc::now().format("%Y%m%dT%H%M%S")
    ));
    match std::fs::rename(path, &target) {
        Ok(()) => {
            log::warn!("Moved unreadable store file to {}", target.display());
            true
        }
        Err(e) => {
            log::error!(
                "Failed to move unreadable store file {} aside: {}",
                path.display(),
                e
            );
            false
        }
    }
}

/// Writes to a sibling temp file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!("{}.tmp", file_name));

    let write = |tmp: &Path| -> std::io::Result<()> {
        let mut file = std::fs::File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()
    };
    write(&tmp_path).map_err(|e| StoreError::WriteFile {
        path: tmp_path.clone(),
        source: e,
    })?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        StoreError::Rename {
            tmp_path: tmp_path.clone(),
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    Ok(())
}
