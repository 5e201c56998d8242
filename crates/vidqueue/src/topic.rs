//! Topic candidates and the source that keeps the queue fed.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// A candidate unit of work offered by a [`TopicSource`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCandidate {
    pub topic: String,
    pub domain: String,
    /// Set once the candidate has been turned into a job.
    #[serde(default)]
    pub used: bool,
}

impl TopicCandidate {
    pub fn new(topic: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            domain: domain.into(),
            used: false,
        }
    }
}

/// Groups candidates by their domain tag.
pub fn group_by_domain(candidates: Vec<TopicCandidate>) -> BTreeMap<String, Vec<TopicCandidate>> {
    let mut grouped: BTreeMap<String, Vec<TopicCandidate>> = BTreeMap::new();
    for candidate in candidates {
        grouped
            .entry(candidate.domain.clone())
            .or_default()
            .push(candidate);
    }
    grouped
}

/// External collaborator that supplies new topics.
///
/// Only the refill-capable worker calls it, and only when the queue runs low.
pub trait TopicSource: Send + Sync {
    /// Returns up to `per_domain` candidates for each of `domains`.
    fn next_candidates(
        &self,
        domains: &[String],
        per_domain: usize,
    ) -> Result<Vec<TopicCandidate>, WorkerError>;

    /// Records that `candidates` were enqueued so later refills skip them.
    fn mark_used(&self, candidates: &[TopicCandidate]);
}

/// Fixed in-memory list of candidates.
#[derive(Default)]
pub struct StaticTopicSource {
    candidates: Mutex<Vec<TopicCandidate>>,
}

impl StaticTopicSource {
    pub fn new(candidates: Vec<TopicCandidate>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
        }
    }

    /// Number of candidates not yet marked used.
    pub fn remaining(&self) -> usize {
        self.lock().iter().filter(|c| !c.used).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<TopicCandidate>> {
        match self.candidates.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Topic source lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl TopicSource for StaticTopicSource {
    fn next_candidates(
        &self,
        domains: &[String],
        per_domain: usize,
    ) -> Result<Vec<TopicCandidate>, WorkerError> {
        let candidates = self.lock();
        let mut taken: BTreeMap<&str, usize> = BTreeMap::new();
        let mut result = Vec::new();

        for candidate in candidates.iter().filter(|c| !c.used) {
            if !domains.is_empty() && !domains.iter().any(|d| d == &candidate.domain) {
                continue;
            }
            let count = taken.entry(candidate.domain.as_str()).or_insert(0);
            if *count < per_domain {
                *count += 1;
                result.push(candidate.clone());
            }
        }

        Ok(result)
    }

    fn mark_used(&self, used: &[TopicCandidate]) {
        let mut candidates = self.lock();
        for candidate in candidates.iter_mut() {
            if used
                .iter()
                .any(|u| u.topic == candidate.topic && u.domain == candidate.domain)
            {
                candidate.used = true;
            }
        }
    }
}
