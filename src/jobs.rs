//! In-memory job registry.
//!
//! Maps a job id (video id or upstream progress token) to the resolved
//! download link and title. Entries expire after a TTL and the registry is
//! capped in size; nothing survives a restart.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use mp3relay_core::config::JobsConfig;
use tokio_util::sync::CancellationToken;

/// Resolved result of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub download_url: String,
    pub title: String,
}

#[derive(Debug, Clone)]
struct Entry {
    job: Job,
    inserted_at: Instant,
}

/// Thread-safe job registry with TTL and capacity eviction.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<String, Entry>>,
    ttl: Duration,
    max_entries: usize,
}

impl JobRegistry {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &JobsConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_entries)
    }

    /// Record (or replace) the job stored under `id`.
    pub fn insert(&self, id: impl Into<String>, job: Job) {
        let id = id.into();
        self.jobs.insert(
            id.clone(),
            Entry {
                job,
                inserted_at: Instant::now(),
            },
        );

        let overflow = self.jobs.len().saturating_sub(self.max_entries);
        if overflow > 0 {
            self.evict_oldest(overflow, &id);
        }
    }

    /// Look up a live job. Expired entries are removed and reported absent.
    pub fn get(&self, id: &str) -> Option<Job> {
        let entry = self.jobs.get(id)?;
        if entry.inserted_at.elapsed() <= self.ttl {
            return Some(entry.job.clone());
        }
        drop(entry);

        self.jobs
            .remove_if(id, |_, e| e.inserted_at.elapsed() > self.ttl);
        tracing::debug!(job_id = %id, "Job expired");
        None
    }

    /// Remove every entry older than the TTL. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.jobs.len();
        self.jobs
            .retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        let removed = before.saturating_sub(self.jobs.len());

        if removed > 0 {
            tracing::debug!(removed, "Purged expired jobs");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn evict_oldest(&self, count: usize, keep: &str) {
        let mut by_age: Vec<(Instant, String)> = self
            .jobs
            .iter()
            .filter(|e| e.key() != keep)
            .map(|e| (e.value().inserted_at, e.key().clone()))
            .collect();
        by_age.sort_unstable();

        for (_, id) in by_age.into_iter().take(count) {
            self.jobs.remove(&id);
            tracing::debug!(job_id = %id, "Evicted job (registry full)");
        }
    }
}

/// Spawn a task that purges expired jobs every `interval` until `cancel`
/// fires.
pub fn start_sweep_task(
    registry: JobRegistry,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    registry.purge_expired();
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}
