//! In-memory job records shared by the runner and the progress channel.
//!
//! Terminal records are removed a short grace period after their first
//! delivery to an observer, so concurrent observers also see the outcome.
//! Terminal records nobody observes are swept after an orphan TTL.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relaycast_common::JobId;
use tokio::task::JoinHandle;

use super::job::{AcquisitionJob, JobSnapshot};

struct JobEntry {
    job: AcquisitionJob,
    terminal_since: Option<Instant>,
    delivered: bool,
}

/// Thread-safe job registry.
#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<DashMap<JobId, JobEntry>>,
    delivery_grace: Duration,
    orphan_ttl: Duration,
}

impl JobStore {
    pub fn new(delivery_grace: Duration, orphan_ttl: Duration) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            delivery_grace,
            orphan_ttl,
        }
    }

    /// Allocate a fresh id and insert a new `searching` record.
    pub fn create(&self, query: &str, destination: &str) -> JobId {
        loop {
            let id = JobId::new();
            if let Entry::Vacant(slot) = self.jobs.entry(id) {
                slot.insert(JobEntry {
                    job: AcquisitionJob::new(id, query, destination),
                    terminal_since: None,
                    delivered: false,
                });
                return id;
            }
        }
    }

    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        self.jobs.get(id).map(|e| e.job.snapshot())
    }

    pub fn get(&self, id: &JobId) -> Option<AcquisitionJob> {
        self.jobs.get(id).map(|e| e.job.clone())
    }

    /// Apply `f` to the record. Returns what `f` returned, or `false` when
    /// the record is gone.
    pub fn update(&self, id: &JobId, f: impl FnOnce(&mut AcquisitionJob) -> bool) -> bool {
        let Some(mut entry) = self.jobs.get_mut(id) else {
            return false;
        };
        let applied = f(&mut entry.job);
        if entry.job.is_terminal() && entry.terminal_since.is_none() {
            entry.terminal_since = Some(Instant::now());
        }
        applied
    }

    /// Note that an observer received the terminal snapshot of `id`.
    ///
    /// The first call schedules removal after the delivery grace period.
    pub fn mark_delivered(&self, id: &JobId) {
        {
            let Some(mut entry) = self.jobs.get_mut(id) else {
                return;
            };
            if !entry.job.is_terminal() || entry.delivered {
                return;
            }
            entry.delivered = true;
        }

        let jobs = self.jobs.clone();
        let grace = self.delivery_grace;
        let id = *id;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if jobs.remove(&id).is_some() {
                tracing::debug!(job_id = %id, "Removed delivered job");
            }
        });
    }

    /// Remove terminal records older than the orphan TTL.
    pub fn sweep(&self) -> usize {
        let ttl = self.orphan_ttl;
        let mut removed = 0;
        self.jobs.retain(|id, entry| match entry.terminal_since {
            Some(since) if since.elapsed() >= ttl => {
                tracing::info!(
                    job_id = %id,
                    status = %entry.job.status,
                    "Removed unobserved finished job"
                );
                removed += 1;
                false
            }
            _ => true,
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Start a background task that periodically sweeps orphaned records.
pub fn spawn_sweeper(store: JobStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = store.sweep();
            if removed > 0 {
                tracing::debug!(removed, "Swept orphaned jobs");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::job::JobStatus;

    fn store(grace_ms: u64, ttl_ms: u64) -> JobStore {
        JobStore::new(Duration::from_millis(grace_ms), Duration::from_millis(ttl_ms))
    }

    #[test]
    fn ids_are_unique() {
        let store = store(0, 0);
        let a = store.create("a", "music");
        let b = store.create("b", "music");
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&a).unwrap().query, "a");
    }

    #[test]
    fn update_missing_job_is_noop() {
        let store = store(0, 0);
        assert!(!store.update(&JobId::new(), |j| j.fail("x")));
    }

    #[tokio::test]
    async fn delivered_terminal_job_is_removed_after_grace() {
        let store = store(50, 60_000);
        let id = store.create("a", "music");

        // Not terminal yet: delivery marks are ignored.
        store.mark_delivered(&id);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.snapshot(&id).is_some());

        store.update(&id, |j| j.fail("boom"));
        store.mark_delivered(&id);
        assert_eq!(store.snapshot(&id).unwrap().status, JobStatus::Error);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.snapshot(&id).is_none());
    }

    #[test]
    fn sweep_removes_only_old_terminal_jobs() {
        let store = store(0, 0);
        let active = store.create("a", "music");
        let done = store.create("b", "music");
        store.update(&done, |j| j.fail("boom"));

        assert_eq!(store.sweep(), 1);
        assert!(store.get(&active).is_some());
        assert!(store.get(&done).is_none());
    }

    #[test]
    fn sweep_keeps_fresh_terminal_jobs() {
        let store = store(0, 60_000);
        let done = store.create("b", "music");
        store.update(&done, |j| j.fail("boom"));
        assert_eq!(store.sweep(), 0);
    }
}
