//! The client-side view of known jobs.
//!
//! The board combines two sources: the last list fetched from the backend, which is only ever
//! replaced wholesale, and the ids with a live poll loop. Whether any of them is still active is
//! published on a [`watch`] channel so the refresh cadence can react the moment it changes.
//!
//! A job only seen by a poll loop counts as active while that loop lives. A job that reached a
//! terminal status is not moved back by a list that was fetched before it got there.
use std::sync::{Arc, RwLock};

use fxhash::{FxHashMap, FxHashSet};
use tokio::sync::watch;

use crate::job::{Job, JobId};

#[derive(Debug, Default)]
struct Inner {
    listed: FxHashMap<JobId, Job>,
    order: Vec<JobId>,
    /// Ids present in the last list from the backend.
    from_list: FxHashSet<JobId>,
    tracked: FxHashSet<JobId>,
}

impl Inner {
    fn has_active(&self) -> bool {
        !self.tracked.is_empty()
            || self
                .from_list
                .iter()
                .filter_map(|id| self.listed.get(id))
                .any(|job| !job.is_terminal())
    }
}

/// Whether a listed copy may replace the one on the board.
///
/// A terminal copy is only replaced by a non-terminal one that the backend updated later, as
/// happens after a retry.
fn supersedes(incoming: &Job, existing: &Job) -> bool {
    if !existing.is_terminal() || incoming.is_terminal() {
        return true;
    }
    match (incoming.updated_at, existing.updated_at) {
        (Some(incoming), Some(existing)) => incoming > existing,
        _ => false,
    }
}

#[derive(Clone, Debug)]
pub struct JobBoard {
    inner: Arc<RwLock<Inner>>,
    active: Arc<watch::Sender<bool>>,
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBoard {
    pub fn new() -> Self {
        let (active, _) = watch::channel(false);
        Self {
            inner: Default::default(),
            active: Arc::new(active),
        }
    }

    /// Replace the listed jobs with a fresh list from the backend, keeping its order.
    pub fn replace_listed(&self, jobs: Vec<Job>) {
        self.mutate(|inner| {
            inner.order = jobs.iter().map(|job| job.id.clone()).collect();
            inner.from_list = inner.order.iter().cloned().collect();
            let mut previous = std::mem::take(&mut inner.listed);
            inner.listed = jobs
                .into_iter()
                .map(|job| match previous.remove(&job.id) {
                    Some(existing) if !supersedes(&job, &existing) => {
                        tracing::debug!(
                            job_id = %job.id,
                            "Keeping {} status of {} over stale {}",
                            existing.status,
                            job.id,
                            job.status
                        );
                        (existing.id.clone(), existing)
                    }
                    _ => (job.id.clone(), job),
                })
                .collect();
        });
    }

    /// Record a fresher copy of a single job, e.g. one observed by a poll loop.
    pub fn upsert(&self, job: Job) {
        self.mutate(|inner| {
            if !inner.listed.contains_key(&job.id) {
                inner.order.insert(0, job.id.clone());
            }
            inner.listed.insert(job.id.clone(), job);
        });
    }

    pub fn remove(&self, id: &JobId) {
        self.mutate(|inner| {
            inner.listed.remove(id);
            inner.order.retain(|listed| listed != id);
            inner.from_list.remove(id);
            inner.tracked.remove(id);
        });
    }

    pub(crate) fn track(&self, id: JobId) {
        self.mutate(|inner| {
            inner.tracked.insert(id);
        });
    }

    pub(crate) fn untrack(&self, id: &JobId) {
        self.mutate(|inner| {
            inner.tracked.remove(id);
        });
    }

    /// Jobs in the order the backend listed them, newest first.
    pub fn jobs(&self) -> Vec<Job> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.listed.get(id))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.read().listed.get(id).cloned()
    }

    /// Whether any job from the last list is pending or running, or any job has a live poll
    /// loop.
    pub fn has_active_jobs(&self) -> bool {
        *self.active.borrow()
    }

    /// A receiver that observes every change of [`JobBoard::has_active_jobs`].
    pub fn subscribe_activity(&self) -> watch::Receiver<bool> {
        self.active.subscribe()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Applies `f` and publishes the resulting activity before the write lock is released, so
    /// concurrent mutations publish in the order they were applied.
    fn mutate(&self, f: impl FnOnce(&mut Inner)) {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut inner);
        let active = inner.has_active();
        self.active.send_if_modified(|current| {
            let changed = *current != active;
            *current = active;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::job::JobStatus;

    #[test]
    fn activity_follows_listed_jobs() {
        let board = JobBoard::new();
        let activity = board.subscribe_activity();
        assert!(!board.has_active_jobs());

        board.replace_listed(vec![
            Job::raw_job().with_id("a").with_status(JobStatus::Completed),
            Job::raw_job().with_id("b").with_status(JobStatus::Running),
        ]);
        assert!(board.has_active_jobs());
        assert!(activity.has_changed().unwrap());

        board.replace_listed(vec![
            Job::raw_job().with_id("a").with_status(JobStatus::Completed),
            Job::raw_job().with_id("b").with_status(JobStatus::Failed),
        ]);
        assert!(!board.has_active_jobs());
        assert_eq!(
            board.jobs().iter().map(|job| job.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn tracked_ids_count_as_active() {
        let board = JobBoard::new();
        let id = JobId::from("job-7");

        board.track(id.clone());
        assert!(board.has_active_jobs());

        board.untrack(&id);
        assert!(!board.has_active_jobs());
    }

    #[test]
    fn unchanged_activity_is_not_republished() {
        let board = JobBoard::new();
        let mut activity = board.subscribe_activity();

        board.replace_listed(vec![Job::raw_job()]);
        assert!(activity.has_changed().unwrap());
        activity.borrow_and_update();

        board.upsert(Job::raw_job().with_id("other"));
        assert!(!activity.has_changed().unwrap());
    }

    #[test]
    fn polled_jobs_are_active_only_while_tracked() {
        let board = JobBoard::new();
        let id = JobId::from("job-3");

        board.track(id.clone());
        board.upsert(Job::raw_job().with_id("job-3").with_status(JobStatus::Running));
        assert!(board.has_active_jobs());

        board.untrack(&id);
        assert!(!board.has_active_jobs());
        assert_eq!(board.get(&id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn stale_list_keeps_terminal_status() {
        let board = JobBoard::new();
        let listed_at = Utc::now();
        let running = Job {
            updated_at: Some(listed_at),
            ..Job::raw_job().with_status(JobStatus::Running)
        };
        board.replace_listed(vec![running.clone()]);

        board.upsert(Job {
            updated_at: Some(listed_at + TimeDelta::seconds(4)),
            ..Job::raw_job().with_status(JobStatus::Completed)
        });
        board.replace_listed(vec![running]);

        assert_eq!(
            board.get(&Job::DEFAULT_ID.into()).unwrap().status,
            JobStatus::Completed
        );
        assert!(!board.has_active_jobs());
    }

    #[test]
    fn stale_list_without_timestamps_keeps_terminal_status() {
        let board = JobBoard::new();
        board.upsert(Job::raw_job().with_status(JobStatus::Failed));

        board.replace_listed(vec![Job::raw_job().with_status(JobStatus::Running)]);

        assert_eq!(board.get(&Job::DEFAULT_ID.into()).unwrap().status, JobStatus::Failed);
        assert!(!board.has_active_jobs());
    }

    #[test]
    fn retried_job_replaces_terminal_copy() {
        let board = JobBoard::new();
        let failed_at = Utc::now();
        board.upsert(Job {
            updated_at: Some(failed_at),
            ..Job::raw_job().with_status(JobStatus::Failed)
        });

        board.replace_listed(vec![Job {
            updated_at: Some(failed_at + TimeDelta::seconds(30)),
            ..Job::raw_job().with_status(JobStatus::Pending)
        }]);

        assert_eq!(board.get(&Job::DEFAULT_ID.into()).unwrap().status, JobStatus::Pending);
        assert!(board.has_active_jobs());
    }

    #[test]
    fn concurrent_mutations_publish_the_final_activity() {
        let board = JobBoard::new();

        for _ in 0..50 {
            std::thread::scope(|scope| {
                for n in 0..8 {
                    let board = board.clone();
                    scope.spawn(move || {
                        let id = JobId::from(format!("job-{n}"));
                        for _ in 0..20 {
                            board.track(id.clone());
                            board.untrack(&id);
                        }
                    });
                }
            });
            assert!(!board.has_active_jobs());
        }
    }

    #[test]
    fn upsert_and_remove() {
        let board = JobBoard::new();
        board.replace_listed(vec![Job::raw_job().with_id("old")]);

        board.upsert(Job::raw_job().with_id("new").with_status(JobStatus::Completed));
        assert_eq!(board.jobs()[0].id.as_str(), "new");

        board.upsert(Job::raw_job().with_id("old").with_status(JobStatus::Completed));
        assert_eq!(board.get(&"old".into()).unwrap().status, JobStatus::Completed);
        assert!(!board.has_active_jobs());

        board.remove(&"new".into());
        assert_eq!(board.jobs().len(), 1);
    }
}
