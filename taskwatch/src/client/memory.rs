//! Provides an in memory implementation of [`TaskClient`].
//!
//! Currently this is provided for testing purposes and not designed for use in a production system.
//!
//! Besides storing jobs, the client can be given a script of responses per job id so a test can
//! describe exactly what the backend reports on each successive [`TaskClient::get`]:
//!
//! ```
//! # use taskwatch::client::{memory::{InMemoryClient, Response}, NewTask, TaskClient};
//! # use taskwatch::job::{JobStatus, ToolType};
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let client = InMemoryClient::new();
//! let job = client
//!     .create(NewTask {
//!         title: "Deck".to_owned(),
//!         description: None,
//!         tool_type: ToolType::Ppt,
//!         parameters: serde_json::json!({}),
//!     })
//!     .await
//!     .unwrap();
//!
//! client.script(&job.id, [Response::Status(JobStatus::Running), Response::Status(JobStatus::Completed)]);
//!
//! assert_eq!(client.get(&job.id).await.unwrap().status, JobStatus::Running);
//! assert_eq!(client.get(&job.id).await.unwrap().status, JobStatus::Completed);
//! // Once the script is exhausted the last stored state is returned.
//! assert_eq!(client.get(&job.id).await.unwrap().status, JobStatus::Completed);
//! assert_eq!(client.get_calls(&job.id), 3);
//! # });
//! ```
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use fxhash::FxHashMap;

use super::{ClientError, NewTask, TaskClient};
use crate::job::{Job, JobId, JobStatus, TaskStats, ToolType};

/// A scripted answer to a single [`TaskClient::get`] call.
#[derive(Debug, Clone)]
pub enum Response {
    /// Move the stored job to the given status and return it.
    Status(JobStatus),
    /// Replace the stored job and return it.
    Job(Job),
    /// Fail the call with a transport error carrying this message.
    TransportError(String),
}

/// An in memory implementation of [`TaskClient`].
///
/// **This is not designed for use in a production systems.**
#[derive(Clone, Default)]
pub struct InMemoryClient {
    jobs: Arc<RwLock<Vec<Job>>>,
    scripts: Arc<RwLock<FxHashMap<JobId, VecDeque<Response>>>>,
    get_calls: Arc<RwLock<FxHashMap<JobId, usize>>>,
    list_calls: Arc<AtomicUsize>,
    id_counter: Arc<AtomicU64>,
}

impl InMemoryClient {
    /// Creates a new instance of [`InMemoryClient`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a job as if the backend already knew about it.
    pub fn insert(&self, job: Job) -> Result<(), ClientError> {
        let mut jobs = self.jobs.write().map_err(|_| ClientError::BadState)?;
        match jobs.iter_mut().find(|existing| existing.id == job.id) {
            Some(existing) => *existing = job,
            None => jobs.push(job),
        }
        Ok(())
    }

    /// Queue responses for successive `get` calls of the given job.
    pub fn script(&self, id: &JobId, responses: impl IntoIterator<Item = Response>) {
        if let Ok(mut scripts) = self.scripts.write() {
            scripts
                .entry(id.clone())
                .or_default()
                .extend(responses);
        }
    }

    /// Change the status of a stored job, as the backend would while working on it.
    pub fn set_status(&self, id: &JobId, status: JobStatus) -> Result<(), ClientError> {
        let mut jobs = self.jobs.write().map_err(|_| ClientError::BadState)?;
        match jobs.iter_mut().find(|job| &job.id == id) {
            None => Err(ClientError::NotFound(id.clone())),
            Some(job) => {
                job.status = status;
                job.updated_at = Some(Utc::now());
                Ok(())
            }
        }
    }

    /// The number of `get` calls made for the given job so far.
    pub fn get_calls(&self, id: &JobId) -> usize {
        self.get_calls
            .read()
            .map(|calls| calls.get(id).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    /// The number of `list` calls made so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, id: &JobId) -> Result<Option<Response>, ClientError> {
        Ok(self
            .scripts
            .write()
            .map_err(|_| ClientError::BadState)?
            .get_mut(id)
            .and_then(VecDeque::pop_front))
    }

    fn update<F>(&self, id: &JobId, f: F) -> Result<Job, ClientError>
    where
        F: FnOnce(&mut Job) -> Result<(), ClientError>,
    {
        let mut jobs = self.jobs.write().map_err(|_| ClientError::BadState)?;
        let job = jobs
            .iter_mut()
            .find(|job| &job.id == id)
            .ok_or_else(|| ClientError::NotFound(id.clone()))?;
        f(job)?;
        job.updated_at = Some(Utc::now());
        Ok(job.clone())
    }
}

impl NewTask {
    fn into_job(self, id: JobId) -> Job {
        let now = Utc::now();
        Job {
            id,
            status: JobStatus::Pending,
            title: self.title,
            description: self.description,
            tool_type: Some(self.tool_type),
            parameters: self.parameters,
            result: None,
            error_message: None,
            created_at: Some(now),
            updated_at: Some(now),
            started_at: None,
            completed_at: None,
        }
    }
}

fn bad_request(message: &str) -> ClientError {
    ClientError::Status {
        status: 400,
        message: message.to_owned(),
    }
}

#[async_trait]
impl TaskClient for InMemoryClient {
    async fn create(&self, task: NewTask) -> Result<Job, ClientError> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let job = task.into_job(format!("job-{id}").into());
        self.jobs
            .write()
            .map_err(|_| ClientError::BadState)?
            .push(job.clone());
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> Result<Job, ClientError> {
        *self
            .get_calls
            .write()
            .map_err(|_| ClientError::BadState)?
            .entry(id.clone())
            .or_default() += 1;

        match self.next_response(id)? {
            Some(Response::TransportError(message)) => Err(ClientError::Transport(message.into())),
            Some(Response::Job(job)) => {
                self.insert(job.clone())?;
                Ok(job)
            }
            Some(Response::Status(status)) => self.update(id, |job| {
                job.status = status;
                Ok(())
            }),
            None => self
                .jobs
                .read()
                .map_err(|_| ClientError::BadState)?
                .iter()
                .find(|job| &job.id == id)
                .cloned()
                .ok_or_else(|| ClientError::NotFound(id.clone())),
        }
    }

    async fn list(&self, tool_type: Option<&ToolType>) -> Result<Vec<Job>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .jobs
            .read()
            .map_err(|_| ClientError::BadState)?
            .iter()
            .rev()
            .filter(|job| tool_type.map_or(true, |tool| job.tool_type.as_ref() == Some(tool)))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &JobId) -> Result<(), ClientError> {
        let mut jobs = self.jobs.write().map_err(|_| ClientError::BadState)?;
        let before = jobs.len();
        jobs.retain(|job| &job.id != id);
        if jobs.len() == before {
            return Err(ClientError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn retry(&self, id: &JobId) -> Result<Job, ClientError> {
        self.update(id, |job| {
            if job.status != JobStatus::Failed {
                return Err(bad_request("Only failed tasks can be retried"));
            }
            job.status = JobStatus::Pending;
            job.error_message = None;
            job.started_at = None;
            job.completed_at = None;
            Ok(())
        })
    }

    async fn cancel(&self, id: &JobId) -> Result<Job, ClientError> {
        self.update(id, |job| {
            if job.status.is_terminal() {
                return Err(bad_request("Task has already finished or been cancelled"));
            }
            job.status = JobStatus::Cancelled;
            Ok(())
        })
    }

    async fn stats(&self) -> Result<TaskStats, ClientError> {
        let jobs = self.jobs.read().map_err(|_| ClientError::BadState)?;
        Ok(jobs.iter().fold(TaskStats::default(), |mut stats, job| {
            stats.total += 1;
            match job.status {
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Pending | JobStatus::Running => stats.pending += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => {}
            }
            stats
        }))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn new_task(tool_type: ToolType) -> NewTask {
        NewTask {
            title: "task".to_owned(),
            description: None,
            tool_type,
            parameters: json!({}),
        }
    }

    #[tokio::test]
    async fn create_assigns_fresh_ids() {
        let client = InMemoryClient::new();
        let first = client.create(new_task(ToolType::Ppt)).await.unwrap();
        let second = client.create(new_task(ToolType::Ppt)).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.status, JobStatus::Pending);
        assert!(first.created_at.is_some());
    }

    #[tokio::test]
    async fn get_unknown_job() {
        let client = InMemoryClient::new();
        assert_matches!(
            client.get(&"missing".into()).await,
            Err(ClientError::NotFound(id)) if id.as_str() == "missing"
        );
        assert_eq!(client.get_calls(&"missing".into()), 1);
    }

    #[tokio::test]
    async fn scripted_errors_and_jobs() {
        let client = InMemoryClient::new();
        let job = client.create(new_task(ToolType::Chart)).await.unwrap();
        let finished = job
            .clone()
            .with_status(JobStatus::Completed)
            .with_result(json!({"image_path": "/tmp/a.png"}));
        client.script(
            &job.id,
            [
                Response::TransportError("connection reset".to_owned()),
                Response::Job(finished.clone()),
            ],
        );

        assert_matches!(client.get(&job.id).await, Err(ClientError::Transport(_)));
        assert_eq!(client.get(&job.id).await.unwrap(), finished);
        assert_eq!(client.list(None).await.unwrap(), vec![finished]);
    }

    #[tokio::test]
    async fn list_filters_by_tool_newest_first() {
        let client = InMemoryClient::new();
        let chart = client.create(new_task(ToolType::Chart)).await.unwrap();
        let ppt = client.create(new_task(ToolType::Ppt)).await.unwrap();
        let chart2 = client.create(new_task(ToolType::Chart)).await.unwrap();

        let charts = client.list(Some(&ToolType::Chart)).await.unwrap();
        assert_eq!(
            charts.iter().map(|job| job.id.clone()).collect::<Vec<_>>(),
            vec![chart2.id, chart.id]
        );
        assert_eq!(client.list(None).await.unwrap().len(), 3);
        assert_eq!(client.list_calls(), 2);
        assert_eq!(client.list(Some(&ToolType::Ppt)).await.unwrap()[0].id, ppt.id);
    }

    #[tokio::test]
    async fn retry_only_failed() {
        let client = InMemoryClient::new();
        let job = client.create(new_task(ToolType::Ppt)).await.unwrap();

        assert_matches!(
            client.retry(&job.id).await,
            Err(ClientError::Status { status: 400, .. })
        );

        client.set_status(&job.id, JobStatus::Failed).unwrap();
        let retried = client.retry(&job.id).await.unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_and_delete() {
        let client = InMemoryClient::new();
        let job = client.create(new_task(ToolType::Ppt)).await.unwrap();

        assert_eq!(
            client.cancel(&job.id).await.unwrap().status,
            JobStatus::Cancelled
        );
        assert_matches!(
            client.cancel(&job.id).await,
            Err(ClientError::Status { status: 400, .. })
        );

        client.delete(&job.id).await.unwrap();
        assert_matches!(client.delete(&job.id).await, Err(ClientError::NotFound(_)));
    }

    #[tokio::test]
    async fn stats_count_running_as_pending() {
        let client = InMemoryClient::new();
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let job = client.create(new_task(ToolType::Chart)).await.unwrap();
            client.set_status(&job.id, status).unwrap();
        }

        assert_eq!(
            client.stats().await.unwrap(),
            TaskStats {
                total: 4,
                completed: 1,
                pending: 2,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn badstate_errors() {
        let client = InMemoryClient::new();
        let job = client.create(new_task(ToolType::Ppt)).await.unwrap();

        tokio::task::spawn({
            let client = client.clone();
            async move {
                let _guard = client.jobs.write();
                panic!()
            }
        })
        .await
        .unwrap_err();

        assert_matches!(client.list(None).await, Err(ClientError::BadState));
        assert_matches!(client.cancel(&job.id).await, Err(ClientError::BadState));
        assert_matches!(client.stats().await, Err(ClientError::BadState));
    }
}
