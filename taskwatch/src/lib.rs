//! Client-side orchestration of long-running generation tasks.
//!
//! A task is submitted through a [`client::TaskClient`], after which a
//! [`supervisor::PollingSupervisor`] polls it until the backend reports a terminal status. Next
//! to that a [`cadence::RefreshCadenceController`] keeps the local job list fresh, faster while
//! something is running, and a [`reminder::ReminderScheduler`] notifies about upcoming events the
//! scheduler tool created. [`calendar::CalendarGridBuilder`] turns those events into day cells.
//!
//! [`TaskWatch`] wires all of these together around one shared [`board::JobBoard`] and one
//! [`event::EventCache`]:
//!
//! ```
//! # use taskwatch::prelude::*;
//! # use taskwatch::client::memory::{InMemoryClient, Response};
//! # use taskwatch::testing::RecordingNotifier;
//! # tokio::runtime::Builder::new_current_thread().enable_time().start_paused(true).build().unwrap().block_on(async {
//! let client = InMemoryClient::new();
//! let taskwatch = TaskWatch::new(client.clone())
//!     .with_cadence(CadenceConfig::default())
//!     .with_reminders(RecordingNotifier::new(), ReminderConfig::default());
//!
//! let handle = taskwatch
//!     .submit(TaskBuilder::new(ToolType::Chart).with_parameter("chart_type", "bar").build())
//!     .await
//!     .unwrap();
//! client.script(handle.job_id(), [Response::Status(JobStatus::Completed)]);
//!
//! assert!(matches!(handle.outcome().await, PollOutcome::Completed(_)));
//! taskwatch.graceful_shutdown().await.unwrap();
//! # });
//! ```
use chrono::NaiveDate;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod backoff;
pub mod board;
pub mod cadence;
pub mod calendar;
pub mod client;
pub mod event;
pub mod job;
pub mod notifier;
pub mod prelude;
pub mod reminder;
pub mod supervisor;
pub mod testing;

use board::JobBoard;
use cadence::{CadenceConfig, CadenceHandle, RefreshCadenceController, Visibility};
use calendar::{CalendarError, CalendarGrid, CalendarGridBuilder};
use client::{ClientError, NewTask, TaskClient};
use event::EventCache;
use job::{artifact::ArtifactEndpoints, Job, JobId};
use notifier::Notifier;
use reminder::{ReminderConfig, ReminderHandle, ReminderScheduler};
use supervisor::{PollConfig, PollHandle, PollingSupervisor};

/// Owns every timer-driven activity of the client.
///
/// Polling is always available. The list refresh and the reminder loop only run once enabled
/// with [`TaskWatch::with_cadence`] and [`TaskWatch::with_reminders`].
pub struct TaskWatch<C> {
    client: C,
    board: JobBoard,
    events: EventCache,
    supervisor: PollingSupervisor<C>,
    poll_config: PollConfig,
    calendar: CalendarGridBuilder,
    cadence: Option<CadenceHandle>,
    reminders: Option<ReminderHandle>,
    cancellation_token: CancellationToken,
}

impl<C> TaskWatch<C>
where
    C: TaskClient + Clone + Send + Sync + 'static,
{
    pub fn new(client: C) -> Self {
        let board = JobBoard::new();
        let cancellation_token = CancellationToken::new();
        let supervisor = PollingSupervisor::new(client.clone(), board.clone())
            .with_cancellation_token(cancellation_token.child_token());
        Self {
            client,
            board,
            events: EventCache::new(),
            supervisor,
            poll_config: Default::default(),
            calendar: Default::default(),
            cadence: None,
            reminders: None,
            cancellation_token,
        }
    }

    pub fn with_endpoints(self, endpoints: ArtifactEndpoints) -> Self {
        Self {
            supervisor: self.supervisor.with_endpoints(endpoints),
            ..self
        }
    }

    /// The config used by [`TaskWatch::submit`] and [`TaskWatch::retry`].
    pub fn with_poll_config(self, poll_config: PollConfig) -> Self {
        Self {
            poll_config,
            ..self
        }
    }

    pub fn with_calendar(self, calendar: CalendarGridBuilder) -> Self {
        Self { calendar, ..self }
    }

    /// Start refreshing the job list and the event cache.
    pub fn with_cadence(mut self, config: CadenceConfig) -> Self {
        if let Some(previous) = self.cadence.take() {
            previous.cancel();
        }
        let handle = RefreshCadenceController::new(
            self.client.clone(),
            self.board.clone(),
            self.events.clone(),
        )
        .with_config(config)
        .spawn(self.cancellation_token.child_token());
        self.cadence = Some(handle);
        self
    }

    /// Start firing reminders for cached events through the given notifier.
    pub fn with_reminders<N>(mut self, notifier: N, config: ReminderConfig) -> Self
    where
        N: Notifier + 'static,
    {
        if let Some(previous) = self.reminders.take() {
            previous.cancel();
        }
        let handle = ReminderScheduler::new(self.events.clone(), notifier)
            .with_config(config)
            .spawn(self.cancellation_token.child_token());
        self.reminders = Some(handle);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn board(&self) -> &JobBoard {
        &self.board
    }

    pub fn events(&self) -> &EventCache {
        &self.events
    }

    pub fn supervisor(&self) -> &PollingSupervisor<C> {
        &self.supervisor
    }

    /// Create a task and start polling it.
    pub async fn submit(&self, task: NewTask) -> Result<PollHandle, TaskWatchError> {
        self.submit_with(task, self.poll_config).await
    }

    pub async fn submit_with(
        &self,
        task: NewTask,
        config: PollConfig,
    ) -> Result<PollHandle, TaskWatchError> {
        let job = self.client.create(task).await.inspect_err(|err| {
            tracing::error!(?err, "Failed to create task: {err}");
        })?;
        tracing::debug!(job_id = %job.id, tool_type = ?job.tool_type, "Created {}", job.id);
        let job_id = job.id.clone();
        self.board.upsert(job);
        Ok(self.supervisor.track(job_id, config))
    }

    /// Poll a job that already exists.
    pub fn track(&self, job_id: JobId) -> PollHandle {
        self.supervisor.track(job_id, self.poll_config)
    }

    /// Ask the backend to run a failed job again and poll it.
    pub async fn retry(&self, job_id: &JobId) -> Result<PollHandle, TaskWatchError> {
        let job = self.client.retry(job_id).await?;
        self.board.upsert(job);
        Ok(self.supervisor.track(job_id.clone(), self.poll_config))
    }

    /// Ask the backend to stop a job and stop polling it.
    pub async fn cancel(&self, job_id: &JobId) -> Result<Job, TaskWatchError> {
        if let Some(handle) = self.supervisor.handle(job_id) {
            handle.cancel();
        }
        let job = self.client.cancel(job_id).await?;
        self.board.upsert(job.clone());
        Ok(job)
    }

    pub async fn delete(&self, job_id: &JobId) -> Result<(), TaskWatchError> {
        if let Some(handle) = self.supervisor.handle(job_id) {
            handle.cancel();
        }
        self.client.delete(job_id).await?;
        self.board.remove(job_id);
        Ok(())
    }

    /// Report a page visibility change to the refresh cadence.
    pub fn set_visibility(&self, visibility: Visibility) {
        if let Some(cadence) = &self.cadence {
            cadence.set_visibility(visibility);
        }
    }

    /// The month view of the cached events.
    pub fn month(
        &self,
        month: u32,
        year: i32,
        today: NaiveDate,
    ) -> Result<CalendarGrid, TaskWatchError> {
        Ok(self
            .calendar
            .build(&self.events.snapshot(), month, year, today)?)
    }

    /// Stop polling, refreshing and reminding, and wait for the loops to finish.
    pub async fn graceful_shutdown(self) -> Result<(), TaskWatchError> {
        tracing::debug!("Shutting down taskwatch");
        let Self {
            supervisor,
            cadence,
            reminders,
            cancellation_token,
            ..
        } = self;
        supervisor.shutdown();
        cancellation_token.cancel();

        let cadence = async move {
            match cadence {
                Some(handle) => handle.graceful_shutdown().await,
                None => Ok(()),
            }
        };
        let reminders = async move {
            match reminders {
                Some(handle) => handle.graceful_shutdown().await,
                None => Ok(()),
            }
        };
        let (cadence, reminders) = futures::future::join(cadence, reminders).await;
        cadence.and(reminders)
    }
}

#[derive(Debug, Error)]
pub enum TaskWatchError {
    #[error("Failed to gracefully shut down")]
    GracefulShutdownFailed,
    #[error("Error communicating with the backend")]
    ClientError(#[from] ClientError),
    #[error("Error building the calendar")]
    CalendarError(#[from] CalendarError),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use chrono::{Datelike, TimeDelta, Utc};
    use futures::StreamExt;
    use serde_json::json;
    use tokio_stream::wrappers::BroadcastStream;

    use super::*;
    use crate::{
        client::memory::{InMemoryClient, Response},
        job::{builder::TaskBuilder, JobStatus, ToolType},
        supervisor::{PollEventKind, PollOutcome},
        testing::RecordingNotifier,
    };

    #[tokio::test(start_paused = true)]
    async fn submit_and_poll() {
        let client = InMemoryClient::new();
        let taskwatch = TaskWatch::new(client.clone());
        let mut events = BroadcastStream::new(taskwatch.supervisor().subscribe());

        let handle = taskwatch
            .submit(TaskBuilder::new(ToolType::Chart).build())
            .await
            .unwrap();
        assert!(taskwatch.board().has_active_jobs());
        client.script(
            handle.job_id(),
            [
                Response::Status(JobStatus::Running),
                Response::Status(JobStatus::Completed),
            ],
        );

        assert_matches!(handle.outcome().await, PollOutcome::Completed(_));
        assert!(!taskwatch.board().has_active_jobs());

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first.kind, PollEventKind::StatusChanged(JobStatus::Running));
        let second = events.next().await.unwrap().unwrap();
        assert_matches!(second.kind, PollEventKind::Finished(PollOutcome::Completed(_)));

        taskwatch.graceful_shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn retry_failed_job() {
        let client = InMemoryClient::new();
        let taskwatch = TaskWatch::new(client.clone());

        let handle = taskwatch
            .submit(TaskBuilder::new(ToolType::Ppt).build())
            .await
            .unwrap();
        let job_id = handle.job_id().clone();
        client.script(&job_id, [Response::Status(JobStatus::Failed)]);
        assert_matches!(handle.outcome().await, PollOutcome::Failed { .. });

        let handle = taskwatch.retry(&job_id).await.unwrap();
        client.script(&job_id, [Response::Status(JobStatus::Completed)]);
        assert_matches!(handle.outcome().await, PollOutcome::Completed(_));

        assert_matches!(
            taskwatch.retry(&job_id).await,
            Err(TaskWatchError::ClientError(ClientError::Status { status: 400, .. }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_delete() {
        let client = InMemoryClient::new();
        let taskwatch = TaskWatch::new(client.clone());

        let handle = taskwatch
            .submit(TaskBuilder::new(ToolType::Ppt).build())
            .await
            .unwrap();
        let job_id = handle.job_id().clone();

        let job = taskwatch.cancel(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(handle.outcome().await, PollOutcome::Cancelled);
        assert!(taskwatch.supervisor().active_jobs().is_empty());

        taskwatch.delete(&job_id).await.unwrap();
        assert!(taskwatch.board().get(&job_id).is_none());
        assert_matches!(
            taskwatch.delete(&job_id).await,
            Err(TaskWatchError::ClientError(ClientError::NotFound(_)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_event_reminds_and_renders() {
        let client = InMemoryClient::new();
        let start = Utc::now() + TimeDelta::minutes(10);
        let notifier = RecordingNotifier::new();
        let taskwatch = TaskWatch::new(client.clone());

        let job = TaskBuilder::new(ToolType::Scheduler)
            .with_title("Standup")
            .with_parameter("title", "Standup")
            .with_parameter("start_time", start.to_rfc3339())
            .with_parameter("reminder_minutes", 15)
            .submit_to(&client)
            .await
            .unwrap();
        client
            .insert(
                job.with_status(JobStatus::Completed)
                    .with_result(json!({"success": true, "event_id": "evt-1"})),
            )
            .unwrap();

        let taskwatch = taskwatch
            .with_cadence(CadenceConfig::default())
            .with_reminders(notifier.clone(), ReminderConfig::default());
        tokio::time::sleep(ReminderConfig::DEFAULT_PERIOD + Duration::from_millis(1)).await;

        assert_eq!(notifier.tags(), vec!["evt-1"]);
        let today = start.date_naive();
        let grid = taskwatch
            .month(today.month(), today.year(), today)
            .unwrap();
        let cell = grid.cells.iter().find(|cell| cell.is_today).unwrap();
        assert_eq!(cell.events[0].id, "evt-1");

        assert_matches!(
            taskwatch.month(13, 2026, today),
            Err(TaskWatchError::CalendarError(_))
        );
        taskwatch.graceful_shutdown().await.unwrap();
    }
}
