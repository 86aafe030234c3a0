//! Per-job polling until a job settles.
//!
//! [`PollingSupervisor::track`] starts one loop per job id. The loop fetches the job right away
//! and then after each configured delay until the backend reports a terminal status or the
//! attempt budget runs out. Every loop is reachable through a [`PollHandle`], which can be
//! awaited for the [`PollOutcome`] or cancelled.
//!
//! # Example
//!
//! ```
//! # use taskwatch::prelude::*;
//! # use taskwatch::client::memory::{InMemoryClient, Response};
//! # tokio::runtime::Builder::new_current_thread().enable_time().start_paused(true).build().unwrap().block_on(async {
//! let client = InMemoryClient::new();
//! let job = TaskBuilder::new(ToolType::Chart).submit_to(&client).await.unwrap();
//! client.script(&job.id, [Response::Status(JobStatus::Running), Response::Status(JobStatus::Completed)]);
//!
//! let supervisor = PollingSupervisor::new(client, JobBoard::new());
//! let handle = supervisor.track(job.id.clone(), PollConfig::default());
//!
//! assert!(matches!(handle.outcome().await, PollOutcome::Completed(_)));
//! assert!(supervisor.active_jobs().is_empty());
//! # });
//! ```
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures::Stream;
use fxhash::FxHashMap;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::PollDelay,
    board::JobBoard,
    client::TaskClient,
    job::{
        artifact::{ArtifactEndpoints, DownloadRef},
        outcome::TaskOutcome,
        Job, JobId, JobStatus,
    },
};

mod runner;

use runner::PollRunner;

const EVENT_CAPACITY: usize = 256;

/// How a single job is polled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub delay: PollDelay,
    /// The number of fetches after which the client gives up on a job that is still pending or
    /// running.
    pub max_attempts: u32,
}

impl PollConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 150;

    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            delay: PollDelay::constant(interval),
            max_attempts,
        }
    }

    pub const fn with_delay(mut self, delay: PollDelay) -> Self {
        self.delay = delay;
        self
    }

    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL, Self::DEFAULT_MAX_ATTEMPTS)
    }
}

/// Where a poll loop is in its lifecycle.
///
/// `Pending` is the state before the first fetch. A loop only ever moves forward; the terminal
/// states never change again.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PollState {
    Pending,
    Polling { attempt: u32 },
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Advance after one fetch. `status` is [`None`] when the fetch itself failed, which still
    /// consumes an attempt.
    pub fn observe(self, status: Option<JobStatus>, max_attempts: u32) -> Self {
        let attempt = match self {
            Self::Pending => 0,
            Self::Polling { attempt } => attempt,
            terminal => return terminal,
        };
        match status {
            Some(JobStatus::Completed) => Self::Completed,
            Some(JobStatus::Failed | JobStatus::Cancelled) => Self::Failed,
            Some(JobStatus::Pending | JobStatus::Running) | None => {
                let attempt = attempt.saturating_add(1);
                if attempt >= max_attempts.max(1) {
                    Self::TimedOut
                } else {
                    Self::Polling { attempt }
                }
            }
        }
    }

    /// Stop the loop unless it already settled.
    pub fn cancel(self) -> Self {
        if self.is_terminal() {
            self
        } else {
            Self::Cancelled
        }
    }
}

/// A successfully fetched terminal job.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub job: Job,
    pub outcome: TaskOutcome,
    /// Set when the result names a produced file.
    pub download: Option<DownloadRef>,
}

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The backend reported `completed`. The result may still describe a domain failure, see
    /// [`TaskOutcome::is_failure`].
    Completed(Completion),
    /// The backend reported `failed` or `cancelled`.
    Failed { job: Job, message: String },
    /// The client gave up after `attempts` fetches.
    TimedOut { attempts: u32 },
    /// The loop was stopped through its handle or the supervisor.
    Cancelled,
}

impl PollOutcome {
    pub(crate) fn from_job(job: Job, endpoints: &ArtifactEndpoints) -> Result<Self, Job> {
        let Some(outcome) = TaskOutcome::from_job(&job) else {
            return Err(job);
        };
        if job.status == JobStatus::Completed {
            let download = job
                .result
                .as_ref()
                .and_then(|result| DownloadRef::from_result(result, endpoints));
            Ok(Self::Completed(Completion {
                job,
                outcome,
                download,
            }))
        } else {
            let message = outcome.failure_reason().unwrap_or_default().to_owned();
            Ok(Self::Failed { job, message })
        }
    }

    pub(crate) fn state(&self) -> PollState {
        match self {
            Self::Completed(_) => PollState::Completed,
            Self::Failed { .. } => PollState::Failed,
            Self::TimedOut { .. } => PollState::TimedOut,
            Self::Cancelled => PollState::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollEvent {
    pub job_id: JobId,
    pub kind: PollEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollEventKind {
    /// The job moved to a new non-terminal status.
    StatusChanged(JobStatus),
    /// The loop settled. Cancellation is never broadcast.
    Finished(PollOutcome),
}

#[derive(Debug)]
pub(crate) struct LoopShared {
    job_id: JobId,
    generation: u64,
    token: CancellationToken,
    state: watch::Sender<PollState>,
    outcome: watch::Sender<Option<PollOutcome>>,
}

impl LoopShared {
    pub(crate) fn publish_state(&self, state: PollState) {
        self.state.send_if_modified(|current| {
            let changed = !current.is_terminal() && *current != state;
            if changed {
                *current = state;
            }
            changed
        });
    }

    /// Records the outcome. Returns false when the loop had already settled.
    pub(crate) fn publish_outcome(&self, outcome: PollOutcome) -> bool {
        self.publish_state(outcome.state());
        self.outcome.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(outcome);
            true
        })
    }
}

#[derive(Debug)]
pub(crate) struct Registry {
    loops: Mutex<FxHashMap<JobId, Arc<LoopShared>>>,
    board: JobBoard,
}

impl Registry {
    /// Drops the bookkeeping of a loop, unless a newer loop already took its place.
    pub(crate) fn release(&self, shared: &LoopShared) {
        let mut loops = self
            .loops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let current = loops
            .get(&shared.job_id)
            .is_some_and(|entry| entry.generation == shared.generation);
        if current {
            loops.remove(&shared.job_id);
            self.board.untrack(&shared.job_id);
        }
    }
}

/// Handle to a single poll loop.
#[derive(Debug, Clone)]
pub struct PollHandle {
    shared: Arc<LoopShared>,
    registry: Arc<Registry>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.shared.job_id
    }

    pub fn state(&self) -> PollState {
        *self.shared.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.outcome.borrow().is_some()
    }

    /// Stop the loop and forget about the job. Calling this more than once, or after the loop
    /// settled, has no further effect.
    ///
    /// A fetch that is already in flight is not aborted, its answer is discarded.
    pub fn cancel(&self) {
        self.shared.token.cancel();
        if self.shared.publish_outcome(PollOutcome::Cancelled) {
            tracing::debug!(job_id = %self.shared.job_id, "Cancelled polling of {}", self.shared.job_id);
        }
        self.registry.release(&self.shared);
    }

    /// Wait for the loop to settle.
    pub async fn outcome(&self) -> PollOutcome {
        let mut receiver = self.shared.outcome.subscribe();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(PollOutcome::Cancelled)
    }
}

/// Owns every poll loop of the client.
pub struct PollingSupervisor<C> {
    client: C,
    endpoints: Arc<ArtifactEndpoints>,
    registry: Arc<Registry>,
    events: broadcast::Sender<PollEvent>,
    generation: AtomicU64,
    cancellation_token: CancellationToken,
}

impl<C> PollingSupervisor<C>
where
    C: TaskClient + Clone + Send + Sync + 'static,
{
    pub fn new(client: C, board: JobBoard) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            endpoints: Default::default(),
            registry: Arc::new(Registry {
                loops: Default::default(),
                board,
            }),
            events,
            generation: AtomicU64::new(0),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_endpoints(self, endpoints: ArtifactEndpoints) -> Self {
        Self {
            endpoints: Arc::new(endpoints),
            ..self
        }
    }

    /// Stop every loop together with the given token.
    pub(crate) fn with_cancellation_token(self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..self
        }
    }

    /// Start polling the given job. If a loop for this id is still live, its handle is returned
    /// and the config is ignored.
    pub fn track(&self, job_id: JobId, config: PollConfig) -> PollHandle {
        let mut loops = self
            .registry
            .loops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(shared) = loops.get(&job_id) {
            if !shared.token.is_cancelled() {
                return PollHandle {
                    shared: shared.clone(),
                    registry: self.registry.clone(),
                };
            }
        }

        let (state, _) = watch::channel(PollState::Pending);
        let (outcome, _) = watch::channel(None);
        let shared = Arc::new(LoopShared {
            job_id: job_id.clone(),
            generation: self.generation.fetch_add(1, Ordering::Relaxed),
            token: self.cancellation_token.child_token(),
            state,
            outcome,
        });
        loops.insert(job_id.clone(), shared.clone());
        self.registry.board.track(job_id);

        PollRunner {
            client: self.client.clone(),
            config,
            endpoints: self.endpoints.clone(),
            board: self.registry.board.clone(),
            events: self.events.clone(),
            shared: shared.clone(),
            registry: self.registry.clone(),
        }
        .spawn();

        PollHandle {
            shared,
            registry: self.registry.clone(),
        }
    }

    /// The handle of the live loop for this job, if any.
    pub fn handle(&self, job_id: &JobId) -> Option<PollHandle> {
        self.registry
            .loops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(job_id)
            .map(|shared| PollHandle {
                shared: shared.clone(),
                registry: self.registry.clone(),
            })
    }

    /// Ids of jobs with a live loop.
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut ids: Vec<_> = self
            .registry
            .loops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    /// Every event published after this call. Events missed by a slow consumer are skipped.
    pub fn events(&self) -> impl Stream<Item = PollEvent> {
        let mut receiver = self.events.subscribe();
        async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Poll event consumer lagged behind, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Cancel every loop.
    pub fn shutdown(&self) {
        tracing::debug!("Shutting down all poll loops");
        let loops: Vec<_> = self
            .registry
            .loops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();
        for shared in loops {
            PollHandle {
                shared,
                registry: self.registry.clone(),
            }
            .cancel();
        }
        self.cancellation_token.cancel();
    }
}
