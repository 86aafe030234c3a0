use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::instrument;

use crate::{
    board::JobBoard,
    client::{ClientError, TaskClient},
    job::{artifact::ArtifactEndpoints, Job, JobStatus},
};

use super::{LoopShared, PollConfig, PollEvent, PollEventKind, PollOutcome, PollState, Registry};

pub(crate) struct PollRunner<C> {
    pub(crate) client: C,
    pub(crate) config: PollConfig,
    pub(crate) endpoints: Arc<ArtifactEndpoints>,
    pub(crate) board: JobBoard,
    pub(crate) events: broadcast::Sender<PollEvent>,
    pub(crate) shared: Arc<LoopShared>,
    pub(crate) registry: Arc<Registry>,
}

impl<C> PollRunner<C>
where
    C: TaskClient + Send + Sync + 'static,
{
    pub(crate) fn spawn(self) {
        tokio::spawn(async move {
            let outcome = self.run().await;
            self.finish(outcome);
        });
    }

    #[instrument(skip(self), fields(job_id = %self.shared.job_id))]
    async fn run(&self) -> PollOutcome {
        let job_id = &self.shared.job_id;
        let token = &self.shared.token;
        let mut state = PollState::Pending;
        let mut last_status: Option<JobStatus> = None;

        loop {
            if token.is_cancelled() {
                return PollOutcome::Cancelled;
            }

            let fetched = self.client.get(job_id).await;
            if token.is_cancelled() {
                tracing::debug!(%job_id, "Discarding fetch result of cancelled poll loop for {job_id}");
                return PollOutcome::Cancelled;
            }

            match fetched {
                Ok(job) => {
                    state = state.observe(Some(job.status), self.config.max_attempts);
                    self.board.upsert(job.clone());
                    match PollOutcome::from_job(job, &self.endpoints) {
                        Ok(outcome) => return outcome,
                        Err(job) => self.progress(&job, &mut last_status),
                    }
                }
                Err(error) => {
                    state = state.observe(None, self.config.max_attempts);
                    self.log_fetch_error(&error);
                }
            }
            self.shared.publish_state(state);

            let PollState::Polling { attempt } = state else {
                tracing::warn!(
                    %job_id,
                    attempts = self.config.max_attempts,
                    "Giving up on {job_id} after {} attempts",
                    self.config.max_attempts
                );
                return PollOutcome::TimedOut {
                    attempts: self.config.max_attempts,
                };
            };

            let delay = self.config.delay.delay(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = token.cancelled() => {
                    return PollOutcome::Cancelled;
                }
            }
        }
    }

    fn progress(&self, job: &Job, last_status: &mut Option<JobStatus>) {
        if *last_status == Some(job.status) {
            return;
        }
        *last_status = Some(job.status);
        tracing::debug!(job_id = %job.id, status = %job.status, "Job {} is {}", job.id, job.status);
        let _ = self.events.send(PollEvent {
            job_id: job.id.clone(),
            kind: PollEventKind::StatusChanged(job.status),
        });
    }

    fn log_fetch_error(&self, error: &ClientError) {
        let job_id = &self.shared.job_id;
        if error.is_transient() {
            tracing::warn!(?error, %job_id, "Failed to fetch {job_id}, will try again: {error}");
        } else {
            tracing::error!(?error, %job_id, "Failed to fetch {job_id}: {error}");
        }
    }

    fn finish(&self, outcome: PollOutcome) {
        self.registry.release(&self.shared);
        if matches!(outcome, PollOutcome::Cancelled) {
            self.shared.publish_outcome(outcome);
            return;
        }
        if self.shared.publish_outcome(outcome.clone()) {
            let _ = self.events.send(PollEvent {
                job_id: self.shared.job_id.clone(),
                kind: PollEventKind::Finished(outcome),
            });
        }
    }
}
