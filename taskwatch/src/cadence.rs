//! How often the job list is refreshed.
//!
//! While any job is pending or running the list is refreshed on a short period, otherwise on a
//! long one. The switch happens as soon as the [`JobBoard`] reports a change in activity, and the
//! pending timer is replaced by one running on the new period. A page that becomes visible again
//! gets one immediate refresh.
//!
//! The switching rule lives in [`Cadence`], which has no timers and can be driven by hand:
//!
//! ```
//! # use taskwatch::cadence::{Cadence, CadenceConfig, CadenceMode};
//! # use std::time::Duration;
//! let mut cadence = Cadence::new(&CadenceConfig::default());
//! assert_eq!(cadence.period(), Duration::from_secs(60));
//!
//! let transition = cadence.observe(true).unwrap();
//! assert_eq!(transition.to, CadenceMode::Active);
//! assert_eq!(cadence.period(), Duration::from_secs(10));
//!
//! // No change in activity, no transition.
//! assert_eq!(cadence.observe(true), None);
//! ```
use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    board::JobBoard,
    client::TaskClient,
    event::{events_from_jobs, EventCache},
    job::ToolType,
    TaskWatchError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CadenceConfig {
    /// Refresh period while any job is active.
    pub active_period: Duration,
    /// Refresh period while every job is settled.
    pub idle_period: Duration,
    /// Only list jobs of this tool.
    pub tool_type: Option<ToolType>,
    /// Refill the event cache from listed scheduler jobs.
    pub refresh_events: bool,
}

impl CadenceConfig {
    pub const DEFAULT_ACTIVE_PERIOD: Duration = Duration::from_secs(10);
    pub const DEFAULT_IDLE_PERIOD: Duration = Duration::from_secs(60);

    pub fn with_periods(self, active_period: Duration, idle_period: Duration) -> Self {
        Self {
            active_period,
            idle_period,
            ..self
        }
    }

    pub fn with_tool_type(self, tool_type: impl Into<ToolType>) -> Self {
        Self {
            tool_type: Some(tool_type.into()),
            ..self
        }
    }

    pub fn without_events(self) -> Self {
        Self {
            refresh_events: false,
            ..self
        }
    }

    /// Listing with a filter for another tool would empty the event cache, so events are only
    /// refreshed from unfiltered or scheduler lists.
    fn feeds_events(&self) -> bool {
        self.refresh_events
            && self
                .tool_type
                .as_ref()
                .map_or(true, |tool_type| *tool_type == ToolType::Scheduler)
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            active_period: Self::DEFAULT_ACTIVE_PERIOD,
            idle_period: Self::DEFAULT_IDLE_PERIOD,
            tool_type: None,
            refresh_events: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum CadenceMode {
    #[default]
    Idle,
    Active,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CadenceTransition {
    pub from: CadenceMode,
    pub to: CadenceMode,
    /// The period of the new mode.
    pub period: Duration,
}

/// The refresh mode as a pure state machine.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Cadence {
    mode: CadenceMode,
    visibility: Visibility,
    active_period: Duration,
    idle_period: Duration,
}

impl Cadence {
    pub fn new(config: &CadenceConfig) -> Self {
        Self {
            mode: CadenceMode::Idle,
            visibility: Visibility::Visible,
            active_period: config.active_period,
            idle_period: config.idle_period,
        }
    }

    pub fn mode(&self) -> CadenceMode {
        self.mode
    }

    pub fn period(&self) -> Duration {
        match self.mode {
            CadenceMode::Active => self.active_period,
            CadenceMode::Idle => self.idle_period,
        }
    }

    /// Feed the current activity. Returns the transition if the mode changed.
    pub fn observe(&mut self, active: bool) -> Option<CadenceTransition> {
        let to = if active {
            CadenceMode::Active
        } else {
            CadenceMode::Idle
        };
        if to == self.mode {
            return None;
        }
        let from = std::mem::replace(&mut self.mode, to);
        Some(CadenceTransition {
            from,
            to,
            period: self.period(),
        })
    }

    /// Feed the page visibility. Returns true when the page became visible again, which calls
    /// for an immediate refresh.
    pub fn set_visibility(&mut self, visibility: Visibility) -> bool {
        let previous = std::mem::replace(&mut self.visibility, visibility);
        previous == Visibility::Hidden && visibility == Visibility::Visible
    }
}

/// Keeps the [`JobBoard`] and the [`EventCache`] in step with the backend.
pub struct RefreshCadenceController<C> {
    client: C,
    board: JobBoard,
    cache: EventCache,
    config: CadenceConfig,
}

impl<C> RefreshCadenceController<C>
where
    C: TaskClient + Send + Sync + 'static,
{
    pub fn new(client: C, board: JobBoard, cache: EventCache) -> Self {
        Self {
            client,
            board,
            cache,
            config: Default::default(),
        }
    }

    pub fn with_config(self, config: CadenceConfig) -> Self {
        Self { config, ..self }
    }

    /// List jobs once and replace the board and the event cache. Failures are logged and leave
    /// both untouched.
    pub async fn refresh(&self) {
        match self.client.list(self.config.tool_type.as_ref()).await {
            Ok(jobs) => {
                tracing::trace!(jobs = jobs.len(), "Refreshed job list");
                if self.config.feeds_events() {
                    self.cache.replace(events_from_jobs(&jobs));
                }
                self.board.replace_listed(jobs);
            }
            Err(error) if error.is_transient() => {
                tracing::warn!(?error, "Failed to refresh the job list: {error}");
            }
            Err(error) => {
                tracing::error!(?error, "Failed to refresh the job list: {error}");
            }
        }
    }

    /// Refresh right away and then keep refreshing until the token is cancelled or the handle is
    /// dropped.
    pub fn spawn(self, cancellation_token: CancellationToken) -> CadenceHandle {
        // Every change is queued, so a hide and show while a refresh is running is not lost.
        let (visibility_sender, mut visibility) = mpsc::unbounded_channel();
        let mut cadence = Cadence::new(&self.config);
        let (mode_sender, mode) = watch::channel(cadence.mode());

        let handle = tokio::spawn({
            let cancellation_token = cancellation_token.clone();
            async move {
                let mut activity = self.board.subscribe_activity();
                cadence.observe(*activity.borrow_and_update());
                mode_sender.send_replace(cadence.mode());

                self.refresh().await;
                let mut deadline = Instant::now() + cadence.period();

                loop {
                    tokio::select! {
                        _ = sleep_until(deadline) => {
                            self.refresh().await;
                            deadline = Instant::now() + cadence.period();
                        }
                        changed = activity.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let active = *activity.borrow_and_update();
                            if let Some(transition) = cadence.observe(active) {
                                tracing::debug!(
                                    from = ?transition.from,
                                    to = ?transition.to,
                                    "Refreshing every {:?}",
                                    transition.period
                                );
                                mode_sender.send_replace(transition.to);
                                deadline = Instant::now() + transition.period;
                            }
                        }
                        current = visibility.recv() => {
                            let Some(current) = current else {
                                break;
                            };
                            if cadence.set_visibility(current) {
                                tracing::debug!("Page visible again, refreshing now");
                                self.refresh().await;
                                deadline = Instant::now() + cadence.period();
                            }
                        }
                        _ = cancellation_token.cancelled() => {
                            break;
                        }
                    }
                }
                tracing::debug!("Shutting down the refresh cadence");
            }
        });

        CadenceHandle {
            visibility: visibility_sender,
            mode,
            cancellation_token,
            handle: Some(handle),
        }
    }
}

#[derive(Debug)]
pub struct CadenceHandle {
    visibility: mpsc::UnboundedSender<Visibility>,
    mode: watch::Receiver<CadenceMode>,
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CadenceHandle {
    /// Report a page visibility change.
    pub fn set_visibility(&self, visibility: Visibility) {
        if self.visibility.send(visibility).is_err() {
            tracing::debug!(?visibility, "Refresh cadence already stopped");
        }
    }

    pub fn mode(&self) -> CadenceMode {
        *self.mode.borrow()
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub async fn graceful_shutdown(mut self) -> Result<(), TaskWatchError> {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|_| TaskWatchError::GracefulShutdownFailed)?;
        }
        Ok(())
    }
}
