//! Fires at most one notification per scheduled event, once its reminder window opens.
//!
//! The scheduler wakes up on a fixed period, reads the [`EventCache`] and notifies about every
//! pending event whose window `[start_time - reminder_minutes, start_time)` contains the current
//! time. Fired event ids are remembered for the lifetime of the scheduler, so replacing the
//! cache between two ticks never causes a second notification. Nothing is persisted: a restart
//! forgets what fired, and a window missed entirely while not running is not caught up.
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use fxhash::FxHashSet;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    event::{EventCache, ScheduledEvent},
    notifier::{Notification, Notifier},
    TaskWatchError,
};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderConfig {
    /// How often the event cache is scanned.
    pub period: Duration,
    /// The offset start times are shown in.
    pub display_offset: FixedOffset,
}

impl ReminderConfig {
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);
    const START_FORMAT: &'static str = "%Y-%m-%d %H:%M";

    pub fn with_period(self, period: Duration) -> Self {
        Self { period, ..self }
    }

    pub fn with_display_offset(self, display_offset: FixedOffset) -> Self {
        Self {
            display_offset,
            ..self
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            period: Self::DEFAULT_PERIOD,
            display_offset: Utc.fix(),
        }
    }
}

/// Events whose reminder is due at `now` and has not fired yet.
pub fn due_reminders<'a>(
    events: &'a [ScheduledEvent],
    fired: &FxHashSet<String>,
    now: DateTime<Utc>,
) -> Vec<&'a ScheduledEvent> {
    events
        .iter()
        .filter(|event| event.is_due(now) && !fired.contains(&event.id))
        .collect()
}

pub struct ReminderScheduler<N, K = SystemClock> {
    cache: EventCache,
    notifier: N,
    clock: K,
    config: ReminderConfig,
    fired: FxHashSet<String>,
}

impl<N> ReminderScheduler<N>
where
    N: Notifier,
{
    pub fn new(cache: EventCache, notifier: N) -> Self {
        Self {
            cache,
            notifier,
            clock: SystemClock,
            config: Default::default(),
            fired: Default::default(),
        }
    }
}

impl<N, K> ReminderScheduler<N, K>
where
    N: Notifier,
    K: Clock,
{
    pub fn with_clock<K2: Clock>(self, clock: K2) -> ReminderScheduler<N, K2> {
        ReminderScheduler {
            cache: self.cache,
            notifier: self.notifier,
            clock,
            config: self.config,
            fired: self.fired,
        }
    }

    pub fn with_config(self, config: ReminderConfig) -> Self {
        Self { config, ..self }
    }

    pub fn has_fired(&self, event_id: &str) -> bool {
        self.fired.contains(event_id)
    }

    /// Check the cache against the clock.
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        self.tick_at(now)
    }

    /// Check the cache against the given time. Returns the number of notifications shown.
    ///
    /// Without a granted permission nothing is shown and nothing is recorded as fired, so a
    /// permission granted later inside the window still produces the reminder.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> usize {
        let events = self.cache.snapshot();
        let due = due_reminders(&events, &self.fired, now);
        if due.is_empty() {
            return 0;
        }

        let permission = self.notifier.permission();
        if !permission.is_granted() {
            tracing::debug!(
                ?permission,
                due = due.len(),
                "Skipping {} due reminders, notifications are not permitted",
                due.len()
            );
            return 0;
        }

        let mut shown = 0;
        for event in due {
            let notification = self.notification_for(event);
            match self.notifier.notify(notification) {
                Ok(()) => {
                    tracing::debug!(event_id = %event.id, "Sent reminder for {}", event.title);
                    self.fired.insert(event.id.clone());
                    shown += 1;
                }
                Err(error) => {
                    tracing::warn!(?error, event_id = %event.id, "Failed to send reminder: {error}");
                }
            }
        }
        shown
    }

    fn notification_for(&self, event: &ScheduledEvent) -> Notification {
        let starts = event
            .start_time
            .with_timezone(&self.config.display_offset)
            .format(ReminderConfig::START_FORMAT);
        let description = event.description.trim();
        let body = if description.is_empty() {
            format!("Starts at {starts}")
        } else {
            format!("{description}\nStarts at {starts}")
        };
        Notification {
            title: event.title.clone(),
            body,
            tag: event.id.clone(),
        }
    }
}

impl<N, K> ReminderScheduler<N, K>
where
    N: Notifier + 'static,
    K: Clock + 'static,
{
    /// Run [`ReminderScheduler::tick`] every period until the token is cancelled. The first
    /// check happens right away.
    pub fn spawn(mut self, cancellation_token: CancellationToken) -> ReminderHandle {
        let handle = tokio::spawn({
            let cancellation_token = cancellation_token.clone();
            async move {
                let mut interval = tokio::time::interval(self.config.period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            self.tick();
                        }
                        _ = cancellation_token.cancelled() => {
                            tracing::debug!("Shutting down the reminder scheduler");
                            break;
                        }
                    }
                }
            }
        });

        ReminderHandle {
            cancellation_token,
            handle: Some(handle),
        }
    }
}

#[derive(Debug)]
pub struct ReminderHandle {
    cancellation_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ReminderHandle {
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
