//! Helpers for testing.
//!
//! [`RecordingNotifier`] and [`ManualClock`] make the reminder scheduler deterministic, together
//! with [`crate::client::memory::InMemoryClient`] they allow testing a complete
//! [`crate::TaskWatch`] without a backend or a host UI. [`SlowClient`] adds latency to any
//! client.
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    client::{ClientError, NewTask, TaskClient},
    job::{Job, JobId, TaskStats, ToolType},
    notifier::{Notification, NotificationPermission, Notifier, NotifyError},
    reminder::Clock,
};

/// A [`Notifier`] that keeps every notification it is asked to show.
///
/// # Example
///
/// ```
/// # use taskwatch::notifier::{Notification, NotificationPermission, Notifier};
/// # use taskwatch::testing::RecordingNotifier;
/// let notifier = RecordingNotifier::new();
/// assert_eq!(notifier.permission(), NotificationPermission::Granted);
///
/// notifier
///     .notify(Notification {
///         title: "Standup".to_owned(),
///         body: "Starts at 2026-10-18 09:00".to_owned(),
///         tag: "evt-1".to_owned(),
///     })
///     .unwrap();
///
/// assert_eq!(notifier.tags(), vec!["evt-1"]);
/// ```
#[derive(Debug, Clone)]
pub struct RecordingNotifier {
    notifications: Arc<Mutex<Vec<Notification>>>,
    permission: Arc<Mutex<NotificationPermission>>,
    fail_next: Arc<AtomicBool>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingNotifier {
    /// A notifier with [`NotificationPermission::Granted`].
    pub fn new() -> Self {
        Self::with_permission(NotificationPermission::Granted)
    }

    pub fn with_permission(permission: NotificationPermission) -> Self {
        Self {
            notifications: Default::default(),
            permission: Arc::new(Mutex::new(permission)),
            fail_next: Default::default(),
        }
    }

    pub fn set_permission(&self, permission: NotificationPermission) {
        *self
            .permission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = permission;
    }

    /// Make the next delivery fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .map(|notification| notification.tag)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn permission(&self) -> NotificationPermission {
        *self
            .permission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let permission = self.permission();
        if !permission.is_granted() {
            return Err(NotifyError::NotPermitted(permission));
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(NotifyError::Delivery("notification service unavailable".into()));
        }
        self.notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
        Ok(())
    }
}

/// A [`Clock`] that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Wraps a [`TaskClient`] so that `get` and `list` take a while to answer.
///
/// It also records how many `get` calls were in flight at the same time.
#[derive(Debug, Clone)]
pub struct SlowClient<C> {
    inner: C,
    get_latency: Duration,
    list_latency: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl<C> SlowClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            get_latency: Duration::ZERO,
            list_latency: Duration::ZERO,
            in_flight: Default::default(),
            max_in_flight: Default::default(),
        }
    }

    pub fn with_get_latency(self, get_latency: Duration) -> Self {
        Self {
            get_latency,
            ..self
        }
    }

    pub fn with_list_latency(self, list_latency: Duration) -> Self {
        Self {
            list_latency,
            ..self
        }
    }

    /// The highest number of `get` calls that were running at once.
    pub fn max_concurrent_gets(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<C> TaskClient for SlowClient<C>
where
    C: TaskClient + Send + Sync,
{
    async fn create(&self, task: NewTask) -> Result<Job, ClientError> {
        self.inner.create(task).await
    }

    async fn get(&self, id: &JobId) -> Result<Job, ClientError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.get_latency).await;
        let job = self.inner.get(id).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        job
    }

    async fn list(&self, tool_type: Option<&ToolType>) -> Result<Vec<Job>, ClientError> {
        tokio::time::sleep(self.list_latency).await;
        self.inner.list(tool_type).await
    }

    async fn delete(&self, id: &JobId) -> Result<(), ClientError> {
        self.inner.delete(id).await
    }

    async fn retry(&self, id: &JobId) -> Result<Job, ClientError> {
        self.inner.retry(id).await
    }

    async fn cancel(&self, id: &JobId) -> Result<Job, ClientError> {
        self.inner.cancel(id).await
    }

    async fn stats(&self) -> Result<TaskStats, ClientError> {
        self.inner.stats().await
    }
}
