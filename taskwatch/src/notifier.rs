//! The host's ability to show a notification to the user.
use std::sync::Arc;

use thiserror::Error;

/// Whether the host may currently show notifications.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// The user has not been asked yet.
    #[default]
    Default,
    /// The host has no notification support at all.
    Unsupported,
}

impl NotificationPermission {
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Identifies what the notification is about. For reminders this is the event id.
    pub tag: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifications are not permitted: {0:?}")]
    NotPermitted(NotificationPermission),
    #[error("Failed to deliver notification")]
    Delivery(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub trait Notifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn permission(&self) -> NotificationPermission {
        self.as_ref().permission()
    }

    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.as_ref().notify(notification)
    }
}

/// Writes notifications to the log instead of showing them.
///
/// Useful for headless hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Granted
    }

    fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            tag = %notification.tag,
            title = %notification.title,
            "{}: {}",
            notification.title,
            notification.body
        );
        Ok(())
    }
}
