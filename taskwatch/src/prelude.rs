//! The purpose of this module is to alleviate the need to import many of the `[taskwatch]` types.
//!
//! ```
//! # #![allow(unused_imports)]
//! use taskwatch::prelude::*;
//! ```
pub use crate::backoff::{Jitter, PollDelay};
pub use crate::board::JobBoard;
pub use crate::cadence::{CadenceConfig, CadenceMode, Visibility};
pub use crate::calendar::{CalendarDayCell, CalendarGrid, CalendarGridBuilder};
pub use crate::client::{ClientError, NewTask, TaskClient};
pub use crate::event::{EventCache, ScheduledEvent};
pub use crate::job::artifact::{ArtifactEndpoints, DownloadRef};
pub use crate::job::builder::TaskBuilder;
pub use crate::job::outcome::{DomainOutcome, ProtocolStatus, TaskOutcome};
pub use crate::job::{Job, JobId, JobStatus, ToolType};
pub use crate::notifier::{Notification, NotificationPermission, Notifier};
pub use crate::reminder::ReminderConfig;
pub use crate::supervisor::{PollConfig, PollEvent, PollEventKind, PollOutcome, PollingSupervisor};
pub use crate::{TaskWatch, TaskWatchError};
