//! Calendar events created through the scheduler tool, and the local cache they are read from.
//!
//! Events are never edited locally: the cache is refilled as a whole from the results of
//! completed scheduler jobs on every list refresh.
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::{outcome::TaskOutcome, Job, JobStatus, ToolType};

/// Used when a scheduler job does not say how early to remind.
pub const DEFAULT_REMINDER_MINUTES: u32 = 15;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }
}

impl From<Priority> for &'static str {
    fn from(value: Priority) -> Self {
        value.as_str()
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum EventStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<String> for EventStatus {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "completed" => Self::Completed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

impl From<EventStatus> for &'static str {
    fn from(value: EventStatus) -> Self {
        value.as_str()
    }
}

/// How an event recurs. Carried for display only.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum RepeatType {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

impl RepeatType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl From<String> for RepeatType {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "daily" => Self::Daily,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            _ => Self::None,
        }
    }
}

impl From<RepeatType> for &'static str {
    fn from(value: RepeatType) -> Self {
        value.as_str()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reminder_minutes: Option<u32>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub repeat_type: RepeatType,
}

impl ScheduledEvent {
    /// The window `[start_time - reminder_minutes, start_time)` in which a reminder may fire.
    ///
    /// Only pending events with a positive lead time have one.
    pub fn reminder_window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        if self.status != EventStatus::Pending {
            return None;
        }
        let minutes = self.reminder_minutes.filter(|minutes| *minutes > 0)?;
        let opens = self
            .start_time
            .checked_sub_signed(Duration::minutes(i64::from(minutes)))?;
        Some((opens, self.start_time))
    }

    /// Whether a reminder for this event is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.reminder_window()
            .is_some_and(|(opens, start)| opens <= now && now < start)
    }

    /// The event a completed scheduler job created.
    ///
    /// Returns [`None`] for other tools, for jobs that did not complete, for results reporting
    /// a failure, and for parameters without a readable start time.
    pub fn from_job(job: &Job) -> Option<Self> {
        if job.tool_type != Some(ToolType::Scheduler) || job.status != JobStatus::Completed {
            return None;
        }
        if TaskOutcome::from_job(job)?.is_failure() {
            return None;
        }

        let parameters = &job.parameters;
        let result = job.result.as_ref().unwrap_or(&Value::Null);
        let field = |name: &str| {
            parameters
                .get(name)
                .filter(|value| !value.is_null())
                .or_else(|| result.get(name).filter(|value| !value.is_null()))
        };
        let text = |name: &str| field(name).and_then(Value::as_str).map(ToOwned::to_owned);

        let start_time = field("start_time").and_then(Value::as_str).and_then(parse_timestamp)?;
        let reminder_minutes = match field("reminder_minutes") {
            None => Some(DEFAULT_REMINDER_MINUTES),
            Some(minutes) => minutes.as_u64().and_then(|minutes| u32::try_from(minutes).ok()),
        };

        Some(Self {
            id: result
                .get("event_id")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| job.id.as_str().to_owned()),
            title: text("title").unwrap_or_else(|| job.title.clone()),
            description: text("description")
                .or_else(|| job.description.clone())
                .unwrap_or_default(),
            start_time,
            end_time: field("end_time").and_then(Value::as_str).and_then(parse_timestamp),
            reminder_minutes,
            priority: text("priority").map(Priority::from).unwrap_or_default(),
            status: text("status").map(EventStatus::from).unwrap_or_default(),
            repeat_type: text("repeat_type").map(RepeatType::from).unwrap_or_default(),
        })
    }
}

/// Every event created by the given jobs, in job order.
pub fn events_from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Vec<ScheduledEvent> {
    jobs.into_iter().filter_map(ScheduledEvent::from_job).collect()
}

/// Accepts RFC 3339 timestamps, and naive ISO timestamps which are read as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Shared read cache of scheduled events.
///
/// Cloning is cheap and every clone sees the same events.
#[derive(Debug, Clone, Default)]
pub struct EventCache {
    events: Arc<RwLock<Vec<ScheduledEvent>>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a complete new set of events.
    pub fn replace(&self, events: Vec<ScheduledEvent>) {
        let mut current = self
            .events
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::trace!(previous = current.len(), next = events.len(), "Replacing event cache");
        *current = events;
    }

    pub fn snapshot(&self) -> Vec<ScheduledEvent> {
        self.events
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
