use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod artifact;
pub mod builder;
pub mod outcome;

/// The opaque identifier the backend assigns to a task when it is created.
#[derive(Debug, Eq, PartialEq, Hash, Clone, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A generation task as reported by the backend.
///
/// The client never writes `status`; it is only ever replaced by a fresher copy fetched from the
/// backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tool_type: Option<ToolType>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Backend timestamps are naive and in UTC. Unparseable values are dropped rather than failing
/// the whole job.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.as_deref().and_then(crate::event::parse_timestamp))
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// The lifecycle state of a [`Job`].
///
/// Statuses only move forward: once a job is [`JobStatus::Completed`], [`JobStatus::Failed`] or
/// [`JobStatus::Cancelled`] it will not change again and is never polled again.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The backend tool a task is dispatched to.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToolType {
    Ppt,
    Chart,
    Scheduler,
    ApiDoc,
    Other(String),
}

impl ToolType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ppt => "ppt",
            Self::Chart => "chart",
            Self::Scheduler => "scheduler",
            Self::ApiDoc => "api_doc",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for ToolType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ppt" | "ppt_generator" => Self::Ppt,
            "chart" | "chart_generator" => Self::Chart,
            "scheduler" => Self::Scheduler,
            "api_doc" | "api-docs" | "api_doc_generator" => Self::ApiDoc,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for ToolType {
    fn from(value: &str) -> Self {
        value.to_owned().into()
    }
}

impl From<ToolType> for String {
    fn from(value: ToolType) -> Self {
        match value {
            ToolType::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

impl Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate counters as reported by the backend's statistics endpoint.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: u64,
    pub completed: u64,
    pub pending: u64,
    pub failed: u64,
}

#[cfg(test)]
pub(crate) mod test {
    use serde_json::json;

    use super::*;

    impl Job {
        pub(crate) const DEFAULT_ID: &'static str = "job-1";

        pub(crate) fn raw_job() -> Self {
            Self {
                id: Self::DEFAULT_ID.into(),
                status: JobStatus::Pending,
                title: "Quarterly report".to_owned(),
                description: None,
                tool_type: Some(ToolType::Ppt),
                parameters: json!({}),
                result: None,
                error_message: None,
                created_at: None,
                updated_at: None,
                started_at: None,
                completed_at: None,
            }
        }

        pub(crate) fn with_id(self, id: impl Into<JobId>) -> Self {
            Self {
                id: id.into(),
                ..self
            }
        }

        pub(crate) fn with_status(self, status: JobStatus) -> Self {
            Self { status, ..self }
        }

        pub(crate) fn with_tool_type(self, tool_type: ToolType) -> Self {
            Self {
                tool_type: Some(tool_type),
                ..self
            }
        }

        pub(crate) fn with_parameters(self, parameters: serde_json::Value) -> Self {
            Self { parameters, ..self }
        }

        pub(crate) fn with_result(self, result: serde_json::Value) -> Self {
            Self {
                result: Some(result),
                ..self
            }
        }

        pub(crate) fn with_error_message(self, message: impl Into<String>) -> Self {
            Self {
                error_message: Some(message.into()),
                ..self
            }
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn deserialize_backend_record() {
        let job: Job = serde_json::from_value(json!({
            "id": "6f1c8f9e-4d0a-4a57-a1b3-2f1b9d7c0e11",
            "status": "running",
            "title": "Sales chart",
            "description": null,
            "tool_type": "chart_generator",
            "parameters": {"chart_type": "bar"},
            "result": null,
            "error_message": null,
            "created_at": "2026-10-18T08:00:00Z",
            "updated_at": "2026-10-18T08:00:05Z"
        }))
        .unwrap();

        assert_eq!(job.id.as_str(), "6f1c8f9e-4d0a-4a57-a1b3-2f1b9d7c0e11");
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.tool_type, Some(ToolType::Chart));
        assert!(job.result.is_none());
        assert!(job.started_at.is_none());
    }

    #[test]
    fn job_id_displays_bare() {
        let id = JobId::from("6f1c8f9e-4d0a");
        assert_eq!(id.to_string(), "6f1c8f9e-4d0a");
        assert_eq!(format!("/tasks/{id}"), "/tasks/6f1c8f9e-4d0a");
    }

    #[test]
    fn naive_timestamps_are_utc() {
        let job: Job = serde_json::from_value(json!({
            "id": "job-7",
            "status": "completed",
            "created_at": "2026-10-18T08:00:00.123456",
            "completed_at": "not a timestamp"
        }))
        .unwrap();

        assert_eq!(
            job.created_at.map(|t| t.to_rfc3339()),
            Some("2026-10-18T08:00:00.123456+00:00".to_owned())
        );
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn tool_type_keeps_unknown_names() {
        let tool: ToolType = "translation".into();
        assert_eq!(tool, ToolType::Other("translation".to_owned()));
        assert_eq!(String::from(tool), "translation");
        assert_eq!(String::from(ToolType::ApiDoc), "api_doc");
    }
}
