//! The two independent failure signals of a finished task.
//!
//! The backend reports a protocol status (`completed`/`failed`), while tool services may embed
//! their own verdict inside the result payload. A task can be protocol-complete and still be a
//! domain failure, e.g. a slide deck whose PDF compilation failed:
//!
//! ```json
//! {"status": "completed", "result": {"success": false, "error": "latex compilation failed"}}
//! ```
//!
//! [`TaskOutcome`] keeps both axes so callers decide what to display without re-inspecting the
//! payload.
use serde_json::Value;

use super::{Job, JobStatus};

/// Message used when the backend reports a failure without any detail.
pub const GENERIC_FAILURE_MESSAGE: &str = "Task failed";
/// Message used when the backend reports a cancelled task.
pub const CANCELLED_MESSAGE: &str = "Task was cancelled";
/// Message used when a result reports `success: false` without an error text.
pub const GENERIC_DOMAIN_FAILURE_MESSAGE: &str = "Task reported an unsuccessful result";

/// What the backend said about the task's lifecycle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProtocolStatus {
    Completed,
    Failed,
    Cancelled,
}

/// What the tool said about the work it produced.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DomainOutcome {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TaskOutcome {
    pub protocol: ProtocolStatus,
    pub domain: DomainOutcome,
}

impl TaskOutcome {
    /// Classify a terminal job. Returns [`None`] for jobs that are still pending or running.
    pub fn from_job(job: &Job) -> Option<Self> {
        let outcome = match job.status {
            JobStatus::Pending | JobStatus::Running => return None,
            JobStatus::Completed => Self {
                protocol: ProtocolStatus::Completed,
                domain: inspect_result(job.result.as_ref()),
            },
            JobStatus::Failed => Self {
                protocol: ProtocolStatus::Failed,
                domain: DomainOutcome::Failed {
                    reason: failure_message(job),
                },
            },
            JobStatus::Cancelled => Self {
                protocol: ProtocolStatus::Cancelled,
                domain: DomainOutcome::Failed {
                    reason: job
                        .error_message
                        .clone()
                        .filter(|message| !message.trim().is_empty())
                        .unwrap_or_else(|| CANCELLED_MESSAGE.to_owned()),
                },
            },
        };
        Some(outcome)
    }

    /// Whether the task should be shown as failed, on either axis.
    pub fn is_failure(&self) -> bool {
        self.protocol != ProtocolStatus::Completed
            || matches!(self.domain, DomainOutcome::Failed { .. })
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.domain {
            DomainOutcome::Failed { reason } => Some(reason),
            DomainOutcome::Succeeded => None,
        }
    }
}

/// The most specific failure message available for a job.
pub fn failure_message(job: &Job) -> String {
    job.error_message
        .as_deref()
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_owned())
}

fn inspect_result(result: Option<&Value>) -> DomainOutcome {
    let Some(Value::Object(result)) = result else {
        return DomainOutcome::Succeeded;
    };

    let error_text = result
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|error| !error.is_empty());

    let reported_failure = matches!(result.get("success"), Some(Value::Bool(false)))
        || matches!(result.get("status").and_then(Value::as_str), Some("error"));

    match (reported_failure, error_text) {
        (_, Some(error)) => DomainOutcome::Failed {
            reason: error.to_owned(),
        },
        (true, None) => DomainOutcome::Failed {
            reason: result
                .get("message")
                .and_then(Value::as_str)
                .filter(|message| !message.trim().is_empty())
                .unwrap_or(GENERIC_DOMAIN_FAILURE_MESSAGE)
                .to_owned(),
        },
        (false, None) => DomainOutcome::Succeeded,
    }
}
