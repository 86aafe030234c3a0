//! The I/O boundary towards the backend task API.
//!
//! [`TaskClient`] is a thin request/response wrapper without state of its own: everything the
//! rest of the crate knows about a job comes from a fresh call through this trait.
//!
//! An in memory implementation lives in [`memory`], the HTTP implementation in the
//! `taskwatch-http` crate.
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{Job, JobId, TaskStats, ToolType};

pub mod memory;

/// The backend job API as seen by the client.
#[async_trait]
pub trait TaskClient {
    /// Submit a new task. The returned job carries the backend-assigned id.
    async fn create(&self, task: NewTask) -> Result<Job, ClientError>;
    /// Fetch the current state of a single job.
    async fn get(&self, id: &JobId) -> Result<Job, ClientError>;
    /// List jobs, optionally restricted to a single tool.
    async fn list(&self, tool_type: Option<&ToolType>) -> Result<Vec<Job>, ClientError>;
    async fn delete(&self, id: &JobId) -> Result<(), ClientError>;
    /// Ask the backend to run a failed job again.
    async fn retry(&self, id: &JobId) -> Result<Job, ClientError>;
    /// Ask the backend to stop a job that has not finished yet.
    async fn cancel(&self, id: &JobId) -> Result<Job, ClientError>;
    async fn stats(&self) -> Result<TaskStats, ClientError>;
}

#[async_trait]
impl<C> TaskClient for Arc<C>
where
    C: TaskClient + Send + Sync + ?Sized,
{
    async fn create(&self, task: NewTask) -> Result<Job, ClientError> {
        self.as_ref().create(task).await
    }
    async fn get(&self, id: &JobId) -> Result<Job, ClientError> {
        self.as_ref().get(id).await
    }
    async fn list(&self, tool_type: Option<&ToolType>) -> Result<Vec<Job>, ClientError> {
        self.as_ref().list(tool_type).await
    }
    async fn delete(&self, id: &JobId) -> Result<(), ClientError> {
        self.as_ref().delete(id).await
    }
    async fn retry(&self, id: &JobId) -> Result<Job, ClientError> {
        self.as_ref().retry(id).await
    }
    async fn cancel(&self, id: &JobId) -> Result<Job, ClientError> {
        self.as_ref().cancel(id).await
    }
    async fn stats(&self) -> Result<TaskStats, ClientError> {
        self.as_ref().stats().await
    }
}

/// The body of a task submission.
///
/// Usually constructed via [`crate::job::builder::TaskBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub tool_type: ToolType,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Job {0} does not exist")]
    NotFound(JobId),
    #[error("Backend rejected the request with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Failed to reach the backend")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Error encoding or decoding data")]
    EncodeDecode(#[from] serde_json::Error),
    #[error("Task parameters must be a JSON object, got {0}")]
    InvalidParameters(String),
    #[error("System in bad state")]
    BadState,
}

impl ClientError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::BadState => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound(_) | Self::EncodeDecode(_) | Self::InvalidParameters(_) => false,
        }
    }
}
