use serde::Serialize;

use crate::{
    client::{ClientError, NewTask, TaskClient},
    job::{Job, ToolType},
};

/// Builder for the body of a task submission.
///
/// # Example
///
/// ```
/// # use taskwatch::job::{builder::TaskBuilder, ToolType};
/// # use serde_json::json;
/// let task = TaskBuilder::new(ToolType::Chart)
///     .with_title("Monthly revenue")
///     .with_description("Bar chart of revenue per region")
///     .with_parameter("chart_type", "bar")
///     .build();
///
/// assert_eq!(task.tool_type, ToolType::Chart);
/// assert_eq!(task.parameters, json!({"chart_type": "bar"}));
/// ```
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    title: Option<String>,
    description: Option<String>,
    tool_type: ToolType,
    parameters: serde_json::Map<String, serde_json::Value>,
}

impl TaskBuilder {
    pub fn new(tool_type: impl Into<ToolType>) -> Self {
        Self {
            title: None,
            description: None,
            tool_type: tool_type.into(),
            parameters: Default::default(),
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Merge every field of a serializable value into the parameters.
    ///
    /// Values that do not serialize to a JSON object are rejected.
    pub fn with_parameters<P: Serialize>(mut self, parameters: &P) -> Result<Self, ClientError> {
        match serde_json::to_value(parameters)? {
            serde_json::Value::Object(map) => {
                self.parameters.extend(map);
                Ok(self)
            }
            other => Err(ClientError::InvalidParameters(other.to_string())),
        }
    }

    pub fn build(self) -> NewTask {
        NewTask {
            title: self
                .title
                .unwrap_or_else(|| format!("{} task", self.tool_type)),
            description: self.description,
            tool_type: self.tool_type,
            parameters: serde_json::Value::Object(self.parameters),
        }
    }

    pub async fn submit_to<C: TaskClient + ?Sized>(self, client: &C) -> Result<Job, ClientError> {
        client.create(self.build()).await
    }
}

impl NewTask {
    pub fn builder(tool_type: impl Into<ToolType>) -> TaskBuilder {
        TaskBuilder::new(tool_type)
    }
}
