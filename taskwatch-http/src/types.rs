use serde::{Deserialize, Serialize};
use taskwatch::job::ToolType;

/// The error body of a rejected request: `{"detail": "..."}`, or `{"message": "..."}` from some
/// tool services.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    pub(crate) fn into_message(self) -> Option<String> {
        let detail = self.detail.and_then(|detail| match detail {
            serde_json::Value::String(detail) => Some(detail),
            serde_json::Value::Null => None,
            // Validation errors come as a list of objects.
            other => Some(other.to_string()),
        });
        detail
            .or(self.message)
            .filter(|message| !message.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ListQuery<'a> {
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<&'a str>,
}

impl<'a> ListQuery<'a> {
    pub(crate) fn new(limit: u32, tool_type: Option<&'a ToolType>) -> Self {
        Self {
            limit,
            tool_type: tool_type.map(ToolType::as_str),
        }
    }
}
