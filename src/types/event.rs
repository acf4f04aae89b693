use super::api::ToolCallRequest;
use serde_json::Value;

/// One classified unit of the response stream, decoded once at the classifier
/// boundary. Downstream code matches on the variant and never re-inspects the
/// raw payload shape.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Data(DataPayload),
    Think(String),
    ToolCall(Vec<ToolCallRequest>),
    ToolMessage {
        content: String,
        tool_name: Option<String>,
    },
    /// An event kind outside the known set, e.g. a backend `error` event.
    Other {
        kind: String,
        payload: DataPayload,
    },
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataPayload {
    Text(String),
    /// A JSON object (with its `type` field removed) or array.
    Structured(Value),
}

impl DataPayload {
    /// The displayable text this payload carries, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(value) => value.get("content").and_then(Value::as_str),
        }
    }
}
