use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A side-effecting action proposed by the backend. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallRequest {
    #[serde(rename = "tool_call_id")]
    pub id: String,
    #[serde(rename = "tool_call_name")]
    pub name: String,
    #[serde(rename = "tool_call_args")]
    pub args: Value,
}

impl ToolCallRequest {
    /// Decodes one tool call from any of the shapes the backend has used:
    /// `tool_call_*` keys, bare `id`/`name`/`args`, or legacy `tool_*` keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let id = first_scalar(object, &["tool_call_id", "id", "tool_id"])?;
        if id.is_empty() {
            return None;
        }
        let name = first_scalar(object, &["tool_call_name", "name", "tool_name"]).unwrap_or_default();
        let args = ["tool_call_args", "args", "tool_args"]
            .iter()
            .find_map(|key| object.get(*key).filter(|value| !value.is_null()))
            .cloned()
            .unwrap_or_else(default_json_object);

        Some(Self { id, name, args })
    }

    /// True when the object carries any key that identifies a single tool call.
    pub fn looks_like_single_call(value: &Value) -> bool {
        value.as_object().is_some_and(|object| {
            ["tool_call_name", "tool_name", "tool_id"]
                .iter()
                .any(|key| object.get(*key).is_some_and(|v| !v.is_null()))
        })
    }
}

fn first_scalar(object: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

fn default_json_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Confirmation state of one tool call. `Confirmed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    ToConfirm,
    Confirmed,
    Cancelled,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }

    /// Maps a `tool_confirm_action` value from a history payload.
    pub fn from_action(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "confirmed" | "confirm" => Some(Self::Confirmed),
            "cancelled" | "canceled" | "cancel" => Some(Self::Cancelled),
            "to_confirm" | "" => Some(Self::ToConfirm),
            _ => None,
        }
    }
}

/// Body of a new user turn.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub message: String,
    #[serde(rename = "partId")]
    pub part_id: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallConfirmation {
    pub tool_call_id: String,
    pub tool_call_name: String,
    pub tool_call_args: Value,
    pub tool_confirm_action: ToolStatus,
}

/// Body sent once every tool of a batch has reached a terminal status.
#[derive(Debug, Clone, Serialize)]
pub struct ToolConfirmationRequest {
    pub message: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub tool_calls: Vec<ToolCallConfirmation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LegacyToolAction {
    Confirm,
    Cancel,
}

/// Single-tool confirmation understood by older backends.
#[derive(Debug, Clone, Serialize)]
pub struct LegacyToolConfirmation {
    pub message: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub tool_name: String,
    pub tool_id: String,
    pub tool_action: LegacyToolAction,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutboundRequest {
    Message(MessageRequest),
    ToolConfirmation(ToolConfirmationRequest),
    LegacyToolConfirmation(LegacyToolConfirmation),
}

impl OutboundRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::ToolConfirmation(_) => "tool_confirmation",
            Self::LegacyToolConfirmation(_) => "legacy_tool_confirmation",
        }
    }
}

/// History payload handed to the core by the (external) history source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryPayload {
    #[serde(default)]
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(rename = "isUser", default)]
    pub is_user: Option<bool>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub tool_calls: Option<Vec<Value>>,
    /// Tool name of a `ToolMessage` entry.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "thinkContentList", default)]
    pub think_segments: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_request_accepts_all_key_styles() {
        let current = json!({"tool_call_id":"a","tool_call_name":"add","tool_call_args":{"x":1}});
        let bare = json!({"id":"a","name":"add","args":{"x":1},"type":"tool_call"});
        let legacy = json!({"tool_id":"a","tool_name":"add","tool_args":{"x":1}});

        let expected = ToolCallRequest {
            id: "a".to_string(),
            name: "add".to_string(),
            args: json!({"x":1}),
        };
        assert_eq!(ToolCallRequest::from_value(&current), Some(expected.clone()));
        assert_eq!(ToolCallRequest::from_value(&bare), Some(expected.clone()));
        assert_eq!(ToolCallRequest::from_value(&legacy), Some(expected));
    }

    #[test]
    fn test_tool_call_request_requires_an_id() {
        assert!(ToolCallRequest::from_value(&json!({"tool_call_name":"add"})).is_none());
        assert!(ToolCallRequest::from_value(&json!({"tool_call_id":""})).is_none());
        assert!(ToolCallRequest::from_value(&json!("a")).is_none());
    }

    #[test]
    fn test_missing_args_default_to_empty_object() {
        let call = ToolCallRequest::from_value(&json!({"tool_call_id": 7})).unwrap();
        assert_eq!(call.id, "7");
        assert_eq!(call.args, json!({}));
    }

    #[test]
    fn test_tool_confirmation_wire_shape() {
        let body = OutboundRequest::ToolConfirmation(ToolConfirmationRequest {
            message: String::new(),
            session_id: "s1".to_string(),
            tool_calls: vec![ToolCallConfirmation {
                tool_call_id: "a".to_string(),
                tool_call_name: "add".to_string(),
                tool_call_args: json!({"x":1}),
                tool_confirm_action: ToolStatus::Cancelled,
            }],
        });
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "message": "",
                "sessionId": "s1",
                "tool_calls": [{
                    "tool_call_id": "a",
                    "tool_call_name": "add",
                    "tool_call_args": {"x":1},
                    "tool_confirm_action": "cancelled"
                }]
            })
        );
    }

    #[test]
    fn test_message_and_legacy_wire_shapes() {
        let message = OutboundRequest::Message(MessageRequest {
            message: "hi".to_string(),
            part_id: None,
            session_id: "s1".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({"message":"hi","partId":null,"sessionId":"s1"})
        );

        let legacy = OutboundRequest::LegacyToolConfirmation(LegacyToolConfirmation {
            message: String::new(),
            session_id: "s1".to_string(),
            tool_name: "add".to_string(),
            tool_id: "a".to_string(),
            tool_action: LegacyToolAction::Confirm,
        });
        assert_eq!(
            serde_json::to_value(&legacy).unwrap(),
            json!({"message":"","sessionId":"s1","tool_name":"add","tool_id":"a","tool_action":"confirm"})
        );
    }

    #[test]
    fn test_status_from_history_action() {
        assert_eq!(ToolStatus::from_action("confirmed"), Some(ToolStatus::Confirmed));
        assert_eq!(ToolStatus::from_action("cancel"), Some(ToolStatus::Cancelled));
        assert_eq!(ToolStatus::from_action("to_confirm"), Some(ToolStatus::ToConfirm));
        assert_eq!(ToolStatus::from_action("maybe"), None);
        assert!(!ToolStatus::ToConfirm.is_terminal());
        assert!(ToolStatus::Cancelled.is_terminal());
    }
}
