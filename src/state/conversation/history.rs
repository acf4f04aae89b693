use super::super::message::Message;
use super::tools::batch_from_message;
use super::{ConversationManager, ToolBatch};
use crate::segment::format_json;
use crate::types::{HistoryEntry, HistoryPayload, ToolCallRequest, ToolStatus};
use serde_json::Value;

const USER_KINDS: &[&str] = &["HumanMessage", "HumanMessageChunk", "human", "user"];
const TOOL_RESULT_KINDS: &[&str] = &["ToolMessage", "ToolMessageChunk", "tool"];

impl ConversationManager {
    /// Replaces the conversation with converted history and recovers the last
    /// batch that was still awaiting confirmation.
    pub fn load_history(&mut self, payload: &HistoryPayload) {
        let log = &mut self.log;
        let messages = convert_history(&payload.messages, || log.next_message_id());
        let restored = last_pending_batch(&messages);
        if let Some(batch) = &restored {
            tracing::info!(
                message_id = %batch.message_id,
                pending = batch.pending_ids().len(),
                "restored pending tool call batch from history"
            );
        }
        tracing::debug!(messages = messages.len(), "history loaded");
        self.log.replace_messages(messages);
        self.coordinator.restore(restored);
    }
}

pub(super) fn convert_history(
    entries: &[HistoryEntry],
    mut next_id: impl FnMut() -> String,
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(entries.len());

    for entry in entries {
        let kind = entry.kind.as_deref().unwrap_or_default();
        let content = history_content_text(&entry.content);

        if entry.is_user == Some(true) || USER_KINDS.contains(&kind) {
            messages.push(Message::user(next_id(), content));
            continue;
        }

        if TOOL_RESULT_KINDS.contains(&kind) {
            messages.push(Message::tool_result(next_id(), content, entry.name.clone()));
            continue;
        }

        let tools = history_tool_calls(entry.tool_calls.as_deref().unwrap_or_default());
        if !content.trim().is_empty() || !entry.think_segments.is_empty() {
            messages.push(Message::assistant(
                next_id(),
                content,
                entry.think_segments.clone(),
            ));
        }
        if !tools.is_empty() {
            let mut message = Message::tool_call(
                next_id(),
                tools.iter().map(|(tool, _)| tool.clone()).collect(),
            );
            for (tool, status) in tools {
                message.tool_statuses.insert(tool.id, status);
            }
            messages.push(message);
        }
    }

    messages
}

/// The last tool call message that still has undecided tools.
pub(super) fn last_pending_batch(messages: &[Message]) -> Option<ToolBatch> {
    messages
        .iter()
        .rev()
        .filter(|message| message.is_tool_call())
        .find_map(batch_from_message)
}

fn history_tool_calls(raw: &[Value]) -> Vec<(ToolCallRequest, ToolStatus)> {
    raw.iter()
        .filter_map(|value| {
            let Some(tool) = ToolCallRequest::from_value(value) else {
                tracing::debug!(%value, "skipping unrecognized history tool call");
                return None;
            };
            let status = value
                .get("tool_confirm_action")
                .and_then(Value::as_str)
                .and_then(ToolStatus::from_action)
                .unwrap_or(ToolStatus::ToConfirm);
            Some((tool, status))
        })
        .collect()
}

/// Flattens history content: a string, or a list of strings and `{text}` parts.
fn history_content_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(text) => Some(text.clone()),
                Value::Object(object) => object
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect(),
        Value::Object(_) => format_json(content),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(value: Value) -> Vec<HistoryEntry> {
        serde_json::from_value::<HistoryPayload>(json!({ "messages": value }))
            .expect("history payload")
            .messages
    }

    fn ids() -> impl FnMut() -> String {
        let mut next = 0;
        move || {
            next += 1;
            format!("h{next}")
        }
    }

    #[test]
    fn test_content_parts_are_joined() {
        assert_eq!(history_content_text(&json!(["a", {"text": "b"}, 3])), "ab");
        assert_eq!(history_content_text(&json!(null)), "");
        assert_eq!(history_content_text(&json!({"k": 1})), "{\n  \"k\": 1\n}");
    }

    #[test]
    fn test_tool_call_statuses_come_from_confirm_action() {
        let converted = convert_history(
            &entries(json!([{
                "type": "AIMessage",
                "content": "",
                "tool_calls": [
                    {"id": "a", "name": "add", "args": {"x": 1}, "tool_confirm_action": "confirmed"},
                    {"id": "b", "name": "mul", "args": {}},
                    {"name": "no id"}
                ]
            }])),
            ids(),
        );
        assert_eq!(converted.len(), 1);
        let message = &converted[0];
        assert_eq!(message.tool_calls.as_ref().map(Vec::len), Some(2));
        assert_eq!(message.status_of("a"), Some(ToolStatus::Confirmed));
        assert_eq!(message.status_of("b"), Some(ToolStatus::ToConfirm));
    }

    #[test]
    fn test_pending_batch_behind_a_resolved_one_is_restored() {
        let converted = convert_history(
            &entries(json!([
                {"type": "AIMessage", "content": "", "tool_calls": [{"id": "old", "name": "x"}]},
                {"type": "ToolMessage", "content": "ok", "name": "x"},
                {"type": "AIMessage", "content": "", "tool_calls": [
                    {"id": "new", "name": "y", "tool_confirm_action": "cancelled"}
                ]}
            ])),
            ids(),
        );
        let batch = last_pending_batch(&converted).expect("pending batch");
        assert_eq!(batch.message_id, "h1");
        assert_eq!(batch.pending_ids(), vec!["old".to_string()]);
    }

    #[test]
    fn test_fully_resolved_history_restores_nothing() {
        let converted = convert_history(
            &entries(json!([
                {"type": "AIMessage", "content": "", "tool_calls": [
                    {"id": "a", "name": "x", "tool_confirm_action": "confirmed"}
                ]},
                {"type": "AIMessage", "content": "", "tool_calls": [
                    {"id": "b", "name": "y", "tool_confirm_action": "cancelled"}
                ]}
            ])),
            ids(),
        );
        assert!(last_pending_batch(&converted).is_none());
    }
}
