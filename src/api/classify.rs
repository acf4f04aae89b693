use super::logging::{emit_classify_fallback, emit_malformed_tool_call};
use crate::types::{DataPayload, StreamEvent, ToolCallRequest};
use serde_json::Value;

pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_KIND: &str = "data";
const THINK_KIND: &str = "think";
const TOOL_CALL_KIND: &str = "tool_call";
const TOOL_MESSAGE_KIND: &str = "tool_message";

/// Classifies one block of the event stream.
///
/// Returns `None` when the block carries no payload or its tool call payload
/// is unusable. A `[DONE]` payload yields [`StreamEvent::Done`]; the caller is
/// responsible for not reading past it.
pub fn classify_block(block: &str) -> Option<StreamEvent> {
    let mut event_type = DATA_KIND.to_string();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.split('\n') {
        if let Some(rest) = line.strip_prefix("event: ") {
            event_type = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("data: ") {
            data_lines.push(rest);
        } else if let Some(rest) = line.strip_prefix("think: ") {
            event_type = THINK_KIND.to_string();
            data_lines.push(rest);
        } else if let Some(rest) = line.strip_prefix("tool_call: ") {
            event_type = TOOL_CALL_KIND.to_string();
            data_lines.push(rest);
        } else if let Some(rest) = line.strip_prefix("tool_message: ") {
            event_type = TOOL_MESSAGE_KIND.to_string();
            data_lines.push(rest);
        }
    }

    let joined = data_lines.join("\n");
    let payload = joined.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(StreamEvent::Done);
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(parsed) => {
            let kind = effective_kind(&event_type, &parsed);
            classify_json(kind, parsed, payload)
        }
        Err(error) => {
            emit_classify_fallback(&event_type, payload, &error);
            classify_text(&event_type, payload)
        }
    }
}

/// The declared kind wins unless it is the generic `data` kind, in which case
/// a `type` field inside the payload may refine it.
fn effective_kind(declared: &str, parsed: &Value) -> String {
    if declared != DATA_KIND {
        return declared.to_string();
    }
    parsed
        .get("type")
        .and_then(Value::as_str)
        .filter(|kind| !kind.is_empty())
        .unwrap_or(DATA_KIND)
        .to_string()
}

fn classify_json(kind: String, parsed: Value, raw: &str) -> Option<StreamEvent> {
    if kind == TOOL_CALL_KIND {
        return decode_tool_calls(&parsed, raw).map(StreamEvent::ToolCall);
    }

    let parsed = strip_type_field(parsed);
    match kind.as_str() {
        DATA_KIND => Some(StreamEvent::Data(json_payload(parsed, raw))),
        THINK_KIND => json_payload(parsed, raw)
            .text()
            .map(|text| StreamEvent::Think(text.to_string())),
        TOOL_MESSAGE_KIND => Some(tool_message_from_json(&parsed, raw)),
        _ => Some(StreamEvent::Other {
            kind,
            payload: json_payload(parsed, raw),
        }),
    }
}

fn classify_text(event_type: &str, payload: &str) -> Option<StreamEvent> {
    let text = payload.to_string();
    match event_type {
        DATA_KIND => Some(StreamEvent::Data(DataPayload::Text(text))),
        THINK_KIND => Some(StreamEvent::Think(text)),
        TOOL_MESSAGE_KIND => Some(StreamEvent::ToolMessage {
            content: text,
            tool_name: None,
        }),
        TOOL_CALL_KIND => {
            emit_malformed_tool_call(payload, "payload is not JSON");
            None
        }
        other => Some(StreamEvent::Other {
            kind: other.to_string(),
            payload: DataPayload::Text(text),
        }),
    }
}

fn strip_type_field(mut parsed: Value) -> Value {
    if let Some(object) = parsed.as_object_mut() {
        object.remove("type");
    }
    parsed
}

/// Objects and arrays stay structured; a JSON scalar is treated as text.
fn json_payload(parsed: Value, raw: &str) -> DataPayload {
    match parsed {
        Value::Object(_) | Value::Array(_) => DataPayload::Structured(parsed),
        Value::String(text) => DataPayload::Text(text),
        _ => DataPayload::Text(raw.to_string()),
    }
}

fn decode_tool_calls(parsed: &Value, raw: &str) -> Option<Vec<ToolCallRequest>> {
    let items: Vec<Value> = match parsed {
        Value::Array(items) => items.clone(),
        Value::Object(object) => {
            if let Some(Value::Array(items)) =
                object.get("tool_calls").or_else(|| object.get("toolCalls"))
            {
                items.clone()
            } else if ToolCallRequest::looks_like_single_call(parsed) {
                vec![parsed.clone()]
            } else {
                emit_malformed_tool_call(raw, "object has no tool call shape");
                return None;
            }
        }
        _ => {
            emit_malformed_tool_call(raw, "payload is neither a list nor an object");
            return None;
        }
    };

    let mut calls = Vec::with_capacity(items.len());
    for item in &items {
        match ToolCallRequest::from_value(item) {
            Some(call) => calls.push(call),
            None => {
                emit_malformed_tool_call(raw, "tool call entry has no id");
                return None;
            }
        }
    }
    Some(calls)
}

fn tool_message_from_json(parsed: &Value, raw: &str) -> StreamEvent {
    let nested = |key: &str| {
        parsed
            .get(key)
            .and_then(Value::as_str)
            .or_else(|| parsed.pointer(&format!("/message/kwargs/{key}")).and_then(Value::as_str))
            .or_else(|| parsed.pointer(&format!("/kwargs/{key}")).and_then(Value::as_str))
            .map(str::to_string)
    };

    let content = match parsed {
        Value::String(text) => text.clone(),
        Value::Object(_) => nested("content").unwrap_or_else(|| {
            serde_json::to_string_pretty(parsed).unwrap_or_else(|_| raw.to_string())
        }),
        _ => raw.to_string(),
    };

    StreamEvent::ToolMessage {
        content,
        tool_name: nested("name"),
    }
}
