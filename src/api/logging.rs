use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;

const DEBUG_PAYLOAD_ENV: &str = "CHATSTREAM_DEBUG_PAYLOAD";
const API_LOG_PATH_ENV: &str = "CHATSTREAM_API_LOG_PATH";
const PAYLOAD_PREVIEW_CHARS: usize = 200;

pub fn debug_payload_enabled() -> bool {
    std::env::var(DEBUG_PAYLOAD_ENV)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

pub fn emit_debug_payload(request_url: &str, kind: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    let message = format!(
        "CHATSTREAM DEBUG payload_request url={request_url} kind={kind}\npayload:\n{formatted_payload}\n"
    );
    if !append_to_configured_log(&message) {
        tracing::debug!(url = request_url, kind, payload = %formatted_payload, "outbound request");
    }
}

/// A `tool_call` event whose payload could not be turned into a tool list.
pub fn emit_malformed_tool_call(payload: &str, reason: &str) {
    let preview = payload_preview(payload);
    let message =
        format!("CHATSTREAM WARN malformed_tool_call reason={reason}\ndata:\n{preview}\n");
    if !append_to_configured_log(&message) {
        tracing::warn!(reason, data = %preview, "dropping malformed tool_call event");
    }
}

/// A stream block that was classified without its JSON interpretation.
pub fn emit_classify_fallback(event_type: &str, payload: &str, parse_error: &serde_json::Error) {
    let preview = payload_preview(payload);
    let message = format!(
        "CHATSTREAM DEBUG sse_plain_text event_type={event_type} error={parse_error}\ndata:\n{preview}\n"
    );
    if !append_to_configured_log(&message) {
        tracing::trace!(event_type, error = %parse_error, "payload is not JSON, treating as text");
    }
}

fn payload_preview(payload: &str) -> String {
    let mut preview: String = payload.chars().take(PAYLOAD_PREVIEW_CHARS).collect();
    if preview.len() < payload.len() {
        preview.push_str("...");
    }
    preview
}

fn append_to_configured_log(message: &str) -> bool {
    match resolve_log_path() {
        Some(path) => append_log_file(&path, message).is_ok(),
        None => false,
    }
}

fn resolve_log_path() -> Option<String> {
    std::env::var(API_LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn append_log_file(path: &str, message: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(message.as_bytes())
}
