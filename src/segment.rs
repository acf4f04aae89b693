//! Classification of message text into prose and embedded JSON.
//!
//! A message is either entirely JSON (an object or array once trimmed) or
//! prose that may embed JSON fragments. Fragments are found in two passes:
//! fenced code blocks whose interior parses, then free-standing `{...}` spans
//! outside any fence. Each confirmed fragment becomes a [`JsonBlock`] and is
//! stood in for by a placeholder token in [`ContentSegments::placeholder_text`].

use serde::Serialize;
use serde_json::Value;

const FENCE: &str = "```";
const FENCE_JSON_TAG: &str = "json";
/// Shortest free-standing span considered, e.g. `{"a":1}`.
const MIN_INLINE_JSON_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSegments {
    PureJson { formatted: String },
    Mixed { segments: Vec<Segment> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    JsonBlock(JsonBlock),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JsonBlock {
    /// Placeholder token, unique within one message.
    pub id: String,
    /// Two-space indented rendering.
    pub formatted: String,
    /// The exact source span the block replaced, fences included.
    pub source: String,
}

impl ContentSegments {
    pub fn is_pure_json(&self) -> bool {
        matches!(self, Self::PureJson { .. })
    }

    pub fn json_blocks(&self) -> impl Iterator<Item = &JsonBlock> {
        let segments = match self {
            Self::PureJson { .. } => &[][..],
            Self::Mixed { segments } => segments.as_slice(),
        };
        segments.iter().filter_map(|segment| match segment {
            Segment::JsonBlock(block) => Some(block),
            Segment::Text { .. } => None,
        })
    }

    /// The content with every fragment replaced by its placeholder token.
    pub fn placeholder_text(&self) -> String {
        match self {
            Self::PureJson { formatted } => formatted.clone(),
            Self::Mixed { segments } => segments
                .iter()
                .map(|segment| match segment {
                    Segment::Text { text } => text.as_str(),
                    Segment::JsonBlock(block) => block.id.as_str(),
                })
                .collect(),
        }
    }

    /// The content with every fragment's original source substituted back.
    /// For `Mixed` this reproduces the segmented input exactly.
    pub fn reassemble(&self) -> String {
        match self {
            Self::PureJson { formatted } => formatted.clone(),
            Self::Mixed { segments } => segments
                .iter()
                .map(|segment| match segment {
                    Segment::Text { text } => text.as_str(),
                    Segment::JsonBlock(block) => block.source.as_str(),
                })
                .collect(),
        }
    }
}

/// Parses `text` (trimmed) as JSON and keeps it only if it is an object or array.
pub fn parse_structured(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Recomputes the segments of `content`. Deterministic: the same input always
/// yields the same segments and block ids.
pub fn segment_content(content: &str) -> ContentSegments {
    if let Some(value) = parse_structured(content) {
        return ContentSegments::PureJson {
            formatted: format_json(&value),
        };
    }

    let fences = fenced_spans(content);
    let mut fragments: Vec<Fragment> = fences
        .iter()
        .filter_map(|fence| {
            parse_structured(&content[fence.interior.clone()]).map(|value| Fragment {
                start: fence.start,
                end: fence.end,
                id: String::new(),
                formatted: format_json(&value),
            })
        })
        .collect();
    for (index, fragment) in fragments.iter_mut().enumerate() {
        fragment.id = placeholder_id(index);
    }

    let mut inline = Vec::new();
    let mut gap_start = 0;
    for fence in &fences {
        inline.extend(inline_spans(content, gap_start, fence.start));
        gap_start = fence.end;
    }
    inline.extend(inline_spans(content, gap_start, content.len()));

    // Inline ids continue after the fenced ones, numbered from last to first.
    let fenced_count = fragments.len();
    for (offset, fragment) in inline.iter_mut().rev().enumerate() {
        fragment.id = placeholder_id(fenced_count + offset);
    }
    fragments.extend(inline);
    fragments.sort_by_key(|fragment| fragment.start);

    let mut segments = Vec::with_capacity(fragments.len() * 2 + 1);
    let mut cursor = 0;
    for fragment in fragments {
        if fragment.start > cursor {
            segments.push(Segment::Text {
                text: content[cursor..fragment.start].to_string(),
            });
        }
        segments.push(Segment::JsonBlock(JsonBlock {
            id: fragment.id,
            formatted: fragment.formatted,
            source: content[fragment.start..fragment.end].to_string(),
        }));
        cursor = fragment.end;
    }
    if cursor < content.len() || segments.is_empty() {
        segments.push(Segment::Text {
            text: content[cursor..].to_string(),
        });
    }

    ContentSegments::Mixed { segments }
}

fn placeholder_id(index: usize) -> String {
    format!("__JSON_BLOCK_{index}__")
}

struct Fragment {
    start: usize,
    end: usize,
    id: String,
    formatted: String,
}

struct FencedSpan {
    start: usize,
    end: usize,
    interior: std::ops::Range<usize>,
}

/// Pairs triple-backtick delimiters left to right. An unclosed fence ends the scan.
fn fenced_spans(text: &str) -> Vec<FencedSpan> {
    let mut spans = Vec::new();
    let mut position = 0;

    while let Some(open) = text[position..].find(FENCE) {
        let start = position + open;
        let after_open = start + FENCE.len();
        let Some(close) = text[after_open..].find(FENCE) else {
            break;
        };
        let close = after_open + close;
        let interior_start = if text[after_open..close].starts_with(FENCE_JSON_TAG) {
            after_open + FENCE_JSON_TAG.len()
        } else {
            after_open
        };

        spans.push(FencedSpan {
            start,
            end: close + FENCE.len(),
            interior: interior_start..close,
        });
        position = close + FENCE.len();
    }
    spans
}

fn is_identifier_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Free-standing JSON objects within `text[from..to]`.
fn inline_spans(text: &str, from: usize, to: usize) -> Vec<Fragment> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut index = from;

    while index < to {
        if bytes[index] != b'{' || (index > 0 && is_identifier_byte(bytes[index - 1])) {
            index += 1;
            continue;
        }

        let Some(end) = balanced_object_end(bytes, index, to) else {
            index += 1;
            continue;
        };
        let trailing_ok = bytes
            .get(end)
            .map_or(true, |next| !is_identifier_byte(*next));
        if end - index >= MIN_INLINE_JSON_LEN && trailing_ok {
            if let Some(value) = parse_structured(&text[index..end]) {
                spans.push(Fragment {
                    start: index,
                    end,
                    id: String::new(),
                    formatted: format_json(&value),
                });
                index = end;
                continue;
            }
        }
        index += 1;
    }
    spans
}

/// End (exclusive) of the brace-balanced span opening at `start`, skipping the
/// contents of quoted strings including escaped quotes.
fn balanced_object_end(bytes: &[u8], start: usize, limit: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut index = start;
    let mut in_string = false;

    while index < limit {
        let byte = bytes[index];
        if in_string {
            match byte {
                b'\\' => index += 1,
                b'"' => in_string = false,
                _ => {}
            }
        } else {
            match byte {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(index + 1);
                    }
                }
                _ => {}
            }
        }
        index += 1;
    }
    None
}
