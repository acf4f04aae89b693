use crate::segment::{segment_content, ContentSegments};
use crate::types::{ToolCallRequest, ToolStatus};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation log.
///
/// Only the conversation log mutates a message, except for `tool_statuses`,
/// which the tool call coordinator updates through the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub streaming: bool,
    /// A think segment is being displayed and no content has arrived since.
    pub thinking: bool,
    pub think_segments: Vec<String>,
    pub active_think_index: Option<usize>,
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Missing entries have no status yet.
    pub tool_statuses: BTreeMap<String, ToolStatus>,
    pub segments: Option<ContentSegments>,
    pub is_tool_result: bool,
    pub tool_name: Option<String>,
    pub is_error_notice: bool,
}

impl Message {
    fn blank(id: String, role: Role) -> Self {
        Self {
            id,
            role,
            content: String::new(),
            streaming: false,
            thinking: false,
            think_segments: Vec::new(),
            active_think_index: None,
            tool_calls: None,
            tool_statuses: BTreeMap::new(),
            segments: None,
            is_tool_result: false,
            tool_name: None,
            is_error_notice: false,
        }
    }

    pub fn user(id: String, content: String) -> Self {
        Self {
            content,
            ..Self::blank(id, Role::User)
        }
    }

    pub fn streaming_assistant(id: String) -> Self {
        Self {
            streaming: true,
            ..Self::blank(id, Role::Assistant)
        }
    }

    /// A finished assistant message with its segments computed.
    pub fn assistant(id: String, content: String, think_segments: Vec<String>) -> Self {
        let mut message = Self {
            content,
            think_segments,
            ..Self::blank(id, Role::Assistant)
        };
        message.refresh_segments();
        message
    }

    pub fn tool_result(id: String, content: String, tool_name: Option<String>) -> Self {
        let mut message = Self {
            content,
            is_tool_result: true,
            tool_name,
            ..Self::blank(id, Role::Assistant)
        };
        message.refresh_segments();
        message
    }

    pub fn tool_call(id: String, tools: Vec<ToolCallRequest>) -> Self {
        let tool_statuses = tools
            .iter()
            .map(|tool| (tool.id.clone(), ToolStatus::ToConfirm))
            .collect();
        Self {
            tool_calls: Some(tools),
            tool_statuses,
            ..Self::blank(id, Role::Assistant)
        }
    }

    pub fn error_notice(id: String, content: String) -> Self {
        let mut message = Self {
            content,
            is_error_notice: true,
            ..Self::blank(id, Role::Assistant)
        };
        message.refresh_segments();
        message
    }

    pub fn is_tool_call(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tools| !tools.is_empty())
    }

    pub fn status_of(&self, tool_id: &str) -> Option<ToolStatus> {
        self.tool_statuses.get(tool_id).copied()
    }

    /// True for a tool call message with at least one tool not yet confirmed or cancelled.
    pub fn has_pending_tools(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tools| {
            tools.iter().any(|tool| {
                !self
                    .status_of(&tool.id)
                    .is_some_and(ToolStatus::is_terminal)
            })
        })
    }

    /// Recomputes `segments` from the current content.
    pub fn refresh_segments(&mut self) {
        self.segments = Some(segment_content(&self.content));
    }
}
