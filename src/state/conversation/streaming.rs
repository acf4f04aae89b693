use super::super::message::Message;
use super::{ConversationLog, ConversationUpdate};
use crate::error::ChatError;
use crate::types::{ToolCallRequest, ToolStatus};
use tokio::sync::mpsc;

impl Default for ConversationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationLog {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            streaming_id: None,
            next_id: 1,
            updates_tx: None,
        }
    }

    pub fn with_updates(mut self, updates_tx: mpsc::UnboundedSender<ConversationUpdate>) -> Self {
        self.updates_tx = Some(updates_tx);
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    pub fn streaming_message(&self) -> Option<&Message> {
        self.streaming_id.as_deref().and_then(|id| self.message(id))
    }

    /// Ids sort in conversation order.
    pub(super) fn next_message_id(&mut self) -> String {
        let id = format!("msg-{:06}", self.next_id);
        self.next_id += 1;
        id
    }

    pub fn append_user_message(&mut self, text: impl Into<String>) -> String {
        let id = self.next_message_id();
        self.push(Message::user(id.clone(), text.into()));
        id
    }

    pub fn begin_streaming_assistant_message(&mut self) -> Result<String, ChatError> {
        if self.streaming_id.is_some() {
            return Err(ChatError::StreamingInProgress);
        }
        let id = self.next_message_id();
        self.push(Message::streaming_assistant(id.clone()));
        self.streaming_id = Some(id.clone());
        Ok(id)
    }

    pub fn on_think(&mut self, text: &str) {
        let Some(message) = self.streaming_mut() else {
            tracing::debug!("think segment without a streaming message ignored");
            return;
        };
        message.think_segments.push(text.to_string());
        message.active_think_index = Some(message.think_segments.len() - 1);
        message.thinking = true;
        let snapshot = message.clone();
        self.emit(ConversationUpdate::MessageUpdated(snapshot));
    }

    /// Grows the streaming message, creating one when none is open.
    pub fn on_data_chunk(&mut self, text: &str) {
        if self.streaming_id.is_none() {
            let id = self.next_message_id();
            self.push(Message::streaming_assistant(id.clone()));
            self.streaming_id = Some(id);
        }
        let Some(message) = self.streaming_mut() else {
            return;
        };
        message.content.push_str(text);
        message.thinking = false;
        message.active_think_index = None;
        let snapshot = message.clone();
        self.emit(ConversationUpdate::MessageUpdated(snapshot));
    }

    pub fn on_tool_message(&mut self, text: &str, tool_name: Option<String>) -> String {
        self.finalize_stream();
        let id = self.next_message_id();
        self.push(Message::tool_result(id.clone(), text.to_string(), tool_name));
        id
    }

    /// Ends the streaming message, if any, and segments its final content.
    pub fn finalize_stream(&mut self) -> Option<String> {
        let id = self.streaming_id.take()?;
        let message = self.messages.iter_mut().find(|message| message.id == id)?;
        message.streaming = false;
        message.thinking = false;
        message.active_think_index = None;
        message.refresh_segments();
        let snapshot = message.clone();
        self.emit(ConversationUpdate::MessageUpdated(snapshot));
        Some(id)
    }

    /// A tool call ends the streaming message as it is, even when empty.
    pub fn interrupt_for_tool_call(&mut self) -> Option<String> {
        self.finalize_stream()
    }

    /// Drops the in-flight streaming message and appends an error notice.
    pub fn on_transport_error(&mut self, notice_text: &str) -> String {
        if let Some(id) = self.streaming_id.take() {
            self.messages.retain(|message| message.id != id);
            self.emit(ConversationUpdate::MessageRemoved { id });
        }
        let id = self.next_message_id();
        self.push(Message::error_notice(id.clone(), notice_text.to_string()));
        id
    }

    pub fn push_tool_call_message(&mut self, tools: Vec<ToolCallRequest>) -> String {
        let id = self.next_message_id();
        self.push(Message::tool_call(id.clone(), tools));
        id
    }

    /// Sets one tool's status on a tool call message. Terminal statuses never change.
    pub fn set_tool_status(&mut self, message_id: &str, tool_id: &str, status: ToolStatus) -> bool {
        let Some(message) = self
            .messages
            .iter_mut()
            .find(|message| message.id == message_id)
        else {
            return false;
        };
        if message.status_of(tool_id).is_some_and(ToolStatus::is_terminal) {
            return false;
        }
        message.tool_statuses.insert(tool_id.to_string(), status);
        let snapshot = message.clone();
        self.emit(ConversationUpdate::MessageUpdated(snapshot));
        true
    }

    /// Replaces the whole log, e.g. with converted history.
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        for message in std::mem::take(&mut self.messages) {
            self.emit(ConversationUpdate::MessageRemoved { id: message.id });
        }
        self.streaming_id = None;
        for message in messages {
            self.push(message);
        }
    }

    fn streaming_mut(&mut self) -> Option<&mut Message> {
        let id = self.streaming_id.as_deref()?;
        self.messages.iter_mut().find(|message| message.id == id)
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message.clone());
        self.emit(ConversationUpdate::MessageAppended(message));
    }

    pub(super) fn emit(&self, update: ConversationUpdate) {
        emit_update(self.updates_tx.as_ref(), update);
    }
}

pub(super) fn emit_update(
    updates_tx: Option<&mpsc::UnboundedSender<ConversationUpdate>>,
    update: ConversationUpdate,
) {
    if let Some(tx) = updates_tx {
        let _ = tx.send(update);
    }
}
