use super::super::message::Message;
use crate::api::ApiClient;
use crate::notice::NoticeService;
use crate::types::{ToolCallRequest, ToolStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Changes to the conversation, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationUpdate {
    MessageAppended(Message),
    /// Full snapshot of a message after any change, including each data chunk.
    MessageUpdated(Message),
    MessageRemoved { id: String },
    BatchOpened { message_id: String, tool_ids: Vec<String> },
    BatchClosed { message_id: String },
    TurnFinished,
}

/// The tool calls of one tool call message that still await a decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolBatch {
    pub message_id: String,
    pub tools: Vec<ToolCallRequest>,
    pub statuses: BTreeMap<String, ToolStatus>,
}

/// A converged batch: every tool with its terminal status, in batch order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBatch {
    pub message_id: String,
    pub calls: Vec<(ToolCallRequest, ToolStatus)>,
}

/// Ordered message log and the single streaming assistant message.
pub struct ConversationLog {
    pub(super) messages: Vec<Message>,
    pub(super) streaming_id: Option<String>,
    pub(super) next_id: u64,
    pub(super) updates_tx: Option<mpsc::UnboundedSender<ConversationUpdate>>,
}

/// Tracks the one open tool call batch and the auto-execute mode.
#[derive(Debug, Default)]
pub struct ToolCallCoordinator {
    pub(super) open: Option<ToolBatch>,
    pub(super) auto_execute: bool,
}

pub struct ConversationManager {
    pub(super) client: Arc<ApiClient>,
    pub(super) session_id: String,
    pub(super) notices: NoticeService,
    pub(super) log: ConversationLog,
    pub(super) coordinator: ToolCallCoordinator,
    pub(super) input: String,
}

impl ConversationManager {
    pub fn new(
        client: ApiClient,
        session_id: impl Into<String>,
        notices: NoticeService,
        auto_execute: bool,
    ) -> Self {
        Self {
            client: Arc::new(client),
            session_id: session_id.into(),
            notices,
            log: ConversationLog::new(),
            coordinator: ToolCallCoordinator::new(auto_execute),
            input: String::new(),
        }
    }

    /// Streams every [`ConversationUpdate`] to `updates_tx`.
    pub fn with_updates(mut self, updates_tx: mpsc::UnboundedSender<ConversationUpdate>) -> Self {
        self.log.updates_tx = Some(updates_tx);
        self
    }

    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn pending_batch(&self) -> Option<&ToolBatch> {
        self.coordinator.pending()
    }

    pub fn auto_execute(&self) -> bool {
        self.coordinator.auto_execute()
    }
}
