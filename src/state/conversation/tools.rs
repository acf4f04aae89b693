use super::{ConversationLog, ConversationUpdate, ResolvedBatch, ToolBatch, ToolCallCoordinator};
use crate::error::ChatError;
use crate::types::{ToolCallConfirmation, ToolCallRequest, ToolConfirmationRequest, ToolStatus};

impl ToolBatch {
    fn new(message_id: String, tools: Vec<ToolCallRequest>) -> Self {
        let statuses = tools
            .iter()
            .map(|tool| (tool.id.clone(), ToolStatus::ToConfirm))
            .collect();
        Self {
            message_id,
            tools,
            statuses,
        }
    }

    pub fn status_of(&self, tool_id: &str) -> Option<ToolStatus> {
        self.statuses.get(tool_id).copied()
    }

    pub fn is_converged(&self) -> bool {
        self.tools.iter().all(|tool| {
            self.status_of(&tool.id)
                .is_some_and(ToolStatus::is_terminal)
        })
    }

    /// Ids of the tools still awaiting a decision, in batch order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.tools
            .iter()
            .filter(|tool| !self.status_of(&tool.id).is_some_and(ToolStatus::is_terminal))
            .map(|tool| tool.id.clone())
            .collect()
    }
}

impl ResolvedBatch {
    pub fn into_request(self, session_id: &str) -> ToolConfirmationRequest {
        ToolConfirmationRequest {
            message: String::new(),
            session_id: session_id.to_string(),
            tool_calls: self
                .calls
                .into_iter()
                .map(|(tool, status)| ToolCallConfirmation {
                    tool_call_id: tool.id,
                    tool_call_name: tool.name,
                    tool_call_args: tool.args,
                    tool_confirm_action: status,
                })
                .collect(),
        }
    }
}

impl ToolCallCoordinator {
    pub fn new(auto_execute: bool) -> Self {
        Self {
            open: None,
            auto_execute,
        }
    }

    pub fn auto_execute(&self) -> bool {
        self.auto_execute
    }

    pub fn set_auto_execute(&mut self, enabled: bool) {
        self.auto_execute = enabled;
    }

    pub fn pending(&self) -> Option<&ToolBatch> {
        self.open.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Appends a tool call message for `tools` and opens a batch bound to it.
    /// Returns the batch's tools so the caller can act on exactly this batch.
    pub fn open_batch(
        &mut self,
        log: &mut ConversationLog,
        tools: Vec<ToolCallRequest>,
    ) -> Result<Vec<ToolCallRequest>, ChatError> {
        if tools.is_empty() {
            return Err(ChatError::MalformedToolCall(
                "tool call list is empty".to_string(),
            ));
        }
        if let Some(open) = &self.open {
            tracing::warn!(
                open_message_id = %open.message_id,
                incoming = tools.len(),
                "tool call rejected while a batch is open"
            );
            return Err(ChatError::BatchOpen);
        }

        let message_id = log.push_tool_call_message(tools.clone());
        log.emit(ConversationUpdate::BatchOpened {
            message_id: message_id.clone(),
            tool_ids: tools.iter().map(|tool| tool.id.clone()).collect(),
        });
        tracing::debug!(%message_id, tools = tools.len(), "tool call batch opened");
        self.open = Some(ToolBatch::new(message_id, tools.clone()));
        Ok(tools)
    }

    /// Sets one tool of the open batch to a terminal status. Returns false, and
    /// changes nothing, when the tool is unknown or already terminal.
    pub fn resolve(&mut self, log: &mut ConversationLog, tool_id: &str, status: ToolStatus) -> bool {
        if !status.is_terminal() {
            return false;
        }
        let Some(batch) = self.open.as_mut() else {
            tracing::debug!(tool_id, "resolution without an open batch ignored");
            return false;
        };
        match batch.status_of(tool_id) {
            None => {
                tracing::debug!(tool_id, "tool is not part of the open batch");
                false
            }
            Some(current) if current.is_terminal() => false,
            Some(_) => {
                batch.statuses.insert(tool_id.to_string(), status);
                log.set_tool_status(&batch.message_id, tool_id, status);
                true
            }
        }
    }

    /// Resolves every still-pending tool of the open batch. Returns how many changed.
    pub fn resolve_all(&mut self, log: &mut ConversationLog, status: ToolStatus) -> usize {
        let pending = self
            .open
            .as_ref()
            .map(ToolBatch::pending_ids)
            .unwrap_or_default();
        pending
            .iter()
            .filter(|tool_id| self.resolve(log, tool_id, status))
            .count()
    }

    /// Closes the open batch once every tool is terminal. The returned batch is
    /// the only value from which its confirmation request is built.
    pub fn check_convergence(&mut self, log: &mut ConversationLog) -> Option<ResolvedBatch> {
        if !self.open.as_ref().is_some_and(ToolBatch::is_converged) {
            return None;
        }
        let batch = self.open.take()?;
        log.emit(ConversationUpdate::BatchClosed {
            message_id: batch.message_id.clone(),
        });

        let ToolBatch {
            message_id,
            tools,
            statuses,
        } = batch;
        let calls = tools
            .into_iter()
            .map(|tool| {
                let status = statuses
                    .get(&tool.id)
                    .copied()
                    .unwrap_or(ToolStatus::Cancelled);
                (tool, status)
            })
            .collect();
        tracing::debug!(%message_id, "tool call batch converged");
        Some(ResolvedBatch { message_id, calls })
    }

    /// Confirms every tool in `tools` without waiting for a decision and checks
    /// convergence right away. Does nothing unless auto-execute is on.
    pub fn auto_execute_batch(
        &mut self,
        log: &mut ConversationLog,
        tools: &[ToolCallRequest],
    ) -> Option<ResolvedBatch> {
        if !self.auto_execute {
            return None;
        }
        for tool in tools {
            self.resolve(log, &tool.id, ToolStatus::Confirmed);
        }
        self.check_convergence(log)
    }

    /// Reinstates a batch recovered from history.
    pub fn restore(&mut self, batch: Option<ToolBatch>) {
        self.open = batch;
    }
}

/// Rebuilds the open batch of a tool call message that still has pending tools.
pub(super) fn batch_from_message(message: &super::super::message::Message) -> Option<ToolBatch> {
    if !message.has_pending_tools() {
        return None;
    }
    let tools = message.tool_calls.clone()?;
    let statuses = tools
        .iter()
        .map(|tool| {
            let status = message.status_of(&tool.id).unwrap_or(ToolStatus::ToConfirm);
            (tool.id.clone(), status)
        })
        .collect();
    Some(ToolBatch {
        message_id: message.id.clone(),
        tools,
        statuses,
    })
}
