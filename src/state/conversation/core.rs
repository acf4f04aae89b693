use super::{ConversationManager, ConversationUpdate, ResolvedBatch};
use crate::api::EventStream;
use crate::error::ChatError;
use crate::types::{
    DataPayload, LegacyToolAction, LegacyToolConfirmation, MessageRequest, OutboundRequest,
    StreamEvent, ToolCallRequest, ToolStatus,
};
use std::collections::VecDeque;

pub(super) const PENDING_TOOLS_WARNING: &str =
    "Please confirm or cancel the pending tool calls first.";
pub(super) const OVERLAPPING_BATCH_WARNING: &str =
    "New tool calls arrived while others are still pending; they were ignored.";
pub(super) const SEND_FAILED_TEXT: &str = "Sorry, an error occurred, please try again later.";
pub(super) const TOOL_SUBMIT_FAILED_TEXT: &str = "Failed to submit tool calls, please retry.";

const ERROR_EVENT_KIND: &str = "error";

impl ConversationManager {
    /// Appends `text` as a user message and streams the reply.
    ///
    /// Blank input is ignored. While a tool call batch is open the message is
    /// rejected with a warning notice and [`ChatError::BatchOpen`].
    pub async fn send_message(&mut self, text: impl Into<String>) -> Result<(), ChatError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Ok(());
        }
        if self.coordinator.is_open() {
            self.notices.warning(PENDING_TOOLS_WARNING);
            return Err(ChatError::BatchOpen);
        }

        self.log.append_user_message(text.clone());
        self.log.begin_streaming_assistant_message()?;
        let request = OutboundRequest::Message(MessageRequest {
            message: text,
            part_id: None,
            session_id: self.session_id.clone(),
        });
        self.run_turn(request).await
    }

    pub fn set_input_text(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn input_text(&self) -> &str {
        &self.input
    }

    /// Sends the pending input. A rejected send leaves the draft in place.
    pub async fn submit_input(&mut self) -> Result<(), ChatError> {
        if self.input.trim().is_empty() {
            return Ok(());
        }
        if self.coordinator.is_open() {
            self.notices.warning(PENDING_TOOLS_WARNING);
            return Err(ChatError::BatchOpen);
        }
        let text = std::mem::take(&mut self.input);
        self.send_message(text).await
    }

    pub async fn confirm_tool(&mut self, tool_id: &str) -> Result<bool, ChatError> {
        self.resolve_tool(tool_id, ToolStatus::Confirmed).await
    }

    pub async fn cancel_tool(&mut self, tool_id: &str) -> Result<bool, ChatError> {
        self.resolve_tool(tool_id, ToolStatus::Cancelled).await
    }

    /// Records a decision for one tool of the open batch and, once the batch
    /// has converged, submits it. Returns whether the decision changed anything.
    pub async fn resolve_tool(
        &mut self,
        tool_id: &str,
        status: ToolStatus,
    ) -> Result<bool, ChatError> {
        let changed = self.coordinator.resolve(&mut self.log, tool_id, status);
        if let Some(batch) = self.coordinator.check_convergence(&mut self.log) {
            self.submit_resolved(batch).await?;
        }
        Ok(changed)
    }

    pub async fn confirm_batch(&mut self) -> Result<usize, ChatError> {
        self.resolve_batch(ToolStatus::Confirmed).await
    }

    pub async fn cancel_batch(&mut self) -> Result<usize, ChatError> {
        self.resolve_batch(ToolStatus::Cancelled).await
    }

    async fn resolve_batch(&mut self, status: ToolStatus) -> Result<usize, ChatError> {
        let changed = self.coordinator.resolve_all(&mut self.log, status);
        if let Some(batch) = self.coordinator.check_convergence(&mut self.log) {
            self.submit_resolved(batch).await?;
        }
        Ok(changed)
    }

    /// Single-tool confirmation for backends that predate batches. Leaves any
    /// open batch untouched.
    pub async fn confirm_legacy_tool(
        &mut self,
        tool_id: &str,
        tool_name: &str,
        action: LegacyToolAction,
    ) -> Result<(), ChatError> {
        let request = OutboundRequest::LegacyToolConfirmation(LegacyToolConfirmation {
            message: String::new(),
            session_id: self.session_id.clone(),
            tool_name: tool_name.to_string(),
            tool_id: tool_id.to_string(),
            tool_action: action,
        });
        self.run_turn(request).await
    }

    /// Applies to batches opened from now on.
    pub fn set_auto_execute(&mut self, enabled: bool) {
        self.coordinator.set_auto_execute(enabled);
        tracing::info!(enabled, "auto-execute mode changed");
    }

    pub fn toggle_auto_execute(&mut self) -> bool {
        let enabled = !self.coordinator.auto_execute();
        self.set_auto_execute(enabled);
        enabled
    }

    async fn submit_resolved(&mut self, batch: ResolvedBatch) -> Result<(), ChatError> {
        let request = OutboundRequest::ToolConfirmation(batch.into_request(&self.session_id));
        self.run_turn(request).await
    }

    /// Streams the reply to `request`, then every confirmation that
    /// auto-execute produced along the way, one request after another.
    ///
    /// A failed stream is reported and the queue keeps draining, so a batch
    /// auto-execute already resolved is still submitted. The first failure
    /// is returned once the queue is empty.
    async fn run_turn(&mut self, request: OutboundRequest) -> Result<(), ChatError> {
        let mut outbound = VecDeque::from([request]);
        let mut first_error = None;

        while let Some(request) = outbound.pop_front() {
            let mut resolved = Vec::new();
            let result = self.stream_reply(&request, &mut resolved).await;
            outbound.extend(resolved.into_iter().map(|batch| {
                OutboundRequest::ToolConfirmation(batch.into_request(&self.session_id))
            }));

            if let Err(error) = result {
                tracing::warn!(
                    kind = request.kind(),
                    queued = outbound.len(),
                    %error,
                    "stream aborted"
                );
                let text = match request {
                    OutboundRequest::ToolConfirmation(_) => TOOL_SUBMIT_FAILED_TEXT,
                    _ => SEND_FAILED_TEXT,
                };
                self.log.on_transport_error(text);
                self.notices.error(error.to_string());
                first_error.get_or_insert(error);
            }
        }

        self.log.emit(ConversationUpdate::TurnFinished);
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Consumes one response stream to `Done` or its end. Batches auto-execute
    /// resolves are pushed to `resolved` as they converge.
    async fn stream_reply(
        &mut self,
        request: &OutboundRequest,
        resolved: &mut Vec<ResolvedBatch>,
    ) -> Result<(), ChatError> {
        let bytes = self.client.open_stream(request).await?;
        let mut events = EventStream::new(bytes);

        while let Some(event) = events.next_event().await? {
            match event {
                StreamEvent::Data(payload) => match payload.text() {
                    Some("") => {}
                    Some(text) => self.log.on_data_chunk(text),
                    None => tracing::debug!(?payload, "data payload without text ignored"),
                },
                StreamEvent::Think(text) if text.is_empty() => {}
                StreamEvent::Think(text) => self.log.on_think(&text),
                StreamEvent::ToolCall(tools) => {
                    if let Some(batch) = self.handle_tool_call(tools) {
                        resolved.push(batch);
                    }
                }
                StreamEvent::ToolMessage { content, tool_name } => {
                    self.log.on_tool_message(&content, tool_name);
                }
                StreamEvent::Other { kind, payload } => self.handle_other_event(&kind, &payload),
                StreamEvent::Done => break,
            }
        }

        self.log.finalize_stream();
        Ok(())
    }

    fn handle_tool_call(&mut self, tools: Vec<ToolCallRequest>) -> Option<ResolvedBatch> {
        self.log.interrupt_for_tool_call();
        match self.coordinator.open_batch(&mut self.log, tools) {
            Ok(batch_tools) => self
                .coordinator
                .auto_execute_batch(&mut self.log, &batch_tools),
            Err(ChatError::BatchOpen) => {
                self.notices.warning(OVERLAPPING_BATCH_WARNING);
                None
            }
            Err(error) => {
                tracing::warn!(%error, "tool call dropped");
                None
            }
        }
    }

    fn handle_other_event(&mut self, kind: &str, payload: &DataPayload) {
        if kind != ERROR_EVENT_KIND {
            tracing::debug!(kind, "unhandled stream event kind");
            return;
        }
        let text = match payload {
            DataPayload::Text(text) => text.clone(),
            DataPayload::Structured(value) => payload
                .text()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        };
        tracing::warn!(%text, "backend reported an error");
        self.notices.error(text.clone());
        self.log.on_data_chunk(&text);
    }
}
