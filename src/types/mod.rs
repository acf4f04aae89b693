mod api;
mod event;

pub use api::{
    HistoryEntry, HistoryPayload, LegacyToolAction, LegacyToolConfirmation, MessageRequest,
    OutboundRequest, ToolCallConfirmation, ToolCallRequest, ToolConfirmationRequest, ToolStatus,
};
pub use event::{DataPayload, StreamEvent};
