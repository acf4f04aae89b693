mod conversation;
mod message;

pub use conversation::{
    ConversationLog, ConversationManager, ConversationUpdate, ResolvedBatch, ToolBatch,
    ToolCallCoordinator,
};
pub use message::{Message, Role};
