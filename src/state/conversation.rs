mod core;
mod history;
mod state;
mod streaming;
mod tools;


pub use state::{
    ConversationLog, ConversationManager, ConversationUpdate, ResolvedBatch, ToolBatch,
    ToolCallCoordinator,
};

#[cfg(test)]
use history::*;
#[cfg(test)]
use self::core::{SEND_FAILED_TEXT, TOOL_SUBMIT_FAILED_TEXT};
