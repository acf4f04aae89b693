//! Client-side engine for an event-typed conversational response stream.
//!
//! Bytes from the backend are framed into blocks ([`api::BlockDecoder`]),
//! classified into [`types::StreamEvent`]s ([`api::classify_block`]) and
//! applied to the conversation log by [`state::ConversationManager`], which
//! also coordinates confirmation of the tool calls the backend proposes.

pub mod api;
pub mod config;
pub mod error;
pub mod notice;
pub mod segment;
pub mod state;
pub mod types;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::ChatError;
