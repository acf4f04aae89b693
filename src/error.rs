use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Non-success response or network/read failure. Aborts the current stream.
    #[error("{0}")]
    Transport(String),

    /// A `tool_call` payload that is neither a list nor a single-call shape.
    #[error("malformed tool call payload: {0}")]
    MalformedToolCall(String),

    /// A tool call batch is still awaiting confirmation.
    #[error("tool calls are still awaiting confirmation")]
    BatchOpen,

    /// `begin_streaming_assistant_message` called while another is still streaming.
    #[error("an assistant message is already streaming")]
    StreamingInProgress,
}

impl ChatError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
