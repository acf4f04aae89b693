use crate::api::client::{ByteStream, MockStreamProducer};
use crate::error::ChatError;
use crate::types::OutboundRequest;
use bytes::Bytes;
use futures::stream;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// One scripted reply of the mock backend.
pub enum MockReply {
    /// SSE chunks, each framed with a trailing blank line when it lacks one.
    Chunks(Vec<String>),
    /// Chunks followed by a read error mid-body.
    BreakAfter(Vec<String>),
    /// The request itself fails (non-success status or unreachable host).
    Fail(String),
}

#[derive(Clone)]
pub struct MockApiClient {
    replies: Arc<Mutex<Vec<MockReply>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockApiClient {
    pub fn new(responses: Vec<Vec<String>>) -> Self {
        Self::with_replies(responses.into_iter().map(MockReply::Chunks).collect())
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request body received so far, as JSON.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

fn frame(chunks: Vec<String>) -> Vec<Result<Bytes, ChatError>> {
    chunks
        .into_iter()
        .map(|s| {
            let framed = if s.ends_with("\n\n") {
                s
            } else {
                format!("{s}\n\n")
            };
            Ok(Bytes::from(framed))
        })
        .collect()
}

impl MockStreamProducer for MockApiClient {
    fn create_mock_stream(&self, body: &OutboundRequest) -> Result<ByteStream, ChatError> {
        self.requests
            .lock()
            .unwrap()
            .push(serde_json::to_value(body).unwrap());

        let mut replies_guard = self.replies.lock().unwrap();
        if replies_guard.is_empty() {
            return Err(ChatError::Transport(
                "MockApiClient: No more responses configured".to_string(),
            ));
        }

        let items = match replies_guard.remove(0) {
            MockReply::Chunks(chunks) => frame(chunks),
            MockReply::BreakAfter(chunks) => {
                let mut items = frame(chunks);
                items.push(Err(ChatError::Transport(
                    "MockApiClient: connection reset".to_string(),
                )));
                items
            }
            MockReply::Fail(message) => return Err(ChatError::Transport(message)),
        };
        Ok(Box::pin(stream::iter(items)))
    }
}
