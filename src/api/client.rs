use super::logging::{debug_payload_enabled, emit_debug_payload};
use crate::config::Config;
use crate::error::ChatError;
use crate::types::OutboundRequest;
use crate::util::is_local_endpoint_url;
use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, ChatError>> + Send>>;

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, body: &OutboundRequest)
        -> std::result::Result<ByteStream, ChatError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    stream_url: String,
    auth_token: Option<String>,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder()
                .connect_timeout(config.connect_timeout)
                .build()?,
            stream_url: config.stream_url(),
            auth_token: config.auth_token.clone(),
            #[cfg(test)]
            mock_stream_producer: None,
        })
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            stream_url: "http://localhost:8000/api/diy-agent/stream/".to_string(),
            auth_token: None,
            mock_stream_producer: Some(mock_producer),
        }
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Posts `body` and returns the response body as a byte stream once the
    /// response headers arrived with a success status.
    pub async fn open_stream(
        &self,
        body: &OutboundRequest,
    ) -> std::result::Result<ByteStream, ChatError> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(body);
            }
        }

        if debug_payload_enabled() {
            match serde_json::to_value(body) {
                Ok(payload) => emit_debug_payload(&self.stream_url, body.kind(), &payload),
                Err(error) => tracing::debug!(%error, "could not render request payload"),
            }
        }

        let mut request = self
            .http
            .post(&self.stream_url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(body);
        if let Some(token) = &self.auth_token {
            request = request.header("authorization", format!("Bearer {token}"));
        }

        tracing::debug!(url = %self.stream_url, kind = body.kind(), "opening response stream");
        let response = request
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &self.stream_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &self.stream_url))?;

        let request_url_for_stream = self.stream_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> ChatError {
    let detail = if error.is_connect() && is_local_endpoint_url(request_url) {
        format!(
            "cannot reach local endpoint '{request_url}': {error}. Start the backend or update CHATSTREAM_BASE_URL."
        )
    } else if error.is_connect() {
        format!("cannot reach endpoint '{request_url}': {error}")
    } else if error.is_timeout() {
        format!("request to '{request_url}' timed out: {error}")
    } else if let Some(status) = error.status() {
        format!("endpoint '{request_url}' returned HTTP {status}")
    } else if error.is_body() || error.is_decode() {
        format!("reading the response from '{request_url}' failed: {error}")
    } else {
        format!("request to '{request_url}' failed: {error}")
    };
    ChatError::Transport(detail)
}
