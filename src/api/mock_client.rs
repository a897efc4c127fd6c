use crate::api::client::{ByteStream, MockContentProducer, MockStreamProducer};
use crate::types::{Content, GenerateContentResponse};
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// One scripted reply: text fragments, then either a clean end or an error.
#[derive(Clone, Debug, Default)]
pub struct MockRound {
    pub fragments: Vec<String>,
    pub fail_with: Option<String>,
    pub fail_on_open: Option<String>,
}

impl MockRound {
    pub fn text(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_after(fragments: &[&str], error: &str) -> Self {
        Self {
            fail_with: Some(error.to_string()),
            ..Self::text(fragments)
        }
    }

    pub fn failing_on_open(error: &str) -> Self {
        Self {
            fail_on_open: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// One scripted `generateContent` reply.
#[derive(Clone, Debug)]
pub enum MockReply {
    Body(Value),
    Fail(String),
}

impl MockReply {
    pub fn image(base64_payload: &str) -> Self {
        Self::Body(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "inlineData": { "mimeType": "image/png", "data": base64_payload } }]
                }
            }]
        }))
    }

    pub fn text(text: &str) -> Self {
        Self::Body(json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        }))
    }

    pub fn upstream_error(message: &str) -> Self {
        Self::Body(json!({ "error": { "code": 400, "status": "INVALID_ARGUMENT", "message": message } }))
    }

    pub fn failing(error: &str) -> Self {
        Self::Fail(error.to_string())
    }
}

/// A recorded `generateContent` call.
#[derive(Clone, Debug)]
pub struct ContentRequest {
    pub url: String,
    pub payload: Value,
}

#[derive(Clone)]
pub struct MockApiClient {
    rounds: Arc<Mutex<Vec<MockRound>>>,
    requests: Arc<Mutex<Vec<Vec<Content>>>>,
    replies: Arc<Mutex<Vec<MockReply>>>,
    content_requests: Arc<Mutex<Vec<ContentRequest>>>,
}

impl MockApiClient {
    pub fn new(rounds: Vec<MockRound>) -> Self {
        Self {
            rounds: Arc::new(Mutex::new(rounds)),
            requests: Arc::new(Mutex::new(Vec::new())),
            replies: Arc::new(Mutex::new(Vec::new())),
            content_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        let mock = Self::new(Vec::new());
        *mock.replies.lock().unwrap() = replies;
        mock
    }

    /// Every `generateContent` call made so far.
    pub fn content_requests(&self) -> Vec<ContentRequest> {
        self.content_requests.lock().unwrap().clone()
    }

    /// Conversation contents of every stream opened so far.
    pub fn requests(&self) -> Vec<Vec<Content>> {
        self.requests.lock().unwrap().clone()
    }
}

/// Frames one fragment the way `streamGenerateContent?alt=sse` does.
pub fn sse_text_chunk(text: &str) -> String {
    let event = serde_json::json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] }
        }]
    });
    format!("data: {event}\r\n\r\n")
}

impl MockStreamProducer for MockApiClient {
    fn create_mock_stream(&self, contents: &[Content]) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(contents.to_vec());

        let mut rounds_guard = self.rounds.lock().unwrap();
        if rounds_guard.is_empty() {
            return Err(anyhow!("MockApiClient: No more responses configured"));
        }
        let round = rounds_guard.remove(0);
        if let Some(error) = round.fail_on_open {
            return Err(anyhow!(error));
        }

        let mut chunks: Vec<Result<Bytes>> = round
            .fragments
            .iter()
            .map(|fragment| Ok(Bytes::from(sse_text_chunk(fragment))))
            .collect();
        if let Some(error) = round.fail_with {
            chunks.push(Err(anyhow!(error)));
        }

        Ok(Box::pin(stream::iter(chunks)))
    }
}

impl MockContentProducer for MockApiClient {
    fn create_mock_content(
        &self,
        request_url: &str,
        payload: &Value,
    ) -> Result<GenerateContentResponse> {
        self.content_requests.lock().unwrap().push(ContentRequest {
            url: request_url.to_string(),
            payload: payload.clone(),
        });

        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(anyhow!("MockApiClient: No more replies configured"));
        }
        match replies.remove(0) {
            MockReply::Body(body) => Ok(serde_json::from_value(body)?),
            MockReply::Fail(error) => Err(anyhow!(error)),
        }
    }
}
