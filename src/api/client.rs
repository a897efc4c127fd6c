use super::logging::{debug_payload_enabled, emit_debug_payload};
use super::stream::{event_fragments, StreamParser};
use crate::config::Config;
use crate::state::ConversationTurn;
use crate::types::{
    data_url_payload, png_data_url, Content, GenerateContentResponse, GenerationSettings, Part,
};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::pin::Pin;
#[cfg(test)]
use std::sync::Arc;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;
/// Ordered text fragments of one streamed reply.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

const CHAT_SYSTEM_INSTRUCTION: &str = "You are a helpful, professional AI creative assistant \
specializing in digital art and image processing.";
pub const NO_FAST_RESPONSE: &str = "No response received.";

#[cfg(test)]
pub trait MockStreamProducer: Send + Sync {
    fn create_mock_stream(&self, contents: &[Content]) -> Result<ByteStream>;
}

#[cfg(test)]
pub trait MockContentProducer: Send + Sync {
    fn create_mock_content(&self, request_url: &str, payload: &Value)
        -> Result<GenerateContentResponse>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
    edit_model: String,
    image_model: String,
    chat_model: String,
    fast_model: String,
    #[cfg(test)]
    mock_stream_producer: Option<Arc<dyn MockStreamProducer>>,
    #[cfg(test)]
    mock_content_producer: Option<Arc<dyn MockContentProducer>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            edit_model: config.edit_model.clone(),
            image_model: config.image_model.clone(),
            chat_model: config.chat_model.clone(),
            fast_model: config.fast_model.clone(),
            #[cfg(test)]
            mock_stream_producer: None,
            #[cfg(test)]
            mock_content_producer: None,
        })
    }

    #[cfg(test)]
    pub fn new_mock(mock_producer: Arc<dyn MockStreamProducer>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: None,
            api_url: "http://localhost:8000/v1beta".to_string(),
            edit_model: "mock-edit".to_string(),
            image_model: "mock-image".to_string(),
            chat_model: "mock-chat".to_string(),
            fast_model: "mock-fast".to_string(),
            mock_stream_producer: Some(mock_producer),
            mock_content_producer: None,
        }
    }

    /// Routes `generateContent` calls to `producer` instead of the network.
    #[cfg(test)]
    pub fn with_mock_content(mut self, producer: Arc<dyn MockContentProducer>) -> Self {
        self.mock_content_producer = Some(producer);
        self
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }

    /// Sends an image plus instruction to the edit model.
    ///
    /// `Ok(None)` means the reply carried no image part.
    pub async fn edit_image(&self, image_data_url: &str, instruction: &str) -> Result<Option<String>> {
        let payload = json!({
            "contents": [{
                "parts": [
                    Part::inline_png(data_url_payload(image_data_url)),
                    Part::text(instruction),
                ]
            }]
        });
        let response = self.generate_content(&self.edit_model, &payload).await?;
        Ok(inline_image_data_url(&response))
    }

    pub async fn generate_image(
        &self,
        prompt: &str,
        settings: GenerationSettings,
    ) -> Result<Option<String>> {
        let payload = json!({
            "contents": [{ "parts": [Part::text(prompt)] }],
            "generationConfig": {
                "imageConfig": settings,
            }
        });
        let response = self.generate_content(&self.image_model, &payload).await?;
        Ok(inline_image_data_url(&response))
    }

    /// Single-shot, low-latency completion with thinking disabled.
    pub async fn fast_complete(&self, prompt: &str) -> Result<String> {
        let payload = json!({
            "contents": [Content::user_text(prompt)],
            "generationConfig": {
                "thinkingConfig": { "thinkingBudget": 0 }
            }
        });
        let response = self.generate_content(&self.fast_model, &payload).await?;
        Ok(response
            .first_text()
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| NO_FAST_RESPONSE.to_string()))
    }

    /// Opens a streamed chat reply to `message`, with `prior_turns` as context.
    pub async fn open_chat_stream(
        &self,
        message: &str,
        prior_turns: &[ConversationTurn],
    ) -> Result<FragmentStream> {
        let mut contents = chat_history_contents(prior_turns);
        contents.push(Content::user_text(message));
        let bytes = self.create_stream(&contents).await?;
        Ok(fragments_from_bytes(bytes))
    }

    async fn create_stream(&self, contents: &[Content]) -> Result<ByteStream> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_stream_producer {
                return producer.create_mock_stream(contents);
            }
        }

        let request_url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_url, self.chat_model
        );
        let payload = json!({
            "systemInstruction": { "parts": [Part::text(CHAT_SYSTEM_INSTRUCTION)] },
            "contents": contents,
        });

        let response = self
            .post(&request_url, &payload)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }

    async fn generate_content(&self, model: &str, payload: &Value) -> Result<GenerateContentResponse> {
        let request_url = format!("{}/models/{}:generateContent", self.api_url, model);
        let body = self.fetch_content(&request_url, payload).await?;
        if let Some(error) = &body.error {
            return Err(anyhow!("API endpoint '{}' reported: {}", request_url, error));
        }
        Ok(body)
    }

    async fn fetch_content(&self, request_url: &str, payload: &Value) -> Result<GenerateContentResponse> {
        #[cfg(test)]
        {
            if let Some(producer) = &self.mock_content_producer {
                return producer.create_mock_content(request_url, payload);
            }
        }

        let response = self
            .post(request_url, payload)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, request_url))?;

        response
            .json()
            .await
            .map_err(|error| map_api_request_error(error, request_url))
    }

    fn post(&self, request_url: &str, payload: &Value) -> reqwest::RequestBuilder {
        if debug_payload_enabled() {
            emit_debug_payload(request_url, payload);
        }

        let mut request = self
            .http
            .post(request_url)
            .header("content-type", "application/json")
            .json(payload);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-goog-api-key", api_key);
        }
        request
    }
}

/// Converts transcript turns into upstream conversation context.
///
/// History must open with a user turn, so a leading assistant greeting is
/// dropped, as are turns with no text.
pub(crate) fn chat_history_contents(turns: &[ConversationTurn]) -> Vec<Content> {
    turns
        .iter()
        .skip_while(|turn| !turn.is_user())
        .filter(|turn| !turn.text.trim().is_empty())
        .map(|turn| {
            if turn.is_user() {
                Content::user_text(turn.text.clone())
            } else {
                Content::model_text(turn.text.clone())
            }
        })
        .collect()
}

fn inline_image_data_url(response: &GenerateContentResponse) -> Option<String> {
    response
        .first_inline_data()
        .filter(|inline| !inline.data.is_empty())
        .map(|inline| png_data_url(&inline.data))
}

struct FragmentPump {
    bytes: Option<ByteStream>,
    parser: StreamParser,
    pending: VecDeque<String>,
}

/// Re-chunks an SSE byte stream into text fragments, preserving order.
pub(crate) fn fragments_from_bytes(bytes: ByteStream) -> FragmentStream {
    let pump = FragmentPump {
        bytes: Some(bytes),
        parser: StreamParser::new(),
        pending: VecDeque::new(),
    };

    Box::pin(stream::unfold(pump, |mut pump| async move {
        loop {
            if let Some(fragment) = pump.pending.pop_front() {
                return Some((Ok(fragment), pump));
            }

            let bytes = pump.bytes.as_mut()?;
            match bytes.next().await {
                Some(Ok(chunk)) => match pump.parser.process(&chunk) {
                    Ok(events) => pump.pending.extend(events.iter().flat_map(event_fragments)),
                    Err(error) => {
                        pump.bytes = None;
                        return Some((Err(error), pump));
                    }
                },
                Some(Err(error)) => {
                    pump.bytes = None;
                    return Some((Err(error), pump));
                }
                None => {
                    pump.bytes = None;
                    match pump.parser.finish() {
                        Ok(Some(event)) => pump.pending.extend(event_fragments(&event)),
                        Ok(None) => {}
                        Err(error) => return Some((Err(error), pump)),
                    }
                    return pump
                        .pending
                        .pop_front()
                        .map(|fragment| (Ok(fragment), pump));
                }
            }
        }
    }))
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local API endpoint '{}': {}. Start your local server or update GEMINI_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach API endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("API request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "API endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    if error.is_decode() {
        return anyhow!(
            "API endpoint '{}' returned an unreadable body: {}",
            request_url,
            error
        );
    }
    anyhow!("API request to '{}' failed: {}", request_url, error)
}
