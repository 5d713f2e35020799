//! Anthropic Messages API adapter (SSE streaming).

use futures::Stream;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;

use crate::credentials::ANTHROPIC_API_KEY_ENV;
use crate::model_registry::ProviderId;

use super::AdapterError;
use super::AdapterEvent;
use super::AdapterResult;
use super::AdapterStream;
use super::ChatAdapter;
use super::ChatMessage;
use super::DispatchConfig;
use super::MessageRole;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Streaming events we care about; everything else in the SSE feed is
/// metadata and gets ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum SseEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: DeltaData },

    #[serde(rename = "message_stop")]
    MessageStop,

    #[serde(rename = "error")]
    Error { error: ErrorData },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum DeltaData {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorData,
}

/// Adapter for the Anthropic Messages API.
pub struct AnthropicAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicAdapter {
    /// Builds the adapter with the key from the environment, if present.
    /// The presence check itself happens at dispatch time.
    pub fn from_env() -> Self {
        let api_key = std::env::var(ANTHROPIC_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::new(ANTHROPIC_API_URL.to_string(), api_key)
    }

    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    fn api_key(&self) -> AdapterResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AdapterError::NotAuthenticated(format!("{ANTHROPIC_API_KEY_ENV} is not set")))
    }

    fn build_request_body(messages: &[ChatMessage], config: &DispatchConfig) -> Value {
        // System turns ride in the dedicated field; the messages array only
        // carries user/assistant turns.
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        let turns: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| {
                json!({
                    "role": match m.role {
                        MessageRole::Assistant => "assistant",
                        _ => "user",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "stream": true,
            "messages": turns,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if let Some(temperature) = config.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    /// Extracts one complete SSE event (terminated by a blank line) from
    /// the buffer.
    fn extract_sse_event(buffer: &mut String) -> Option<String> {
        let pos = buffer.find("\n\n")?;
        let event = buffer[..pos].to_string();
        *buffer = buffer[pos + 2..].to_string();
        Some(event)
    }

    /// Parses one SSE event into a normalized adapter event.
    fn parse_sse_event(event_str: &str) -> AdapterResult<Option<AdapterEvent>> {
        let mut data = String::new();
        for line in event_str.lines() {
            if let Some(value) = line.strip_prefix("data: ") {
                data = value.to_string();
            }
        }
        if data.is_empty() {
            return Ok(None);
        }

        let parsed: SseEvent = serde_json::from_str(&data)
            .map_err(|e| AdapterError::Parse(format!("bad SSE payload: {e}")))?;

        match parsed {
            SseEvent::ContentBlockDelta { delta } => match delta {
                DeltaData::TextDelta { text } => Ok(Some(AdapterEvent::Delta(text))),
                DeltaData::Other => Ok(None),
            },
            SseEvent::MessageStop => Ok(Some(AdapterEvent::Done)),
            SseEvent::Error { error } => Err(AdapterError::Api {
                status: 500,
                message: format!("{}: {}", error.error_type, error.message),
            }),
            SseEvent::Other => Ok(None),
        }
    }

    async fn pump(
        mut bytes: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Unpin,
        tx: mpsc::Sender<AdapterResult<AdapterEvent>>,
    ) {
        let mut buffer = String::new();
        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = tx.send(Err(AdapterError::Network(err))).await;
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(event) = Self::extract_sse_event(&mut buffer) {
                match Self::parse_sse_event(&event) {
                    Ok(Some(AdapterEvent::Done)) => {
                        let _ = tx.send(Ok(AdapterEvent::Done)).await;
                        return;
                    }
                    Ok(Some(event)) => {
                        if tx.send(Ok(event)).await.is_err() {
                            // Receiver dropped; stop pumping.
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
            }
        }
        let _ = tx.send(Ok(AdapterEvent::Done)).await;
    }
}

#[async_trait::async_trait]
impl ChatAdapter for AnthropicAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        config: &DispatchConfig,
    ) -> AdapterResult<AdapterStream> {
        let api_key = self.api_key()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|_| AdapterError::NotAuthenticated("invalid API key".to_string()))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let body = Self::build_request_body(messages, config);
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(AdapterError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        let bytes = response.bytes_stream();
        tokio::spawn(Self::pump(bytes, tx));

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extract_sse_event_splits_on_blank_line() {
        let mut buffer =
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\nremaining".to_string();
        let event = AnthropicAdapter::extract_sse_event(&mut buffer).expect("complete event");
        assert_eq!(event, "event: message_stop\ndata: {\"type\":\"message_stop\"}");
        assert_eq!(buffer, "remaining");
        assert!(AnthropicAdapter::extract_sse_event(&mut buffer).is_none());
    }

    #[test]
    fn text_delta_becomes_delta_event() {
        let event = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hei\"}}";
        let parsed = AnthropicAdapter::parse_sse_event(event).expect("parse");
        assert_eq!(parsed, Some(AdapterEvent::Delta("Hei".to_string())));
    }

    #[test]
    fn message_stop_becomes_done() {
        let event = "event: message_stop\ndata: {\"type\":\"message_stop\"}";
        let parsed = AnthropicAdapter::parse_sse_event(event).expect("parse");
        assert_eq!(parsed, Some(AdapterEvent::Done));
    }

    #[test]
    fn ping_and_metadata_events_are_skipped() {
        for event in [
            "event: ping\ndata: {\"type\":\"ping\"}",
            "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{}}",
        ] {
            let parsed = AnthropicAdapter::parse_sse_event(event).expect("parse");
            assert_eq!(parsed, None);
        }
    }

    #[test]
    fn error_event_surfaces_as_api_error() {
        let event = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"busy\"}}";
        let err = AnthropicAdapter::parse_sse_event(event).expect_err("error event");
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let adapter = AnthropicAdapter::new("http://localhost".to_string(), None);
        let err = adapter.api_key().expect_err("no key configured");
        assert!(matches!(err, AdapterError::NotAuthenticated(_)));
    }

    #[test]
    fn request_body_separates_system_from_turns() {
        let messages = vec![
            ChatMessage::system("You are a paralegal assistant."),
            ChatMessage::user("Summarize the filing."),
        ];
        let body =
            AnthropicAdapter::build_request_body(&messages, &DispatchConfig::default());
        assert_eq!(body["system"], "You are a paralegal assistant.");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["stream"], true);
    }
}
