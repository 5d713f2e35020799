//! OpenAI Chat Completions adapter (SSE streaming).

use futures::Stream;
use futures::StreamExt;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;

use crate::credentials::OPENAI_API_KEY_ENV;
use crate::model_registry::ProviderId;

use super::AdapterError;
use super::AdapterEvent;
use super::AdapterResult;
use super::AdapterStream;
use super::ChatAdapter;
use super::ChatMessage;
use super::DispatchConfig;
use super::MessageRole;

const OPENAI_API_URL: &str = "https://api.openai.com";

/// One chunk of a streamed chat completion.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Adapter for the OpenAI Chat Completions API.
pub struct OpenAiAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiAdapter {
    pub fn from_env() -> Self {
        let api_key = std::env::var(OPENAI_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::new(OPENAI_API_URL.to_string(), api_key)
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
            .ok_or_else(|| AdapterError::NotAuthenticated(format!("{OPENAI_API_KEY_ENV} is not set")))
    }

    fn build_request_body(messages: &[ChatMessage], config: &DispatchConfig) -> Value {
        let turns: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": match m.role {
                        MessageRole::System => "system",
                        MessageRole::User => "user",
                        MessageRole::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": config.model,
            "max_completion_tokens": config.max_tokens,
            "stream": true,
            "messages": turns,
        });
        if let Some(temperature) = config.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    /// Parses one `data:` payload. `[DONE]` is the protocol terminator;
    /// chunks without content (role announcements, finish markers) are
    /// skipped.
    fn parse_data_line(data: &str) -> AdapterResult<Option<AdapterEvent>> {
        if data.trim() == "[DONE]" {
            return Ok(Some(AdapterEvent::Done));
        }
        let chunk: StreamChunk = serde_json::from_str(data)
            .map_err(|e| AdapterError::Parse(format!("bad completion chunk: {e}")))?;
        let delta = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty());
        Ok(delta.map(AdapterEvent::Delta))
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

            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim_end_matches('\r').to_string();
                buffer = buffer[pos + 1..].to_string();
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                match Self::parse_data_line(data) {
                    Ok(Some(AdapterEvent::Done)) => {
                        let _ = tx.send(Ok(AdapterEvent::Done)).await;
                        return;
                    }
                    Ok(Some(event)) => {
                        if tx.send(Ok(event)).await.is_err() {
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
impl ChatAdapter for OpenAiAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::OpenAi
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
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| AdapterError::NotAuthenticated("invalid API key".to_string()))?,
        );

        let body = Self::build_request_body(messages, config);
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
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
