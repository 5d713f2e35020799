//! Self-hosted Ollama runner adapter (NDJSON streaming).

use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;

use crate::credentials::OLLAMA_BASE_URL_ENV;
use crate::model_registry::ProviderId;

use super::AdapterError;
use super::AdapterEvent;
use super::AdapterResult;
use super::AdapterStream;
use super::ChatAdapter;
use super::ChatMessage;
use super::DispatchConfig;
use super::MessageRole;

/// Catalog ids carry a `ollama-` prefix to keep them unique across the
/// fleet; the runner itself wants the bare model name.
fn runner_model_name(model_id: &str) -> &str {
    model_id.strip_prefix("ollama-").unwrap_or(model_id)
}

/// One NDJSON line from `/api/chat`.
#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

/// Adapter for a self-hosted Ollama runner.
///
/// There is no API key; "credentials" here means the runner's base URL is
/// configured at all. Content never leaves the machine.
pub struct OllamaAdapter {
    client: reqwest::Client,
    base_url: Option<String>,
}

impl OllamaAdapter {
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(OLLAMA_BASE_URL_ENV)
                .ok()
                .filter(|url| !url.trim().is_empty()),
        )
    }

    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn base_url(&self) -> AdapterResult<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| AdapterError::NotAuthenticated(format!("{OLLAMA_BASE_URL_ENV} is not set")))
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

        json!({
            "model": runner_model_name(&config.model),
            "stream": true,
            "messages": turns,
        })
    }

    fn parse_line(line: &str) -> AdapterResult<Option<AdapterEvent>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let parsed: ChatLine = serde_json::from_str(line)
            .map_err(|e| AdapterError::Parse(format!("bad NDJSON line: {e}")))?;

        if let Some(error) = parsed.error {
            return Err(AdapterError::Api {
                status: 500,
                message: error,
            });
        }
        if parsed.done {
            return Ok(Some(AdapterEvent::Done));
        }
        let content = parsed
            .message
            .map(|m| m.content)
            .filter(|content| !content.is_empty());
        Ok(content.map(AdapterEvent::Delta))
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
                let line = buffer[..pos].to_string();
                buffer = buffer[pos + 1..].to_string();
                match Self::parse_line(&line) {
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
impl ChatAdapter for OllamaAdapter {
    fn provider(&self) -> ProviderId {
        ProviderId::Ollama
    }

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        config: &DispatchConfig,
    ) -> AdapterResult<AdapterStream> {
        let base_url = self.base_url()?;

        let body = Self::build_request_body(messages, config);
        let response = self
            .client
            .post(format!("{base_url}/api/chat"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
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
    fn content_line_becomes_delta() {
        let line = r#"{"message":{"role":"assistant","content":"drafting"},"done":false}"#;
        let parsed = OllamaAdapter::parse_line(line).expect("parse");
        assert_eq!(parsed, Some(AdapterEvent::Delta("drafting".to_string())));
    }

    #[test]
    fn done_line_terminates() {
        let line = r#"{"done":true,"total_duration":12345}"#;
        let parsed = OllamaAdapter::parse_line(line).expect("parse");
        assert_eq!(parsed, Some(AdapterEvent::Done));
    }

    #[test]
    fn error_line_surfaces_as_api_error() {
        let line = r#"{"error":"model not loaded"}"#;
        let err = OllamaAdapter::parse_line(line).expect_err("error line");
        assert!(err.to_string().contains("model not loaded"));
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(OllamaAdapter::parse_line("  ").expect("parse"), None);
    }

    #[test]
    fn catalog_prefix_is_stripped_for_the_runner() {
        let config = DispatchConfig::for_model("ollama-llama3", ProviderId::Ollama);
        let body = OllamaAdapter::build_request_body(&[ChatMessage::user("hi")], &config);
        assert_eq!(body["model"], "llama3");
    }

    #[test]
    fn missing_base_url_is_a_configuration_error() {
        let adapter = OllamaAdapter::new(None);
        assert!(matches!(
            adapter.base_url().expect_err("unconfigured"),
            AdapterError::NotAuthenticated(_)
        ));
    }
}
