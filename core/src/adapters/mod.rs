//! Vendor chat adapters behind one uniform interface.
//!
//! Each adapter normalizes its vendor-native protocol (Anthropic SSE,
//! OpenAI SSE, Ollama NDJSON, the in-process embedded responder) into the
//! same [`AdapterEvent`] stream, and independently checks its own
//! credentials before dispatch. The gateway never touches vendor formats.

mod anthropic;
mod embedded;
mod ollama;
mod openai;

pub use anthropic::AnthropicAdapter;
pub use embedded::EmbeddedAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::config::CoreConfig;
use crate::model_registry::DEFAULT_MODEL;
use crate::model_registry::ProviderId;
use crate::policy::CaseSensitivity;
use crate::policy::PayloadClass;
use crate::policy::RedactionStatus;

/// Errors from adapter operations.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Credentials missing or unusable for this provider.
    #[error("not authenticated: {0}")]
    NotAuthenticated(String),

    /// Network request failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The provider returned an error response.
    #[error("provider error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a provider response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Stream ended unexpectedly.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Normalized streaming event. Every vendor protocol reduces to text
/// deltas followed by a terminal `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    Delta(String),
    Done,
}

/// Uniform adapter stream: deltas and errors in arrival order.
pub type AdapterStream = Pin<Box<dyn Stream<Item = AdapterResult<AdapterEvent>> + Send>>;

/// Role of one chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One chat message in provider-neutral form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: MessageRole::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.to_string(),
        }
    }
}

/// Per-call dispatch configuration.
///
/// Carries both the model request and the governance context the policy
/// engine evaluates. The gateway may rewrite `model`/`provider` when the
/// policy decision substitutes a fallback; that rewrite is invisible in
/// the response contract.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Requested model id. Empty means "use the runtime's selected model".
    pub model: String,
    pub provider: ProviderId,
    pub max_tokens: u32,
    pub temperature: Option<f32>,

    // Governance context.
    pub case_sensitivity: CaseSensitivity,
    pub payload_class: PayloadClass,
    pub redaction_status: Option<RedactionStatus>,
    pub user_id: Option<String>,
    pub matter_id: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider: ProviderId::Anthropic,
            max_tokens: 4096,
            temperature: None,
            case_sensitivity: CaseSensitivity::default(),
            payload_class: PayloadClass::default(),
            redaction_status: None,
            user_id: None,
            matter_id: None,
        }
    }
}

impl DispatchConfig {
    pub fn for_model(model: &str, provider: ProviderId) -> Self {
        Self {
            model: model.to_string(),
            provider,
            ..Default::default()
        }
    }
}

/// A vendor chat adapter.
///
/// `stream_chat` yields normalized events; `complete_chat` drains the
/// stream by default, which suits providers without a separate
/// non-streaming endpoint.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        config: &DispatchConfig,
    ) -> AdapterResult<AdapterStream>;

    async fn complete_chat(
        &self,
        messages: &[ChatMessage],
        config: &DispatchConfig,
    ) -> AdapterResult<String> {
        let mut stream = self.stream_chat(messages, config).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                AdapterEvent::Delta(delta) => text.push_str(&delta),
                AdapterEvent::Done => break,
            }
        }
        Ok(text)
    }
}

/// Closed lookup table from provider tag to adapter.
///
/// Adding a provider means registering an implementation here, not
/// touching the gateway's control flow.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderId, Arc<dyn ChatAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the built-in adapter set. Config wins over the
    /// environment for the local runner's base URL.
    pub fn with_defaults(config: &CoreConfig) -> Self {
        let ollama = match &config.ollama_base_url {
            Some(url) => OllamaAdapter::new(Some(url.clone())),
            None => OllamaAdapter::from_env(),
        };

        let mut registry = Self::new();
        registry.register(Arc::new(AnthropicAdapter::from_env()));
        registry.register(Arc::new(OpenAiAdapter::from_env()));
        registry.register(Arc::new(ollama));
        registry.register(Arc::new(EmbeddedAdapter::new()));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ChatAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: ProviderId) -> Option<Arc<dyn ChatAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}
