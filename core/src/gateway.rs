//! Provider routing and streaming gateway.
//!
//! Every inbound AI request passes through here: the policy engine decides
//! whether and where it may run, the decision is audited, the operation is
//! tracked, and the matching vendor adapter serves it. Callers receive one
//! uniform chunk envelope regardless of vendor; adapter failures terminate
//! the stream cleanly instead of crossing the stream boundary as panics or
//! errors.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use futures::StreamExt;
use serde::Serialize;

use chambers_telemetry::OperationStatus;
use chambers_telemetry::OperationTracker;

use crate::adapters::AdapterEvent;
use crate::adapters::AdapterRegistry;
use crate::adapters::ChatAdapter;
use crate::adapters::ChatMessage;
use crate::adapters::DispatchConfig;
use crate::config::CoreConfig;
use crate::error::GatewayError;
use crate::model_registry::Capability;
use crate::model_registry::ModelRegistry;
use crate::policy::PolicyDecision;
use crate::policy::PolicyRequest;
use crate::policy::audit::PolicyAuditLog;
use crate::policy::engine::PolicyEngine;
use crate::runtime::RuntimeState;

/// One chunk of a gateway stream.
///
/// The envelope is closed: a stream is zero or more `Delta`s, at most one
/// `Error`, and exactly one terminal `Done`. Nothing else ever crosses the
/// stream boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Delta { text: String },
    Error { message: String },
    Done,
}

/// Uniform stream returned by [`RoutingGateway::dispatch_stream`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// The orchestrator for all AI dispatch.
#[derive(Clone)]
pub struct RoutingGateway {
    registry: Arc<ModelRegistry>,
    engine: PolicyEngine,
    audit: PolicyAuditLog,
    tracker: OperationTracker,
    adapters: AdapterRegistry,
    runtime: RuntimeState,
}

impl RoutingGateway {
    pub fn new(
        registry: Arc<ModelRegistry>,
        adapters: AdapterRegistry,
        runtime: RuntimeState,
        config: &CoreConfig,
    ) -> Self {
        Self {
            engine: PolicyEngine::new(registry.clone()),
            audit: PolicyAuditLog::with_capacity(registry.clone(), config.audit_capacity),
            tracker: OperationTracker::with_capacity(config.ops_capacity, config.rate_table()),
            registry,
            adapters,
            runtime,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    pub fn audit(&self) -> &PolicyAuditLog {
        &self.audit
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    pub fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    /// Streams a chat request through policy, telemetry, and the resolved
    /// adapter. Denials and failures arrive as chunks; the stream always
    /// terminates with `Done`.
    pub fn dispatch_stream(
        &self,
        messages: Vec<ChatMessage>,
        config: DispatchConfig,
        caller: &str,
    ) -> ChunkStream {
        let gateway = self.clone();
        let caller = caller.to_string();

        Box::pin(stream! {
            let (decision, config) = gateway.decide(config, &caller);
            if !decision.allowed {
                tracing::info!(
                    model = %decision.original_model_id,
                    reason = %decision.reason,
                    "streaming dispatch denied by policy"
                );
                yield StreamChunk::Error { message: decision.reason.clone() };
                yield StreamChunk::Done;
                return;
            }

            let handle = gateway.tracker.start(
                config.provider.as_str(),
                &config.model,
                "stream_chat",
                &flatten_messages(&messages),
                &caller,
                None,
            );

            let mut output = String::new();
            let mut failure: Option<String> = None;

            match gateway.resolve_adapter(&config) {
                Err(err) => failure = Some(err.to_string()),
                Ok(adapter) => match adapter.stream_chat(&messages, &config).await {
                    Err(err) => failure = Some(err.to_string()),
                    Ok(mut upstream) => {
                        while let Some(event) = upstream.next().await {
                            match event {
                                Ok(AdapterEvent::Delta(text)) => {
                                    output.push_str(&text);
                                    yield StreamChunk::Delta { text };
                                }
                                Ok(AdapterEvent::Done) => break,
                                Err(err) => {
                                    failure = Some(err.to_string());
                                    break;
                                }
                            }
                        }
                    }
                },
            }

            match failure {
                None => {
                    gateway
                        .tracker
                        .complete(&handle, &output, OperationStatus::Success, None);
                    yield StreamChunk::Done;
                }
                Some(message) => {
                    tracing::warn!(
                        provider = %config.provider,
                        model = %config.model,
                        error = %message,
                        "adapter failure during streaming dispatch"
                    );
                    gateway
                        .tracker
                        .complete(&handle, &output, OperationStatus::Error, Some(&message));
                    yield StreamChunk::Error { message };
                    yield StreamChunk::Done;
                }
            }
        })
    }

    /// Non-streaming dispatch. Policy denials and adapter failures are
    /// returned as errors; the operation is tracked either way.
    pub async fn dispatch_once(
        &self,
        messages: Vec<ChatMessage>,
        config: DispatchConfig,
        caller: &str,
    ) -> Result<String, GatewayError> {
        let (decision, config) = self.decide(config, caller);
        if !decision.allowed {
            return Err(GatewayError::PolicyDenied {
                decision: Box::new(decision),
            });
        }
        self.run_once(&messages, &config, "chat", caller).await
    }

    /// Single-shot analysis of an image reference, restricted to
    /// vision-capable models.
    pub async fn analyze_vision(
        &self,
        prompt: &str,
        image_ref: &str,
        config: DispatchConfig,
        caller: &str,
    ) -> Result<String, GatewayError> {
        let (decision, config) = self.decide(config, caller);
        if !decision.allowed {
            return Err(GatewayError::PolicyDenied {
                decision: Box::new(decision),
            });
        }

        let supports_vision = self
            .registry
            .lookup(&config.model)
            .is_some_and(|entry| entry.supports(Capability::Vision));
        if !supports_vision {
            return Err(GatewayError::CapabilityMissing {
                model: config.model,
                capability: Capability::Vision,
            });
        }

        let messages = vec![ChatMessage::user(&format!(
            "{prompt}\n\n[attached image: {image_ref}]"
        ))];
        self.run_once(&messages, &config, "vision_analysis", caller)
            .await
    }

    /// Evaluates policy for a dispatch config, records the decision in the
    /// audit log, and applies any model substitution. The substitution is
    /// invisible in the response contract; telemetry records the effective
    /// model.
    fn decide(&self, mut config: DispatchConfig, caller: &str) -> (PolicyDecision, DispatchConfig) {
        if config.model.is_empty() {
            config.model = self.runtime.selected_model();
        }

        let request = PolicyRequest {
            mode: self.runtime.mode(),
            requested_model_id: config.model.clone(),
            case_sensitivity: config.case_sensitivity,
            payload_class: config.payload_class,
            redaction_status: config.redaction_status,
            user_id: config.user_id.clone(),
            matter_id: config.matter_id.clone(),
            caller: Some(caller.to_string()),
        };

        let decision = self.engine.evaluate(&request);
        self.audit.record(&request, &decision);

        if decision.allowed {
            if decision.was_fallback {
                tracing::info!(
                    requested = %decision.original_model_id,
                    effective = %decision.effective_model_id,
                    caller = %caller,
                    "model substituted by policy fallback"
                );
            }
            config.model = decision.effective_model_id.clone();
            if let Some(provider) = decision.effective_provider {
                config.provider = provider;
            }
        }

        (decision, config)
    }

    fn resolve_adapter(&self, config: &DispatchConfig) -> Result<Arc<dyn ChatAdapter>, GatewayError> {
        self.adapters
            .get(config.provider)
            .ok_or(GatewayError::UnknownProvider(config.provider))
    }

    async fn run_once(
        &self,
        messages: &[ChatMessage],
        config: &DispatchConfig,
        operation: &str,
        caller: &str,
    ) -> Result<String, GatewayError> {
        let handle = self.tracker.start(
            config.provider.as_str(),
            &config.model,
            operation,
            &flatten_messages(messages),
            caller,
            None,
        );

        let result = match self.resolve_adapter(config) {
            Ok(adapter) => adapter
                .complete_chat(messages, config)
                .await
                .map_err(GatewayError::from),
            Err(err) => Err(err),
        };

        match result {
            Ok(text) => {
                self.tracker
                    .complete(&handle, &text, OperationStatus::Success, None);
                Ok(text)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(
                    provider = %config.provider,
                    model = %config.model,
                    error = %message,
                    "dispatch failed"
                );
                self.tracker
                    .complete(&handle, "", OperationStatus::Error, Some(&message));
                Err(err)
            }
        }
    }
}

/// Flattens the conversation for fingerprinting. Telemetry stores the hash
/// of this text, never the text itself.
fn flatten_messages(messages: &[ChatMessage]) -> String {
    let mut flat = String::new();
    for message in messages {
        flat.push_str(message.content.as_str());
        flat.push('\n');
    }
    flat
}
