//! End-to-end gateway flows using the real embedded adapter: no mocks and
//! no network, the way a credential-less workstation actually runs.

use std::sync::Arc;

use futures::StreamExt;

use chambers_core::AdapterRegistry;
use chambers_core::ChatMessage;
use chambers_core::CoreConfig;
use chambers_core::DispatchConfig;
use chambers_core::ModelRegistry;
use chambers_core::ProviderId;
use chambers_core::RoutingGateway;
use chambers_core::RuntimeMode;
use chambers_core::RuntimeState;
use chambers_core::StreamChunk;
use chambers_core::adapters::EmbeddedAdapter;
use chambers_core::credentials::FixedCredentialProbe;
use chambers_telemetry::OperationStatus;

/// A gateway as it exists on a machine with no provider credentials and no
/// local runner: only the embedded assistant is available.
fn credential_less_gateway() -> RoutingGateway {
    let registry = Arc::new(ModelRegistry::build(&FixedCredentialProbe::granting(&[
        ProviderId::Embedded,
    ])));
    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(EmbeddedAdapter::new()));
    RoutingGateway::new(
        registry,
        adapters,
        RuntimeState::default(),
        &CoreConfig::default(),
    )
}

async fn collect(gateway: &RoutingGateway, config: DispatchConfig) -> Vec<StreamChunk> {
    let mut stream = gateway.dispatch_stream(
        vec![ChatMessage::user("Review the engagement letter")],
        config,
        "integration-test",
    );
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk);
    }
    chunks
}

#[tokio::test]
async fn unavailable_external_model_degrades_to_embedded_assistant() {
    let gateway = credential_less_gateway();
    let chunks = collect(
        &gateway,
        DispatchConfig::for_model("claude-sonnet-4-5", ProviderId::Anthropic),
    )
    .await;

    // The caller sees a plain successful stream; the substitution shows up
    // only in audit and telemetry.
    assert!(chunks.len() >= 2);
    assert!(matches!(chunks[0], StreamChunk::Delta { .. }));
    assert_eq!(*chunks.last().expect("terminal chunk"), StreamChunk::Done);
    assert!(!chunks.iter().any(|c| matches!(c, StreamChunk::Error { .. })));

    let entry = &gateway.audit().query(1)[0];
    assert!(entry.was_fallback);
    assert_eq!(entry.effective_model_id, "chambers-mini");
    assert!(!entry.external_call_made);

    let record = &gateway.tracker().query(1, 0)[0];
    assert_eq!(record.model, "chambers-mini");
    assert_eq!(record.status, OperationStatus::Success);
}

#[tokio::test]
async fn offline_mode_end_to_end_serves_locally() {
    let gateway = credential_less_gateway();
    gateway.runtime().set_mode(RuntimeMode::RestrictedOffline);

    let text = gateway
        .dispatch_once(
            vec![ChatMessage::user("Any filing deadlines this week?")],
            DispatchConfig::for_model("gpt-4o", ProviderId::OpenAi),
            "integration-test",
        )
        .await
        .expect("offline dispatch must degrade, not fail");

    assert!(text.contains("no case data left the machine"));
    let entry = &gateway.audit().query(1)[0];
    assert_eq!(entry.mode, RuntimeMode::RestrictedOffline);
    assert!(!entry.external_call_made);
}

#[tokio::test]
async fn audit_and_tracker_stay_coherent_over_many_calls() {
    let gateway = credential_less_gateway();

    for _ in 0..20 {
        let _ = collect(
            &gateway,
            DispatchConfig::for_model("chambers-mini", ProviderId::Embedded),
        )
        .await;
    }

    assert_eq!(gateway.audit().len(), 20);
    assert_eq!(gateway.tracker().len(), 20);

    let summary = gateway.tracker().summarize();
    assert_eq!(summary.total_calls, 20);
    assert_eq!(summary.success_rate, 100.0);
    assert_eq!(summary.by_model["chambers-mini"].calls, 20);
    assert_eq!(summary.by_operation["stream_chat"].calls, 20);
    assert_eq!(summary.last_24h.calls, 20);
    assert!(summary.total_cost_usd > 0.0);
}

#[tokio::test]
async fn buffers_stay_bounded_under_sustained_traffic() {
    let registry = Arc::new(ModelRegistry::build(&FixedCredentialProbe::granting(&[
        ProviderId::Embedded,
    ])));
    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(EmbeddedAdapter::new()));
    // Small capacities keep the test fast while exercising eviction.
    let config = CoreConfig {
        audit_capacity: 50,
        ops_capacity: 50,
        ..Default::default()
    };
    let gateway = RoutingGateway::new(registry, adapters, RuntimeState::default(), &config);

    for _ in 0..120 {
        gateway
            .dispatch_once(
                vec![ChatMessage::user("ping")],
                DispatchConfig::for_model("chambers-mini", ProviderId::Embedded),
                "integration-test",
            )
            .await
            .expect("dispatch");
    }

    assert_eq!(gateway.audit().len(), 50);
    assert_eq!(gateway.tracker().len(), 50);

    for window in gateway.audit().query(50).windows(2) {
        assert!(window[0].timestamp >= window[1].timestamp);
    }
    for window in gateway.tracker().query(50, 0).windows(2) {
        assert!(window[0].timestamp >= window[1].timestamp);
    }
}

#[tokio::test]
async fn denied_calls_are_audited_but_never_dispatched() {
    let registry = Arc::new(ModelRegistry::build(&FixedCredentialProbe::granting(&[
        ProviderId::Anthropic,
    ])));
    let gateway = RoutingGateway::new(
        registry,
        AdapterRegistry::new(),
        RuntimeState::default(),
        &CoreConfig::default(),
    );
    let mut config = DispatchConfig::for_model("claude-sonnet-4-5", ProviderId::Anthropic);
    config.payload_class = chambers_core::PayloadClass::Raw;
    config.redaction_status = Some(chambers_core::RedactionStatus::Failed);

    let err = gateway
        .dispatch_once(vec![ChatMessage::user("raw intake")], config, "integration-test")
        .await
        .expect_err("must deny");
    assert!(err.to_string().contains("redaction failed"));

    assert_eq!(gateway.audit().len(), 1);
    assert!(!gateway.audit().query(1)[0].allowed);
    assert!(gateway.tracker().is_empty());
}
