//! Wire-level adapter tests against mocked provider endpoints.

use futures::StreamExt;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

use chambers_core::ChatMessage;
use chambers_core::DispatchConfig;
use chambers_core::ProviderId;
use chambers_core::adapters::AnthropicAdapter;
use chambers_core::adapters::OllamaAdapter;
use chambers_core::adapters::OpenAiAdapter;
use chambers_core::adapters::{AdapterError, AdapterEvent, ChatAdapter};

fn anthropic_sse() -> String {
    [
        r#"event: message_start
data: {"type":"message_start","message":{"id":"msg_1","model":"claude-sonnet-4-5"}}"#,
        r#"event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"text"}}"#,
        r#"event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Counsel, "}}"#,
        r#"event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"noted."}}"#,
        r#"event: message_stop
data: {"type":"message_stop"}"#,
    ]
    .join("\n\n")
        + "\n\n"
}

#[tokio::test]
async fn anthropic_stream_normalizes_sse_to_deltas() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(anthropic_sse(), "text/event-stream"))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(server.uri(), Some("test-key".to_string()));
    let config = DispatchConfig::for_model("claude-sonnet-4-5", ProviderId::Anthropic);

    let mut stream = adapter
        .stream_chat(&[ChatMessage::user("Acknowledge the filing")], &config)
        .await
        .expect("stream");

    let mut deltas = Vec::new();
    let mut saw_done = false;
    while let Some(event) = stream.next().await {
        match event.expect("event") {
            AdapterEvent::Delta(text) => deltas.push(text),
            AdapterEvent::Done => saw_done = true,
        }
    }
    assert_eq!(deltas, vec!["Counsel, ".to_string(), "noted.".to_string()]);
    assert!(saw_done);
}

#[tokio::test]
async fn anthropic_api_error_is_surfaced_with_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string(
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
        ))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(server.uri(), Some("bad-key".to_string()));
    let config = DispatchConfig::for_model("claude-sonnet-4-5", ProviderId::Anthropic);

    let err = adapter
        .stream_chat(&[ChatMessage::user("hi")], &config)
        .await
        .map(|_| ())
        .expect_err("401 must fail");
    match err {
        AdapterError::Api { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("invalid x-api-key"));
        }
        other => panic!("expected api error, got {other}"),
    }
}

#[tokio::test]
async fn anthropic_without_key_never_hits_the_network() {
    let adapter = AnthropicAdapter::new("http://127.0.0.1:9".to_string(), None);
    let config = DispatchConfig::for_model("claude-sonnet-4-5", ProviderId::Anthropic);

    let err = adapter
        .stream_chat(&[ChatMessage::user("hi")], &config)
        .await
        .map(|_| ())
        .expect_err("no key configured");
    assert!(matches!(err, AdapterError::NotAuthenticated(_)));
}

#[tokio::test]
async fn openai_stream_handles_data_lines_and_done_marker() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Filed \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"today.\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(server.uri(), Some("test-key".to_string()));
    let config = DispatchConfig::for_model("gpt-4o", ProviderId::OpenAi);

    let text = adapter
        .complete_chat(&[ChatMessage::user("Status?")], &config)
        .await
        .expect("complete");
    assert_eq!(text, "Filed today.");
}

#[tokio::test]
async fn ollama_stream_parses_ndjson_lines() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"message\":{\"role\":\"assistant\",\"content\":\"Drafting \"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"locally.\"},\"done\":false}\n",
        "{\"done\":true,\"total_duration\":120}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new(Some(server.uri()));
    let config = DispatchConfig::for_model("ollama-llama3", ProviderId::Ollama);

    let text = adapter
        .complete_chat(&[ChatMessage::user("Draft locally")], &config)
        .await
        .expect("complete");
    assert_eq!(text, "Drafting locally.");
}

#[tokio::test]
async fn ollama_error_line_fails_the_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("{\"error\":\"model not loaded\"}\n", "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new(Some(server.uri()));
    let config = DispatchConfig::for_model("ollama-llama3", ProviderId::Ollama);

    let mut stream = adapter
        .stream_chat(&[ChatMessage::user("hi")], &config)
        .await
        .expect("request itself succeeds");

    let first = stream.next().await.expect("one item");
    assert!(first.is_err());
    assert!(first.expect_err("error item").to_string().contains("model not loaded"));
}
