//! Chat client contract tests.
//!
//! Verify exact HTTP format compliance for the OpenAI-compatible
//! streaming client against a mock server: request body shape, SSE
//! stream decoding, tool-call delta reassembly, and error mapping.

use futures_util::StreamExt;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use brio::config::ChatConfig;
use brio::llm::{ChatBackend, ChatEvent, FinishReason, LlmError, Message, OpenAiChatClient, ToolDescriptor};

fn client_for(server: &MockServer) -> OpenAiChatClient {
    let config = ChatConfig {
        base_url: server.uri(),
        api_key: "test-key".into(),
        model: "test-model".into(),
        temperature: 0.0,
        timeout_s: 5,
    };
    OpenAiChatClient::new(config, reqwest::Client::new())
}

async fn collect(client: &OpenAiChatClient, messages: &[Message]) -> Vec<ChatEvent> {
    let stream = client.send(messages, &[]).await.expect("stream opens");
    stream.collect().await
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

#[tokio::test]
async fn request_carries_model_messages_and_stream_flag() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": true,
            "temperature": 0.0,
            "messages": [{"role": "user", "content": "Hello"}]
        })))
        .respond_with(sse("data: [DONE]\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let events = collect(&client, &[Message::user("Hello")]).await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn request_serializes_tools_in_function_convention() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "tools": [{
                "type": "function",
                "function": {
                    "name": "clock",
                    "description": "current time",
                    "parameters": {"type": "object", "properties": {}}
                }
            }]
        })))
        .respond_with(sse("data: [DONE]\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let tools = vec![ToolDescriptor {
        name: "clock".into(),
        description: "current time".into(),
        parameters: json!({"type": "object", "properties": {}}),
    }];
    let stream = client.send(&[Message::user("time?")], &tools).await.unwrap();
    let _events: Vec<ChatEvent> = stream.collect().await;
}

#[tokio::test]
async fn text_deltas_stream_in_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo.\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let events = collect(&client, &[Message::user("hi")]).await;
    assert_eq!(
        events,
        vec![
            ChatEvent::TextDelta { text: "Hel".into() },
            ChatEvent::TextDelta { text: "lo.".into() },
            ChatEvent::StreamEnd {
                finish_reason: FinishReason::Stop
            },
        ]
    );
}

#[tokio::test]
async fn tool_call_fragments_reassemble() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",",
        "\"function\":{\"name\":\"calculator\",\"arguments\":\"\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,",
        "\"function\":{\"arguments\":\"{\\\"expression\\\":\\\"1+1\\\"}\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let events = collect(&client, &[Message::user("math")]).await;

    assert_eq!(
        events[0],
        ChatEvent::ToolCallStart {
            call_id: "call_1".into(),
            name: "calculator".into()
        }
    );
    let args: String = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::ToolCallArgsDelta { args, .. } => Some(args.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(args, r#"{"expression":"1+1"}"#);
    assert!(events.contains(&ChatEvent::ToolCallEnd {
        call_id: "call_1".into()
    }));
    assert_eq!(
        events.last(),
        Some(&ChatEvent::StreamEnd {
            finish_reason: FinishReason::ToolCalls
        })
    );
}

#[tokio::test]
async fn auth_failure_maps_to_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = match client.send(&[Message::user("hi")], &[]).await {
        Err(e) => e,
        Ok(_) => panic!("expected send to return an error"),
    };
    assert!(matches!(err, LlmError::Auth(_)));
    assert!(!err.is_retryable());
    assert!(err.to_string().contains("Incorrect API key"));
}

#[tokio::test]
async fn server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = match client.send(&[Message::user("hi")], &[]).await {
        Err(e) => e,
        Ok(_) => panic!("expected send to return an error"),
    };
    assert!(matches!(err, LlmError::Http { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn rate_limit_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = match client.send(&[Message::user("hi")], &[]).await {
        Err(e) => e,
        Ok(_) => panic!("expected send to return an error"),
    };
    assert!(matches!(err, LlmError::RateLimited(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn history_with_tool_exchange_serializes_correctly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user", "content": "what time is it?"},
                {"role": "assistant", "content": "", "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "clock", "arguments": "{}"}
                }]},
                {"role": "tool", "content": "14:30:25", "tool_call_id": "call_1"}
            ]
        })))
        .respond_with(sse("data: [DONE]\n\n"))
        .expect(1)
        .mount(&server)
        .await;

    let history = vec![
        Message::user("what time is it?"),
        Message::assistant_with_tool_calls(
            "",
            vec![brio::llm::AssistantToolCall {
                call_id: "call_1".into(),
                name: "clock".into(),
                arguments: "{}".into(),
            }],
        ),
        Message::tool_result("call_1", "14:30:25"),
    ];
    let client = client_for(&server);
    let _ = collect(&client, &history).await;
}
