//! OpenAI-compatible streaming chat client.
//!
//! Builds `/v1/chat/completions` requests with `stream: true`, decodes
//! the SSE response, and normalizes delta chunks to [`ChatEvent`]s.
//! Tool-call fragments are reassembled across chunks by
//! [`ToolCallAccumulator`] before start/delta/end events are emitted.

use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::config::ChatConfig;
use crate::llm::error::LlmError;
use crate::llm::events::{ChatEvent, FinishReason};
use crate::llm::message::Message;
use crate::llm::sse::SseParser;

/// A tool made visible to the model, in the
/// `{type: function, function: {...}}` convention.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    /// Function name the model uses to call the tool.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// A finite, non-restartable stream of normalized chat events.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// Anything that can run one streaming chat round.
///
/// The production implementation is [`OpenAiChatClient`]; tests inject
/// scripted backends.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the conversation and tool descriptors, returning the event
    /// stream for this round.
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ChatEventStream, LlmError>;
}

// ── Request building ──────────────────────────────────────────

/// Build the JSON request body for the Chat Completions API.
pub fn build_request(
    config: &ChatConfig,
    messages: &[Message],
    tools: &[ToolDescriptor],
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": config.model,
        "messages": messages_to_wire(messages),
        "temperature": config.temperature,
        "stream": true,
    });
    if !tools.is_empty()
        && let Some(obj) = body.as_object_mut()
    {
        let tools_json: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        obj.insert("tools".into(), serde_json::json!(tools_json));
    }
    body
}

fn messages_to_wire(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|msg| {
            let mut fields = serde_json::Map::new();
            fields.insert("role".into(), serde_json::json!(msg.role.to_string()));
            fields.insert("content".into(), serde_json::json!(msg.content));
            if let Some(ref call_id) = msg.tool_call_id {
                fields.insert("tool_call_id".into(), serde_json::json!(call_id));
            }
            if !msg.tool_calls.is_empty() {
                let calls: Vec<serde_json::Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        serde_json::json!({
                            "id": tc.call_id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments,
                            }
                        })
                    })
                    .collect();
                fields.insert("tool_calls".into(), serde_json::json!(calls));
            }
            serde_json::Value::Object(fields)
        })
        .collect()
}

// ── Response parsing ──────────────────────────────────────────

/// Reassembles tool calls streamed as indexed fragments.
///
/// The endpoint streams each tool call as chunks keyed by an index; the
/// id and name arrive on the first chunk, argument fragments on the
/// rest. This tracks which calls have started and emits the matching
/// start/delta events.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    active: HashMap<u64, PartialCall>,
}

#[derive(Debug)]
struct PartialCall {
    call_id: String,
    name: String,
    started: bool,
}

impl ToolCallAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one tool-call fragment from a delta chunk.
    pub fn process(
        &mut self,
        index: u64,
        id: Option<&str>,
        name: Option<&str>,
        args: Option<&str>,
    ) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        let call = self.active.entry(index).or_insert_with(|| PartialCall {
            call_id: id.unwrap_or_default().to_owned(),
            name: name.unwrap_or_default().to_owned(),
            started: false,
        });
        if let Some(id) = id
            && !id.is_empty()
        {
            call.call_id = id.to_owned();
        }
        if let Some(name) = name
            && !name.is_empty()
        {
            call.name = name.to_owned();
        }
        if !call.started {
            call.started = true;
            events.push(ChatEvent::ToolCallStart {
                call_id: call.call_id.clone(),
                name: call.name.clone(),
            });
        }
        if let Some(args) = args
            && !args.is_empty()
        {
            events.push(ChatEvent::ToolCallArgsDelta {
                call_id: call.call_id.clone(),
                args: args.to_owned(),
            });
        }
        events
    }

    /// Emit `ToolCallEnd` for every active call, in index order.
    pub fn finish_all(&mut self) -> Vec<ChatEvent> {
        let mut indices: Vec<u64> = self.active.keys().copied().collect();
        indices.sort_unstable();
        let events = indices
            .iter()
            .filter_map(|i| self.active.get(i))
            .filter(|c| c.started)
            .map(|c| ChatEvent::ToolCallEnd {
                call_id: c.call_id.clone(),
            })
            .collect();
        self.active.clear();
        events
    }
}

/// Parse one SSE data payload from the streaming endpoint.
pub fn parse_chunk(data: &str, accumulator: &mut ToolCallAccumulator) -> Vec<ChatEvent> {
    let parsed: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let mut events = Vec::new();
    let Some(choices) = parsed.get("choices").and_then(|c| c.as_array()) else {
        return events;
    };
    for choice in choices {
        if let Some(delta) = choice.get("delta") {
            if let Some(content) = delta.get("content").and_then(|c| c.as_str())
                && !content.is_empty()
            {
                events.push(ChatEvent::TextDelta {
                    text: content.to_owned(),
                });
            }
            if let Some(tool_calls) = delta.get("tool_calls").and_then(|tc| tc.as_array()) {
                for tc in tool_calls {
                    let index = tc.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                    let id = tc.get("id").and_then(|i| i.as_str());
                    let function = tc.get("function");
                    let name = function.and_then(|f| f.get("name")).and_then(|n| n.as_str());
                    let args = function
                        .and_then(|f| f.get("arguments"))
                        .and_then(|a| a.as_str());
                    events.extend(accumulator.process(index, id, name, args));
                }
            }
        }
        if let Some(reason) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            if reason == "tool_calls" {
                events.extend(accumulator.finish_all());
            }
            events.push(ChatEvent::StreamEnd {
                finish_reason: FinishReason::from_wire(reason),
            });
        }
    }
    events
}

// ── HTTP client ───────────────────────────────────────────────

/// Streaming chat client for OpenAI-compatible endpoints.
pub struct OpenAiChatClient {
    config: ChatConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatClient")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl OpenAiChatClient {
    /// Create a client over a shared connection pool.
    pub fn new(config: ChatConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        let message = extract_error_message(body);
        match status.as_u16() {
            401 | 403 => LlmError::Auth(message),
            429 => LlmError::RateLimited(message),
            code => LlmError::Http {
                status: code,
                message,
            },
        }
    }
}

/// Pull the human-readable message out of an error response body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_owned())
}

#[async_trait]
impl ChatBackend for OpenAiChatClient {
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<ChatEventStream, LlmError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);
        let body = build_request(&self.config, messages, tools);

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body);

        // The timeout covers connection and response headers; the body
        // keeps streaming past it under the reasoning deadline.
        let response = tokio::time::timeout(
            std::time::Duration::from_secs(self.config.timeout_s),
            request.send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(format!("no response after {}s", self.config.timeout_s)))?
        .map_err(|e| LlmError::Request(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        Ok(Box::pin(event_stream(response.bytes_stream())))
    }
}

/// Decode a byte stream into [`ChatEvent`]s.
fn event_stream(
    bytes: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = ChatEvent> + Send {
    struct State<S> {
        bytes: Pin<Box<S>>,
        sse: SseParser,
        accumulator: ToolCallAccumulator,
        buffered: Vec<ChatEvent>,
    }

    futures_util::stream::unfold(
        State {
            bytes: Box::pin(bytes),
            sse: SseParser::new(),
            accumulator: ToolCallAccumulator::new(),
            buffered: Vec::new(),
        },
        |mut state| async move {
            loop {
                if !state.buffered.is_empty() {
                    let event = state.buffered.remove(0);
                    return Some((event, state));
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        for sse_event in state.sse.push(&chunk) {
                            if sse_event.is_done() {
                                continue;
                            }
                            state
                                .buffered
                                .extend(parse_chunk(&sse_event.data, &mut state.accumulator));
                        }
                    }
                    Some(Err(e)) => {
                        let event = ChatEvent::StreamError {
                            error: format!("stream read error: {e}"),
                        };
                        return Some((event, state));
                    }
                    None => {
                        if let Some(sse_event) = state.sse.flush()
                            && !sse_event.is_done()
                        {
                            state
                                .buffered
                                .extend(parse_chunk(&sse_event.data, &mut state.accumulator));
                            continue;
                        }
                        return None;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::AssistantToolCall;

    fn test_config() -> ChatConfig {
        ChatConfig {
            base_url: "http://localhost".into(),
            api_key: "test-key".into(),
            model: "test-model".into(),
            temperature: 0.0,
            timeout_s: 5,
        }
    }

    #[test]
    fn request_has_required_fields() {
        let body = build_request(&test_config(), &[Message::user("hi")], &[]);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn request_includes_tool_descriptors() {
        let tools = vec![ToolDescriptor {
            name: "clock".into(),
            description: "current time".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }];
        let body = build_request(&test_config(), &[Message::user("time?")], &tools);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "clock");
    }

    #[test]
    fn wire_format_for_tool_messages() {
        let messages = vec![
            Message::assistant_with_tool_calls(
                "",
                vec![AssistantToolCall {
                    call_id: "call_1".into(),
                    name: "clock".into(),
                    arguments: "{}".into(),
                }],
            ),
            Message::tool_result("call_1", "14:30:25"),
        ];
        let wire = messages_to_wire(&messages);
        assert_eq!(wire[0]["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "clock");
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_call_id"], "call_1");
    }

    #[test]
    fn parse_text_delta() {
        let mut acc = ToolCallAccumulator::new();
        let events = parse_chunk(
            r#"{"choices":[{"delta":{"content":"Hello"}}]}"#,
            &mut acc,
        );
        assert_eq!(
            events,
            vec![ChatEvent::TextDelta {
                text: "Hello".into()
            }]
        );
    }

    #[test]
    fn parse_empty_content_skipped() {
        let mut acc = ToolCallAccumulator::new();
        let events = parse_chunk(r#"{"choices":[{"delta":{"content":""}}]}"#, &mut acc);
        assert!(events.is_empty());
    }

    #[test]
    fn parse_finish_stop() {
        let mut acc = ToolCallAccumulator::new();
        let events = parse_chunk(
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
            &mut acc,
        );
        assert_eq!(
            events,
            vec![ChatEvent::StreamEnd {
                finish_reason: FinishReason::Stop
            }]
        );
    }

    #[test]
    fn parse_garbage_yields_nothing() {
        let mut acc = ToolCallAccumulator::new();
        assert!(parse_chunk("not json", &mut acc).is_empty());
    }

    #[test]
    fn tool_call_reassembled_across_chunks() {
        let mut acc = ToolCallAccumulator::new();
        let mut events = parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"clock","arguments":""}}]}}]}"#,
            &mut acc,
        );
        events.extend(parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"tz\":"}}]}}]}"#,
            &mut acc,
        ));
        events.extend(parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"utc\"}"}}]}},{"delta":{},"finish_reason":"tool_calls"}]}"#,
            &mut acc,
        ));

        assert_eq!(
            events[0],
            ChatEvent::ToolCallStart {
                call_id: "call_9".into(),
                name: "clock".into()
            }
        );
        let args: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::ToolCallArgsDelta { args, .. } => Some(args.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(args, r#"{"tz":"utc"}"#);
        assert!(events.contains(&ChatEvent::ToolCallEnd {
            call_id: "call_9".into()
        }));
        assert_eq!(
            events.last(),
            Some(&ChatEvent::StreamEnd {
                finish_reason: FinishReason::ToolCalls
            })
        );
    }

    #[test]
    fn parallel_tool_calls_tracked_by_index() {
        let mut acc = ToolCallAccumulator::new();
        let events = parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[
                {"index":0,"id":"call_a","function":{"name":"clock","arguments":"{}"}},
                {"index":1,"id":"call_b","function":{"name":"calculator","arguments":"{}"}}
            ]}}]}"#,
            &mut acc,
        );
        let starts: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::ToolCallStart { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec!["clock", "calculator"]);
        // Ends arrive in index order.
        let ends: Vec<String> = acc
            .finish_all()
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::ToolCallEnd { call_id } => Some(call_id),
                _ => None,
            })
            .collect();
        assert_eq!(ends, vec!["call_a", "call_b"]);
    }

    #[test]
    fn error_message_extraction() {
        let body = r#"{"error":{"message":"invalid model","type":"invalid_request_error"}}"#;
        assert_eq!(extract_error_message(body), "invalid model");
        assert_eq!(extract_error_message("plain text"), "plain text");
    }
}
