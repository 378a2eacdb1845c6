//! Collects one chat round's event stream into structured data.
//!
//! Text deltas are forwarded to the splitter as they arrive by the
//! engine; this accumulator keeps the round's full text (for history)
//! and reassembles tool calls from their streamed fragments.

use std::collections::HashMap;

use crate::llm::{ChatEvent, FinishReason};

/// A completed tool call with reassembled arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedToolCall {
    /// The call ID from the model.
    pub call_id: String,
    /// The function name.
    pub name: String,
    /// Full JSON arguments string.
    pub arguments_json: String,
}

/// Everything one provider round produced.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// Full assistant text of the round.
    pub text: String,
    /// Completed tool calls in request order.
    pub tool_calls: Vec<CompletedToolCall>,
    /// Why the stream ended.
    pub finish_reason: FinishReason,
    /// Stream error, if the round broke mid-way.
    pub error: Option<String>,
}

#[derive(Debug)]
struct InProgress {
    name: String,
    args: String,
}

/// Accumulates [`ChatEvent`]s for one round.
#[derive(Debug, Default)]
pub struct RoundAccumulator {
    text: String,
    in_progress: HashMap<String, InProgress>,
    call_order: Vec<String>,
    completed: Vec<CompletedToolCall>,
    finish_reason: Option<FinishReason>,
    error: Option<String>,
}

impl RoundAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next event from the stream.
    pub fn push(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::TextDelta { text } => self.text.push_str(&text),
            ChatEvent::ToolCallStart { call_id, name } => {
                self.call_order.push(call_id.clone());
                self.in_progress.insert(
                    call_id,
                    InProgress {
                        name,
                        args: String::new(),
                    },
                );
            }
            ChatEvent::ToolCallArgsDelta { call_id, args } => {
                if let Some(call) = self.in_progress.get_mut(&call_id) {
                    call.args.push_str(&args);
                }
            }
            ChatEvent::ToolCallEnd { call_id } => self.complete_call(&call_id),
            ChatEvent::StreamEnd { finish_reason } => self.finish_reason = Some(finish_reason),
            ChatEvent::StreamError { error } => self.error = Some(error),
        }
    }

    /// Whether the round is over (normally or by error).
    pub fn is_ended(&self) -> bool {
        self.finish_reason.is_some() || self.error.is_some()
    }

    /// Finalize the round. Calls that never saw an end event are
    /// completed with whatever arguments arrived, in request order.
    pub fn finish(mut self) -> RoundOutcome {
        let order = std::mem::take(&mut self.call_order);
        for call_id in &order {
            if self.in_progress.contains_key(call_id) {
                self.complete_call(call_id);
            }
        }
        RoundOutcome {
            text: self.text,
            tool_calls: self.completed,
            finish_reason: self.finish_reason.unwrap_or(FinishReason::Other),
            error: self.error,
        }
    }

    fn complete_call(&mut self, call_id: &str) {
        if let Some(call) = self.in_progress.remove(call_id) {
            self.completed.push(CompletedToolCall {
                call_id: call_id.to_owned(),
                name: call.name,
                arguments_json: call.args,
            });
        }
    }
}
