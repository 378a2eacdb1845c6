//! The turn engine: drives chat rounds, dispatches tools, and feeds the
//! splitter.
//!
//! One call to [`ReasoningLoop::run_turn`] handles one user utterance:
//! stream a round, forward text deltas to the splitter, execute any
//! requested tools serially in request order, and loop, up to the
//! round cap. The engine never waits for audio; it returns to the
//! supervisor as soon as the assistant text is complete. A turn always
//! resolves to one of four outcomes and never propagates an error
//! across its boundary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::llm::{ChatBackend, ChatEvent, ChatEventStream, FinishReason, LlmError, Message};
use crate::llm::message::AssistantToolCall;
use crate::pipeline::{Interrupt, PipelineHandle, SentenceSplitter};
use crate::tools::{ToolRegistry, validate_args};

use super::accumulator::{CompletedToolCall, RoundAccumulator};

/// Fixed apology spoken on any non-completed outcome so the user never
/// hears dead air.
pub const APOLOGY: &str = "Sorry, please say that again.";

/// Reasoning loop tuning.
#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    /// Hard cap on chat rounds per turn.
    pub max_rounds: u32,
    /// Per-tool execution deadline.
    pub tool_timeout: Duration,
    /// Backoff before the single transient-error retry.
    pub retry_backoff: Duration,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            tool_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// How a turn resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The assistant finished its reply.
    Completed,
    /// The reasoning deadline elapsed first.
    TimedOut,
    /// Barge-in cancelled the turn.
    Cancelled,
    /// Round cap or an unrecoverable chat error.
    Failed,
}

impl std::fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One entry in the turn's ordered tool log.
#[derive(Debug, Clone)]
pub struct ToolCallLog {
    /// Tool name as requested by the model.
    pub name: String,
    /// Raw JSON arguments string.
    pub args: String,
    /// Result string, or the error string fed back to the model.
    pub result: std::result::Result<String, String>,
}

/// What one turn produced.
#[derive(Debug)]
pub struct TurnReport {
    /// Unique id for logs and metrics.
    pub turn_id: String,
    /// How the turn resolved.
    pub outcome: TurnOutcome,
    /// All assistant text produced across rounds (before cleaning).
    pub assistant_text: String,
    /// Ordered tool call log.
    pub tool_calls: Vec<ToolCallLog>,
    /// Chat rounds performed.
    pub rounds: u32,
    /// The model emitted an end-of-conversation sentinel.
    pub should_end: bool,
    /// Wall-clock duration of the reasoning phase.
    pub duration: Duration,
}

/// Why a round could not produce a stream.
enum RoundAbort {
    Cancelled,
    TimedOut,
    Error(LlmError),
}

/// Drives multi-round tool calling for one session.
pub struct ReasoningLoop {
    chat: Arc<dyn ChatBackend>,
    registry: Arc<ToolRegistry>,
    config: ReasoningConfig,
    interrupt: Interrupt,
}

impl ReasoningLoop {
    /// Create the loop over a chat backend and tool registry.
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        registry: Arc<ToolRegistry>,
        config: ReasoningConfig,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            chat,
            registry,
            config,
            interrupt,
        }
    }

    /// Run one turn against `history`, streaming segments into the
    /// pipeline. `deadline` bounds the time to the last assistant
    /// character; audio drain is the supervisor's concern.
    pub async fn run_turn(
        &self,
        history: &mut Vec<Message>,
        splitter: &mut SentenceSplitter,
        pipeline: &PipelineHandle,
        user_text: &str,
        deadline: Instant,
    ) -> TurnReport {
        let started = Instant::now();
        let turn_id = uuid::Uuid::new_v4().to_string();
        let turn_start_len = history.len();
        history.push(Message::user(user_text));

        let descriptors = self.registry.descriptors();
        let mut assistant_text = String::new();
        // Text produced since the last history append; what a timeout
        // salvages without duplicating earlier rounds.
        let mut pending_text = String::new();
        let mut tool_log: Vec<ToolCallLog> = Vec::new();
        let mut rounds = 0u32;

        let outcome = 'turn: loop {
            if rounds >= self.config.max_rounds {
                warn!(%turn_id, "round cap of {} exceeded", self.config.max_rounds);
                self.speak_apology(splitter, pipeline).await;
                break 'turn TurnOutcome::Failed;
            }
            rounds += 1;

            let mut stream = match self.send_with_retry(history, &descriptors, deadline).await {
                Ok(stream) => stream,
                Err(RoundAbort::Cancelled) => break 'turn TurnOutcome::Cancelled,
                Err(RoundAbort::TimedOut) => break 'turn TurnOutcome::TimedOut,
                Err(RoundAbort::Error(e)) => {
                    warn!(%turn_id, "chat round failed: {e}");
                    self.speak_apology(splitter, pipeline).await;
                    break 'turn TurnOutcome::Failed;
                }
            };

            // Consume the stream, forwarding text to the splitter as it
            // arrives.
            let mut acc = RoundAccumulator::new();
            loop {
                let event = tokio::select! {
                    () = self.interrupt.raised() => break 'turn TurnOutcome::Cancelled,
                    () = tokio::time::sleep_until(deadline.into()) => {
                        break 'turn TurnOutcome::TimedOut;
                    }
                    event = stream.next() => event,
                };
                let Some(event) = event else { break };
                if let ChatEvent::TextDelta { text } = &event {
                    assistant_text.push_str(text);
                    pending_text.push_str(text);
                    for segment in splitter.ingest(text, false) {
                        pipeline.submit(segment).await;
                    }
                }
                acc.push(event);
                if acc.is_ended() {
                    break;
                }
            }

            let round = acc.finish();
            if let Some(error) = round.error {
                warn!(%turn_id, "stream broke mid-round: {error}");
                self.speak_apology(splitter, pipeline).await;
                break 'turn TurnOutcome::Failed;
            }

            if round.finish_reason == FinishReason::ToolCalls && !round.tool_calls.is_empty() {
                info!(
                    %turn_id,
                    round = rounds,
                    tools = ?round.tool_calls.iter().map(|c| &c.name).collect::<Vec<_>>(),
                    "model requested tool calls"
                );
                // The requesting assistant message goes in first, then
                // each tool result in request order.
                let requested: Vec<AssistantToolCall> = round
                    .tool_calls
                    .iter()
                    .map(|call| AssistantToolCall {
                        call_id: call.call_id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments_json.clone(),
                    })
                    .collect();
                let exchange_start = history.len();
                history.push(Message::assistant_with_tool_calls(
                    round.text.clone(),
                    requested,
                ));
                pending_text.clear();

                for call in &round.tool_calls {
                    if self.interrupt.is_raised() {
                        history.truncate(exchange_start);
                        break 'turn TurnOutcome::Cancelled;
                    }
                    if Instant::now() >= deadline {
                        history.truncate(exchange_start);
                        break 'turn TurnOutcome::TimedOut;
                    }
                    let result = self.dispatch(call).await;
                    let content = match &result {
                        Ok(output) => output.clone(),
                        Err(error) => format!("ERROR: {error}"),
                    };
                    history.push(Message::tool_result(&call.call_id, content));
                    tool_log.push(ToolCallLog {
                        name: call.name.clone(),
                        args: call.arguments_json.clone(),
                        result,
                    });
                }
                continue 'turn;
            }

            // Final round: flush the splitter and close out history.
            for segment in splitter.ingest("", true) {
                pipeline.submit(segment).await;
            }
            history.push(Message::assistant(round.text));
            break 'turn TurnOutcome::Completed;
        };

        match outcome {
            TurnOutcome::Completed => {}
            TurnOutcome::TimedOut => {
                splitter.clear();
                if !pending_text.is_empty() {
                    // Keep the completed prefix so a follow-up turn can
                    // refer back to it.
                    history.push(Message::assistant(pending_text.clone()));
                } else if history.len() == turn_start_len + 1 {
                    // Nothing came back at all; drop the dangling user
                    // message so the next turn starts clean.
                    history.truncate(turn_start_len);
                }
            }
            TurnOutcome::Cancelled => {
                splitter.clear();
                history.truncate(turn_start_len);
            }
            TurnOutcome::Failed => {
                history.truncate(turn_start_len);
            }
        }

        let should_end = splitter.take_should_end();
        let duration = started.elapsed();
        debug!(
            %turn_id,
            outcome = %outcome,
            rounds,
            tool_calls = tool_log.len(),
            duration_ms = duration.as_millis() as u64,
            "turn finished"
        );

        TurnReport {
            turn_id,
            outcome,
            assistant_text,
            tool_calls: tool_log,
            rounds,
            should_end,
            duration,
        }
    }

    /// Open a round's stream, retrying once on a transient failure.
    async fn send_with_retry(
        &self,
        history: &[Message],
        descriptors: &[crate::llm::ToolDescriptor],
        deadline: Instant,
    ) -> std::result::Result<ChatEventStream, RoundAbort> {
        let mut retried = false;
        loop {
            if self.interrupt.is_raised() {
                return Err(RoundAbort::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(RoundAbort::TimedOut);
            }
            let result = tokio::select! {
                () = self.interrupt.raised() => return Err(RoundAbort::Cancelled),
                () = tokio::time::sleep_until(deadline.into()) => {
                    return Err(RoundAbort::TimedOut);
                }
                result = self.chat.send(history, descriptors) => result,
            };
            match result {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_retryable() && !retried => {
                    retried = true;
                    debug!("transient chat error, retrying once: {e}");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(RoundAbort::Error(e)),
            }
        }
    }

    /// Validate and execute one tool call; errors become the string fed
    /// back to the model.
    async fn dispatch(&self, call: &CompletedToolCall) -> std::result::Result<String, String> {
        let Some(tool) = self.registry.get(&call.name) else {
            return Err(format!("unknown tool '{}'", call.name));
        };
        let args = validate_args(&call.name, &call.arguments_json, &tool.schema())
            .map_err(|e| e.to_string())?;

        let task = tokio::task::spawn_blocking(move || tool.invoke(args));
        let outcome = tokio::select! {
            () = self.interrupt.raised() => return Err("cancelled".into()),
            outcome = tokio::time::timeout(self.config.tool_timeout, task) => outcome,
        };
        match outcome {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join_error)) => Err(format!("tool panicked: {join_error}")),
            Err(_) => Err(format!(
                "tool '{}' timed out after {}s",
                call.name,
                self.config.tool_timeout.as_secs()
            )),
        }
    }

    /// Queue the fixed apology through the splitter so sequences stay
    /// dense and the turn closes out normally downstream.
    async fn speak_apology(&self, splitter: &mut SentenceSplitter, pipeline: &PipelineHandle) {
        for segment in splitter.ingest(APOLOGY, true) {
            pipeline.submit(segment).await;
        }
    }
}
