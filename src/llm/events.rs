//! Normalized streaming event model for the chat endpoint.
//!
//! The HTTP client decodes provider SSE into a flat sequence of
//! [`ChatEvent`]s. A typical stream flows:
//!
//! ```text
//! TextDelta* -> StreamEnd
//! ```
//!
//! and with tool calls:
//!
//! ```text
//! ToolCallStart -> ToolCallArgsDelta* -> ToolCallEnd -> StreamEnd
//! ```

/// A normalized streaming event from the chat endpoint.
///
/// Events arrive in temporal order; each is a discrete unit of the
/// model's output.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A fragment of assistant text.
    TextDelta {
        /// The decoded text fragment.
        text: String,
    },

    /// The model has begun a tool call.
    ToolCallStart {
        /// Identifier linking all events for this call.
        call_id: String,
        /// The function being called.
        name: String,
    },

    /// A fragment of a tool call's JSON arguments.
    ToolCallArgsDelta {
        /// Identifier linking this delta to its start event.
        call_id: String,
        /// A fragment of the arguments string.
        args: String,
    },

    /// A tool call's arguments are complete.
    ToolCallEnd {
        /// Identifier linking this end to its start event.
        call_id: String,
    },

    /// The stream ended normally.
    StreamEnd {
        /// Why the model stopped.
        finish_reason: FinishReason,
    },

    /// The stream broke.
    StreamError {
        /// What went wrong.
        error: String,
    },
}

/// The reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of the response.
    Stop,
    /// Hit the token limit.
    Length,
    /// The model wants to call one or more tools.
    ToolCalls,
    /// Content was filtered.
    ContentFilter,
    /// Provider-specific or unknown reason.
    Other,
}

impl FinishReason {
    /// Map the provider's `finish_reason` string.
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ToolCalls => write!(f, "tool_calls"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::Other => write!(f, "other"),
        }
    }
}
