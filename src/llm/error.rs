//! Error type for the chat-model layer.
//!
//! Each variant carries a stable code (SCREAMING_SNAKE_CASE) included in
//! the Display output. [`LlmError::is_retryable`] drives the single-retry
//! policy for transient failures.

/// Errors produced when talking to the chat endpoint.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Invalid or missing configuration.
    #[error("[CONFIG_INVALID] {0}")]
    Config(String),

    /// Authentication failed (401/403).
    #[error("[AUTH_FAILED] {0}")]
    Auth(String),

    /// Rate limited by the provider (429).
    #[error("[RATE_LIMITED] {0}")]
    RateLimited(String),

    /// Non-success HTTP status not covered by the variants above.
    #[error("[HTTP_{status}] {message}")]
    Http {
        /// The HTTP status code returned.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// Transport-level failure (connect, reset, DNS).
    #[error("[REQUEST_FAILED] {0}")]
    Request(String),

    /// The response stream broke mid-way.
    #[error("[STREAM_FAILED] {0}")]
    Stream(String),

    /// A request or round deadline elapsed.
    #[error("[TIMEOUT] {0}")]
    Timeout(String),
}

impl LlmError {
    /// Whether a single retry with backoff is worthwhile.
    ///
    /// Transport failures, timeouts, rate limits, and 5xx responses are
    /// transient; auth and other 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Config(_) | Self::Auth(_) | Self::Stream(_) => false,
        }
    }
}

/// Convenience alias for chat-layer results.
pub type Result<T> = std::result::Result<T, LlmError>;
