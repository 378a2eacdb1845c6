//! Persisted session record.
//!
//! The on-disk form of a conversation: metadata plus the message
//! history, without the system prompt (it is re-supplied at load time
//! so prompt edits take effect on reload).

use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// A message as persisted. Assistant tool-call metadata stays in memory
/// only; the transcript keeps the visible exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedMessage {
    /// "user", "assistant", or "tool".
    pub role: String,
    /// Message text (or tool output).
    pub content: String,
    /// For tool messages: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// One session on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// `session_<unix_seconds>`.
    pub session_id: String,
    /// ISO-8601 creation time.
    pub created_at: String,
    /// Chat model in use when the session was created.
    pub model_id: String,
    /// Completed or timed-out turns so far.
    pub turns: u32,
    /// The conversation, system prompt excluded.
    pub conversation_history: Vec<PersistedMessage>,
}

impl SessionRecord {
    /// Create an empty record stamped with the current time.
    pub fn new(model_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            session_id: format!("session_{}", now.timestamp()),
            created_at: now.to_rfc3339(),
            model_id: model_id.into(),
            turns: 0,
            conversation_history: Vec::new(),
        }
    }

    /// Snapshot the in-memory history, dropping the system prompt.
    pub fn set_history(&mut self, history: &[Message]) {
        self.conversation_history = history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| PersistedMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect();
    }

    /// Rebuild in-memory history (to append after a fresh system prompt).
    pub fn to_messages(&self) -> Vec<Message> {
        self.conversation_history
            .iter()
            .filter_map(|m| {
                let role = match m.role.as_str() {
                    "user" => Role::User,
                    "assistant" => Role::Assistant,
                    "tool" => Role::Tool,
                    _ => return None,
                };
                Some(Message {
                    role,
                    content: m.content.clone(),
                    tool_call_id: m.tool_call_id.clone(),
                    tool_calls: Vec::new(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_is_never_persisted() {
        let mut record = SessionRecord::new("test-model");
        record.set_history(&[
            Message::system("secret prompt"),
            Message::user("hi"),
            Message::assistant("hello"),
        ]);
        assert_eq!(record.conversation_history.len(), 2);
        assert!(record.conversation_history.iter().all(|m| m.role != "system"));
    }

    #[test]
    fn serialization_round_trips_identically() {
        let mut record = SessionRecord::new("test-model");
        record.set_history(&[
            Message::user("什么时间了?"),
            Message::assistant("现在是下午两点。"),
            Message::tool_result("call_1", "14:00"),
        ]);
        record.turns = 1;

        let first = serde_json::to_string_pretty(&record).unwrap();
        let reloaded: SessionRecord = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string_pretty(&reloaded).unwrap();
        assert_eq!(first, second);
        assert_eq!(reloaded, record);
    }

    #[test]
    fn session_id_has_documented_shape() {
        let record = SessionRecord::new("m");
        assert!(record.session_id.starts_with("session_"));
        let suffix = &record.session_id["session_".len()..];
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn to_messages_restores_roles() {
        let mut record = SessionRecord::new("m");
        record.set_history(&[
            Message::user("question"),
            Message::assistant("answer"),
        ]);
        let messages = record.to_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }
}
