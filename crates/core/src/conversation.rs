//! A role's reasoning transcript: the Reason-Act-Observe loop's append-only
//! message history, trimmed FIFO under budget pressure (spec.md §4.3/§4.9).

use chrono::{DateTime, Utc};
use warden_provider::{Message, Role as MessageRole};

#[derive(Debug)]
pub struct Transcript {
    pub id: String,
    pub created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops the oldest non-system, non-final-user turn until `messages()`
    /// fits `max_messages`, preserving the system turn and the most recent
    /// user turn (spec.md §4.3's trimming policy, reused for per-role loops).
    pub fn trim_fifo(&mut self, max_messages: usize) {
        if self.messages.len() <= max_messages {
            return;
        }
        let keep_first_system = self
            .messages
            .first()
            .is_some_and(|m| m.role == MessageRole::System);

        while self.messages.len() > max_messages {
            let drop_at = if keep_first_system { 1 } else { 0 };
            if drop_at >= self.messages.len().saturating_sub(1) {
                break;
            }
            self.messages.remove(drop_at);
        }
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: MessageRole, content: &str) -> Message {
        Message {
            role,
            content: warden_provider::MessageContent::Text(content.to_string()),
        }
    }

    #[test]
    fn trim_preserves_system_and_most_recent_user_turn() {
        let mut t = Transcript::new();
        t.push(msg(MessageRole::System, "s"));
        for i in 0..10 {
            t.push(msg(MessageRole::User, &format!("u{i}")));
        }
        t.trim_fifo(3);
        assert!(t.len() <= 3);
        assert_eq!(t.messages().first().unwrap().role, MessageRole::System);
        assert_eq!(t.messages().last().unwrap().content.as_text(), "u9");
    }
}
