//! Inbound message sanitization.
//!
//! Runs before anything leaves the process. A total function: the worst
//! input still yields a valid, possibly empty, sequence.

use crate::message::{Message, RawMessage};

/// Default cap on the number of messages forwarded to a provider.
pub const DEFAULT_MAX_MESSAGES: usize = 200;

#[derive(Debug, Clone, Copy)]
pub struct MessageSanitizer {
    max_messages: usize,
}

impl Default for MessageSanitizer {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

impl MessageSanitizer {
    pub fn new(max_messages: usize) -> Self {
        Self { max_messages }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Coerce untyped client input, then apply the typed rules.
    pub fn sanitize_raw(&self, messages: Vec<RawMessage>) -> Vec<Message> {
        self.sanitize(messages.into_iter().map(RawMessage::coerce).collect())
    }

    /// Normalize role context, drop blank messages, keep the newest
    /// `max_messages`. Idempotent.
    pub fn sanitize(&self, messages: Vec<Message>) -> Vec<Message> {
        let mut safe: Vec<Message> = messages
            .into_iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|mut m| {
                m.role_context = m
                    .role_context
                    .map(|rc| rc.trim().to_string())
                    .filter(|rc| !rc.is_empty());
                m
            })
            .collect();

        if safe.len() > self.max_messages {
            let excess = safe.len() - self.max_messages;
            safe.drain(..excess);
        }
        safe
    }
}
