//! Message domain types.
//!
//! These are the core value objects that flow through the entire system:
//! client sends raw messages → sanitizer normalizes them → context assembler
//! blends them with session history → provider generates a response.

use serde::{Deserialize, Serialize};

/// Metadata key under which summary key facts travel to providers.
pub const KEY_DATA_METADATA: &str = "keyData";

/// The role of a message sender in a conversation.
///
/// A closed set. Anything a client sends outside of it parses to `User`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    #[default]
    User,
    /// The AI assistant
    Assistant,
    /// System instructions and summarized history
    System,
}

impl Role {
    /// Total parse: unknown roles become `User`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single, normalized message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Optional per-message persona hint supplied by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_context: Option<String>,

    /// Optional metadata (summary key data, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            role_context: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn with_role_context(mut self, role_context: impl Into<String>) -> Self {
        self.role_context = Some(role_context.into());
        self
    }

    /// Key facts attached to a summary message, if any.
    pub fn key_data(&self) -> Vec<String> {
        self.metadata
            .get(KEY_DATA_METADATA)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// An inbound message exactly as a client sent it.
///
/// Every field is an arbitrary JSON value; nothing is trusted until the
/// sanitizer turns it into a [`Message`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    #[serde(default)]
    pub role: serde_json::Value,

    #[serde(default)]
    pub content: serde_json::Value,

    #[serde(default)]
    pub role_context: serde_json::Value,
}

impl RawMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: serde_json::Value::String(role.to_string()),
            content: serde_json::Value::String(content.into()),
            role_context: serde_json::Value::Null,
        }
    }

    /// Coerce role and content into the typed shape. Role context is left
    /// for the sanitizer to validate.
    pub fn coerce(self) -> Message {
        let role = match &self.role {
            serde_json::Value::String(s) => Role::parse(s),
            _ => Role::User,
        };
        let content = match self.content {
            serde_json::Value::Null => String::new(),
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        let role_context = match self.role_context {
            serde_json::Value::String(s) => Some(s),
            _ => None,
        };
        Message {
            role,
            content,
            role_context,
            metadata: serde_json::Map::new(),
        }
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        Self {
            role: serde_json::Value::String(message.role.as_str().to_string()),
            content: serde_json::Value::String(message.content),
            role_context: message
                .role_context
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_parse_is_total() {
        assert_eq!(Role::parse("assistant"), Role::Assistant);
        assert_eq!(Role::parse("system"), Role::System);
        assert_eq!(Role::parse("user"), Role::User);
        assert_eq!(Role::parse("ai"), Role::User);
        assert_eq!(Role::parse("ASSISTANT"), Role::User);
        assert_eq!(Role::parse(""), Role::User);
    }

    #[test]
    fn coerce_non_string_content() {
        let raw = RawMessage {
            role: json!("assistant"),
            content: json!(42),
            role_context: json!(null),
        };
        let msg = raw.coerce();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "42");
    }

    #[test]
    fn coerce_null_content_and_non_string_role() {
        let raw = RawMessage {
            role: json!(7),
            content: json!(null),
            role_context: json!(["ignored"]),
        };
        let msg = raw.coerce();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "");
        assert!(msg.role_context.is_none());
    }

    #[test]
    fn raw_message_tolerates_missing_fields() {
        let raw: RawMessage = serde_json::from_str(r#"{"content": "hi"}"#).unwrap();
        let msg = raw.coerce();
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hi");
    }

    #[test]
    fn message_uses_camel_case_on_the_wire() {
        let msg = Message::user("plan my launch").with_role_context("growth coach");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"roleContext\":\"growth coach\""));
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn key_data_reads_metadata() {
        let mut msg = Message::system("summary");
        msg.metadata
            .insert(KEY_DATA_METADATA.into(), json!(["budget: $5k", "launch: May"]));
        assert_eq!(msg.key_data(), vec!["budget: $5k", "launch: May"]);
        assert!(Message::user("x").key_data().is_empty());
    }
}
