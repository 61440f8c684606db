//! Message domain types.
//!
//! Messages are the core value objects that flow through an agent's history:
//! the user prompt arrives → the model answers with tool markup → tool results
//! are appended → the model continues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in an agent's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user, or a relayed message from another agent
    User,
    /// The model (or a step program speaking as the agent)
    Assistant,
    /// System instructions
    System,
    /// Rendered tool results
    Tool,
}

/// A single message in an agent's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a message carrying a rendered tool-results block.
    pub fn tool_results(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

/// Serialize a history into the compact transcript handed to child agents
/// that ask for their parent's message history.
pub fn transcript(messages: &[Message]) -> String {
    let entries: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
        .collect();
    serde_json::Value::Array(entries).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
    }

    #[test]
    fn transcript_keeps_order_and_roles() {
        let history = vec![Message::user("first"), Message::assistant("second")];
        let parsed: serde_json::Value = serde_json::from_str(&transcript(&history)).unwrap();
        assert_eq!(parsed[0]["role"], "user");
        assert_eq!(parsed[0]["content"], "first");
        assert_eq!(parsed[1]["role"], "assistant");
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }
}
