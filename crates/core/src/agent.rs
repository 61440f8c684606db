//! Agent state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, Role};
use crate::tool::AgentEffect;

/// Runtime state of one agent, owned by its step controller during a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Unique, stable for the agent's lifetime
    pub agent_id: String,

    /// Names the template this agent was built from
    pub agent_type: String,

    /// Free-form context blob (`{"prompt": ..., "params": ...}` for spawned agents)
    #[serde(default)]
    pub context: serde_json::Value,

    /// Agents spawned by this one
    #[serde(default)]
    pub child_ids: Vec<String>,

    /// Ordered message history
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Remaining model steps before the turn is forced to end
    pub steps_remaining: u32,

    /// Output/report payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    /// Recorded parent, if this agent was spawned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl AgentState {
    /// Create a root agent with a fresh id.
    pub fn new(agent_type: impl Into<String>, context: serde_json::Value, steps: u32) -> Self {
        Self {
            agent_id: Uuid::new_v4().to_string(),
            agent_type: agent_type.into(),
            context,
            child_ids: Vec::new(),
            messages: Vec::new(),
            steps_remaining: steps,
            output: None,
            parent_id: None,
        }
    }

    /// Create a child agent recording `parent_id`.
    pub fn child_of(
        parent_id: impl Into<String>,
        agent_type: impl Into<String>,
        context: serde_json::Value,
        steps: u32,
    ) -> Self {
        Self {
            parent_id: Some(parent_id.into()),
            ..Self::new(agent_type, context, steps)
        }
    }

    /// The prompt in the context blob, if any.
    pub fn prompt(&self) -> Option<&str> {
        self.context.get("prompt").and_then(|p| p.as_str())
    }

    /// The params object in the context blob, if any.
    pub fn params(&self) -> Option<&serde_json::Value> {
        self.context.get("params").filter(|p| !p.is_null())
    }

    /// Content of the most recent assistant message.
    pub fn last_assistant_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Apply one handler effect. Returns `true` when the effect ends the turn.
    pub fn apply(&mut self, effect: AgentEffect) -> bool {
        match effect {
            AgentEffect::SetOutput(value) => self.output = Some(value),
            AgentEffect::AddMessage(message) => self.messages.push(message),
            AgentEffect::AddChild(id) => {
                if !self.child_ids.contains(&id) {
                    self.child_ids.push(id);
                }
            }
            AgentEffect::EndTurn => return true,
        }
        false
    }

    /// Record a step failure in the report field.
    pub fn record_error(&mut self, error: impl std::fmt::Display) {
        self.output = Some(serde_json::json!({ "error": error.to_string() }));
    }
}

/// A message relayed from one agent to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    pub from_agent_id: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl InboxMessage {
    pub fn new(from_agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            from_agent_id: from_agent_id.into(),
            content: content.into(),
            sent_at: Utc::now(),
        }
    }

    /// Render as the user message appended to the recipient's history.
    pub fn into_message(self) -> Message {
        Message::user(format!(
            "<agent_message from=\"{}\">\n{}\n</agent_message>",
            self.from_agent_id, self.content
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_records_parent() {
        let child = AgentState::child_of("P", "file_picker", serde_json::json!({"prompt": "find"}), 3);
        assert_eq!(child.parent_id.as_deref(), Some("P"));
        assert_eq!(child.prompt(), Some("find"));
        assert!(child.params().is_none());
    }

    #[test]
    fn effects_apply_in_place() {
        let mut state = AgentState::new("base", serde_json::Value::Null, 10);
        assert!(!state.apply(AgentEffect::AddChild("c1".into())));
        assert!(!state.apply(AgentEffect::AddChild("c1".into())));
        assert!(!state.apply(AgentEffect::SetOutput(serde_json::json!({"ok": true}))));
        assert!(state.apply(AgentEffect::EndTurn));
        assert_eq!(state.child_ids, vec!["c1".to_string()]);
        assert_eq!(state.output, Some(serde_json::json!({"ok": true})));
    }

    #[test]
    fn inbox_message_names_sender() {
        let msg = InboxMessage::new("child-7", "done reading").into_message();
        assert_eq!(msg.role, Role::User);
        assert!(msg.content.contains("from=\"child-7\""));
        assert!(msg.content.contains("done reading"));
    }
}
