//! Live response events.
//!
//! `AgentStreamEvent` is what a connected client sees while agents run:
//! model text as it arrives, tool activity, failures, and completion. Every
//! event names the agent it belongs to, since children stream into the same
//! channel as their parent.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted while an agent runs.
///
/// - `chunk`       — a text fragment from the model
/// - `tool_call`   — a tool call was admitted and its handler started
/// - `tool_result` — a tool result was applied, in dispatch order
/// - `error`       — a step failed; the turn ends
/// - `done`        — the agent's turn is complete
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Chunk { agent_id: String, content: String },

    ToolCall {
        agent_id: String,
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        agent_id: String,
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    Error { agent_id: String, message: String },

    Done {
        agent_id: String,
        steps_used: u32,
        tool_calls_made: usize,
    },
}

impl AgentStreamEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    pub fn agent_id(&self) -> &str {
        match self {
            Self::Chunk { agent_id, .. }
            | Self::ToolCall { agent_id, .. }
            | Self::ToolResult { agent_id, .. }
            | Self::Error { agent_id, .. }
            | Self::Done { agent_id, .. } => agent_id,
        }
    }
}

/// Where live events go. A closed receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<AgentStreamEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<AgentStreamEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self::default()
    }

    /// A sink plus the receiver that reads it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentStreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: AgentStreamEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_chunk() {
        let event = AgentStreamEvent::Chunk {
            agent_id: "a1".into(),
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_tool_call() {
        let event = AgentStreamEvent::ToolCall {
            agent_id: "a1".into(),
            id: "call_1".into(),
            name: "read_files".into(),
            input: serde_json::json!({"paths": ["a.rs"]}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"read_files""#));
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"error","agent_id":"a1","message":"boom"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type(), "error");
        assert_eq!(event.agent_id(), "a1");
    }

    #[tokio::test]
    async fn sink_delivers_and_tolerates_closed_receiver() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(AgentStreamEvent::Done {
            agent_id: "a1".into(),
            steps_used: 1,
            tool_calls_made: 0,
        });
        assert_eq!(rx.recv().await.unwrap().event_type(), "done");
        drop(rx);
        sink.emit(AgentStreamEvent::Error {
            agent_id: "a1".into(),
            message: "ignored".into(),
        });
        EventSink::discard().emit(AgentStreamEvent::Error {
            agent_id: "a1".into(),
            message: "ignored".into(),
        });
    }
}
