//! Spawning and messaging traits for dependency inversion.
//!
//! `stepforge-tools` defines the tools that spawn and message agents;
//! `stepforge-agent` owns the coordinator that implements these traits.
//! This avoids a circular dependency between the two crates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::AgentState;
use crate::error::{MessagingError, SpawnError};

/// Symbolic message target resolved to the sender's recorded parent.
pub const PARENT_ALIAS: &str = "parent";

/// One entry of a `spawn_agents` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Target template id
    pub agent_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// Per-request result of a spawn batch.
#[derive(Debug, Clone)]
pub struct SpawnOutcome {
    pub agent_type: String,
    /// The new agent's id on success.
    pub result: Result<String, SpawnError>,
}

/// Render a batch as `N/M successful` followed by one line per request.
pub fn summarize(outcomes: &[SpawnOutcome]) -> String {
    let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
    let mut summary = format!("Spawned agents ({}/{} successful):", succeeded, outcomes.len());
    for outcome in outcomes {
        let line = match &outcome.result {
            Ok(agent_id) => format!("\n- {}: spawned agent {}", outcome.agent_type, agent_id),
            Err(e) => format!("\n- {}: failed: {}", outcome.agent_type, e),
        };
        summary.push_str(&line);
    }
    summary
}

/// Launches child agents without blocking the spawning agent.
#[async_trait]
pub trait AgentSpawner: Send + Sync {
    /// Validate and launch every request independently. One failing request
    /// never prevents its siblings from spawning.
    async fn spawn_agents(&self, parent: &AgentState, requests: Vec<SpawnRequest>) -> Vec<SpawnOutcome>;
}

/// Where a relayed message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// The resolved recipient id
    pub recipient: String,
    /// The recipient's turn is already over; the message waits in its inbox
    /// until something runs it again.
    pub recipient_finished: bool,
}

/// Relays fire-and-forget messages between agents.
#[async_trait]
pub trait AgentMessenger: Send + Sync {
    /// Deliver `content` to `target` (an agent id or [`PARENT_ALIAS`]).
    async fn send_message(
        &self,
        sender: &AgentState,
        target: &str,
        content: &str,
    ) -> Result<Delivery, MessagingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_successes() {
        let outcomes = vec![
            SpawnOutcome {
                agent_type: "file_picker".into(),
                result: Ok("a1".into()),
            },
            SpawnOutcome {
                agent_type: "editor".into(),
                result: Err(SpawnError::NotSpawnable {
                    parent: "base".into(),
                    child: "editor".into(),
                }),
            },
        ];
        let summary = summarize(&outcomes);
        assert!(summary.starts_with("Spawned agents (1/2 successful):"));
        assert!(summary.contains("- file_picker: spawned agent a1"));
        assert!(summary.contains("- editor: failed: Agent type editor is not in the spawnable agents list of base"));
    }

    #[test]
    fn spawn_request_accepts_missing_fields() {
        let request: SpawnRequest = serde_json::from_value(serde_json::json!({"agent_type": "reviewer"})).unwrap();
        assert_eq!(request.agent_type, "reviewer");
        assert!(request.prompt.is_none());
        assert!(request.params.is_none());
    }
}
