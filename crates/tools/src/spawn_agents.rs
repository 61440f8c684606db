//! Spawn agents tool — launch a batch of child agents.
//!
//! Each request is validated and launched independently by the coordinator;
//! the result lists every request, and a failed one never blocks its
//! siblings. The handler returns as soon as the children are launched.

use async_trait::async_trait;
use stepforge_core::error::{SpawnError, ToolError};
use stepforge_core::spawn::{SpawnOutcome, SpawnRequest, summarize};
use stepforge_core::tool::{AgentEffect, Tool, ToolCall, ToolContext, ToolOutput};

pub struct SpawnAgentsTool;

#[async_trait]
impl Tool for SpawnAgentsTool {
    fn name(&self) -> &str {
        "spawn_agents"
    }

    fn description(&self) -> &str {
        "Spawn one or more sub-agents. They run in the background; use send_agent_message to coordinate."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "agents": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "agent_type": { "type": "string" },
                            "prompt": { "type": "string" },
                            "params": { "type": "object" }
                        },
                        "required": ["agent_type"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["agents"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let requests: Vec<SpawnRequest> = serde_json::from_value(call.arguments["agents"].clone())
            .map_err(|e| ToolError::InvalidArguments {
                tool_name: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let outcomes = match &ctx.services.spawner {
            Some(spawner) => spawner.spawn_agents(&ctx.agent, requests).await,
            None => requests
                .into_iter()
                .map(|r| SpawnOutcome {
                    agent_type: r.agent_type,
                    result: Err(SpawnError::Unsupported),
                })
                .collect(),
        };

        let mut output = ToolOutput::text(summarize(&outcomes));
        for outcome in outcomes {
            if let Ok(agent_id) = outcome.result {
                output = output.with_effect(AgentEffect::AddChild(agent_id));
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;

    #[tokio::test]
    async fn without_spawner_every_request_fails() {
        let ctx = context(&["spawn_agents"]);
        let call = ToolCall::new(
            "spawn_agents",
            serde_json::json!({"agents": [{"agent_type": "file_picker", "prompt": "x"}]}),
        );
        let output = SpawnAgentsTool.execute(&call, &ctx).await.unwrap();
        assert!(output.output.starts_with("Spawned agents (0/1 successful):"));
        assert!(output.effects.is_empty());
    }
}
