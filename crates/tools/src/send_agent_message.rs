//! Send agent message tool — fire-and-forget messaging between agents.

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::tool::{Tool, ToolCall, ToolContext, ToolOutput};

pub struct SendAgentMessageTool;

#[async_trait]
impl Tool for SendAgentMessageTool {
    fn name(&self) -> &str {
        "send_agent_message"
    }

    fn description(&self) -> &str {
        "Send a message to another agent by id, or to \"parent\" for the agent that spawned you."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target_agent_id": { "type": "string" },
                "prompt": { "type": "string" }
            },
            "required": ["target_agent_id", "prompt"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let target = call.arguments["target_agent_id"].as_str().unwrap_or_default();
        let prompt = call.arguments["prompt"].as_str().unwrap_or_default();
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason,
        };

        let messenger = ctx
            .services
            .messenger
            .as_ref()
            .ok_or_else(|| failed("messaging is not available in this context".into()))?;
        let delivery = messenger
            .send_message(&ctx.agent, target, prompt)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let reply = if delivery.recipient_finished {
            format!(
                "Agent {} has finished its turn; message queued in its inbox",
                delivery.recipient
            )
        } else {
            format!("Message sent to agent {}", delivery.recipient)
        };
        Ok(ToolOutput::text(reply))
    }
}
