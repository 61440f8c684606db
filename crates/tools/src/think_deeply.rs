//! Think deeply tool — a scratchpad the model writes to before acting.

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::tool::{Tool, ToolCall, ToolContext, ToolOutput};
use tracing::debug;

pub struct ThinkDeeplyTool;

#[async_trait]
impl Tool for ThinkDeeplyTool {
    fn name(&self) -> &str {
        "think_deeply"
    }

    fn description(&self) -> &str {
        "Think through a hard problem step by step. The thought is kept in your history only."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "thought": {
                    "type": "string",
                    "description": "Your detailed reasoning"
                }
            },
            "required": ["thought"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let thought = call.arguments["thought"].as_str().unwrap_or_default();
        debug!(agent_id = %ctx.agent.agent_id, chars = thought.len(), "Recorded thought");
        Ok(ToolOutput::default())
    }
}
