//! Add message tool — append a message to the agent's own history.

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::message::Message;
use stepforge_core::tool::{AgentEffect, Tool, ToolCall, ToolContext, ToolOutput};

pub struct AddMessageTool;

#[async_trait]
impl Tool for AddMessageTool {
    fn name(&self) -> &str {
        "add_message"
    }

    fn description(&self) -> &str {
        "Add a user or assistant message to your conversation history."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "role": { "type": "string", "enum": ["user", "assistant"] },
                "content": { "type": "string" }
            },
            "required": ["role", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let content = call.arguments["content"].as_str().unwrap_or_default();
        let message = match call.arguments["role"].as_str() {
            Some("assistant") => Message::assistant(content),
            _ => Message::user(content),
        };
        Ok(ToolOutput::text("Message added.").with_effect(AgentEffect::AddMessage(message)))
    }
}
