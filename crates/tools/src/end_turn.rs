//! End turn tool — the terminal signal of a turn.

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::tool::{AgentEffect, Tool, ToolCall, ToolContext, ToolOutput};

pub struct EndTurnTool;

#[async_trait]
impl Tool for EndTurnTool {
    fn name(&self) -> &str {
        "end_turn"
    }

    fn description(&self) -> &str {
        "End your turn. Any tool calls written after this one are ignored."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    fn ends_turn(&self) -> bool {
        true
    }

    async fn execute(&self, _call: &ToolCall, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text("Turn ended.").with_effect(AgentEffect::EndTurn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context;

    #[tokio::test]
    async fn emits_end_turn_effect() {
        let ctx = context(&["end_turn"]);
        let output = EndTurnTool
            .execute(&ToolCall::new("end_turn", serde_json::json!({})), &ctx)
            .await
            .unwrap();
        assert!(matches!(output.effects[..], [AgentEffect::EndTurn]));
        assert!(EndTurnTool.ends_turn());
    }
}
