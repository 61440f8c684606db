//! Set output tool — record the agent's structured report.
//!
//! When the agent's template declares an output schema, the payload must
//! satisfy it; a violation is returned to the model as an error result and
//! the previous output is kept.

use async_trait::async_trait;
use stepforge_core::error::ToolError;
use stepforge_core::tool::{AgentEffect, Tool, ToolCall, ToolContext, ToolOutput};

use crate::schema;

pub struct SetOutputTool;

#[async_trait]
impl Tool for SetOutputTool {
    fn name(&self) -> &str {
        "set_output"
    }

    fn description(&self) -> &str {
        "Set your final output. Pass a JSON object in the output parameter."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "output": {
                    "type": "object",
                    "description": "The report payload"
                }
            },
            "required": ["output"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        let output = call.arguments["output"].clone();
        if let Some(output_schema) = &ctx.template.output_schema {
            schema::check(output_schema, &output).map_err(|reason| ToolError::InvalidArguments {
                tool_name: self.name().to_string(),
                reason,
            })?;
        }
        Ok(ToolOutput::text("Output set.").with_effect(AgentEffect::SetOutput(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context_with;
    use stepforge_core::template::AgentTemplate;

    fn reviewer() -> AgentTemplate {
        let mut template = AgentTemplate::model_driven("reviewer", "m").with_tools(["set_output"]);
        template.output_schema = Some(serde_json::json!({
            "type": "object",
            "properties": { "verdict": { "type": "string" } },
            "required": ["verdict"]
        }));
        template
    }

    #[tokio::test]
    async fn accepts_conforming_output() {
        let ctx = context_with(reviewer());
        let call = ToolCall::new("set_output", serde_json::json!({"output": {"verdict": "ship"}}));
        let output = SetOutputTool.execute(&call, &ctx).await.unwrap();
        assert!(matches!(&output.effects[..], [AgentEffect::SetOutput(v)] if v["verdict"] == "ship"));
    }

    #[tokio::test]
    async fn rejects_output_violating_schema() {
        let ctx = context_with(reviewer());
        let call = ToolCall::new("set_output", serde_json::json!({"output": {"score": 3}}));
        let err = SetOutputTool.execute(&call, &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert!(!err.is_execution_failure());
    }
}
