//! Client-executed tools.
//!
//! These tools touch the user's machine, so the runtime never runs them
//! itself. The handler forwards the call over the [`ClientToolRequester`]
//! boundary and the peer's answer becomes the result. A missing client, a
//! rejection, or a timeout on the peer's side all become error results.
//!
//! [`ClientToolRequester`]: stepforge_core::tool::ClientToolRequester

use async_trait::async_trait;
use serde_json::{Value, json};
use stepforge_core::error::ToolError;
use stepforge_core::tool::{Tool, ToolCall, ToolContext, ToolOutput};
use tracing::debug;

/// A tool whose handler is a client round trip.
pub struct ClientTool {
    name: &'static str,
    description: &'static str,
    schema: Value,
}

impl ClientTool {
    pub fn read_files() -> Self {
        Self {
            name: "read_files",
            description: "Read the contents of one or more files, relative to the project root.",
            schema: json!({
                "type": "object",
                "properties": {
                    "paths": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 1,
                        "description": "The file paths to read"
                    }
                },
                "required": ["paths"],
                "additionalProperties": false
            }),
        }
    }

    pub fn write_file() -> Self {
        Self {
            name: "write_file",
            description: "Write content to a file. Creates the file if it doesn't exist, overwrites if it does.",
            schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "The file path to write to"
                    },
                    "content": {
                        "type": "string",
                        "description": "The content to write"
                    }
                },
                "required": ["path", "content"],
                "additionalProperties": false
            }),
        }
    }

    pub fn run_terminal_command() -> Self {
        Self {
            name: "run_terminal_command",
            description: "Execute a shell command in the project and return stdout/stderr.",
            schema: json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    },
                    "cwd": {
                        "type": "string",
                        "description": "Working directory relative to the project root"
                    }
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl Tool for ClientTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
        debug!(agent_id = %ctx.agent.agent_id, tool = %call.name, call_id = %call.id, "Requesting client tool call");
        ctx.request_client(call).await.map(ToolOutput::text)
    }
}
