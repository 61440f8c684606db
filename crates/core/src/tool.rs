//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what give an agent the ability to act: read files on the
//! client, spawn child agents, message other agents, record its output.
//! A handler never mutates agent state directly. It returns a [`ToolOutput`]
//! whose [`AgentEffect`]s the dispatcher applies in emission order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::agent::AgentState;
use crate::error::ToolError;
use crate::message::Message;
use crate::spawn::{AgentMessenger, AgentSpawner};
use crate::template::AgentTemplate;

/// A validated request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Schema-checked arguments as a JSON object
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// The single outcome paired with one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Name of the tool that produced this result
    pub tool_name: String,

    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content, or the error text
    pub output: String,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            tool_name: call.name.clone(),
            call_id: call.id.clone(),
            success: true,
            output: output.into(),
        }
    }

    pub fn error(tool_name: impl Into<String>, call_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            tool_name: tool_name.into(),
            call_id: call_id.into(),
            success: false,
            output: format!("Error: {error}"),
        }
    }
}

/// A deferred change to the dispatching agent's state.
#[derive(Debug, Clone)]
pub enum AgentEffect {
    /// Replace the agent's output/report payload.
    SetOutput(serde_json::Value),
    /// Append a message to the agent's history.
    AddMessage(Message),
    /// Record a freshly spawned child agent.
    AddChild(String),
    /// Mark the current turn as complete.
    EndTurn,
}

/// What a handler hands back to the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub output: String,
    pub effects: Vec<AgentEffect>,
}

impl ToolOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: AgentEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// The boundary call into the transport layer: an asynchronous round trip
/// asking the remote peer to execute a tool. Timeouts are the implementor's
/// responsibility.
#[async_trait]
pub trait ClientToolRequester: Send + Sync {
    async fn request_client_tool_call(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<String, String>;
}

/// Collaborators a handler may reach while it runs.
#[derive(Clone, Default)]
pub struct ToolServices {
    pub client: Option<Arc<dyn ClientToolRequester>>,
    pub spawner: Option<Arc<dyn AgentSpawner>>,
    pub messenger: Option<Arc<dyn AgentMessenger>>,
}

/// Everything a handler sees about the dispatch it belongs to.
///
/// `agent` is a snapshot taken when the call was emitted; effects of calls
/// still in flight are not visible in it.
#[derive(Clone)]
pub struct ToolContext {
    pub agent: Arc<AgentState>,
    pub template: Arc<AgentTemplate>,
    pub services: ToolServices,
}

impl ToolContext {
    /// Perform the client round trip for `call`, mapping every failure to a
    /// [`ToolError`].
    pub async fn request_client(&self, call: &ToolCall) -> std::result::Result<String, ToolError> {
        let client = self
            .services
            .client
            .as_ref()
            .ok_or_else(|| ToolError::ClientUnavailable(call.name.clone()))?;
        client
            .request_client_tool_call(&call.name, call.arguments.clone())
            .await
            .map_err(|reason| ToolError::ClientRejected {
                tool_name: call.name.clone(),
                reason,
            })
    }
}

/// A tool definition, as advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in the tool registry.
/// The parameter names recognized inside the tool's markup are the keys of
/// `properties` in [`Tool::parameters_schema`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_files", "end_turn").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether dispatching this tool ends the turn.
    fn ends_turn(&self) -> bool {
        false
    }

    /// Execute the tool.
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
