//! Error types for the StepForge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Apart from
//! [`RegistryError`] (fatal at startup), none of these escape a dispatch or
//! step cycle: they are rendered into tool results or the agent's report.

use thiserror::Error;

/// The top-level error type for all StepForge operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Step program errors ---
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    // --- Spawn errors ---
    #[error("Spawn error: {0}")]
    Spawn(#[from] SpawnError),

    // --- Messaging errors ---
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    // --- Template registry errors ---
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider exhausted: {0}")]
    Exhausted(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool {tool_name} is not available to agent template {template_id}")]
    Unavailable {
        tool_name: String,
        template_id: String,
    },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("No client connected to execute {0}")]
    ClientUnavailable(String),

    #[error("Client rejected {tool_name}: {reason}")]
    ClientRejected { tool_name: String, reason: String },
}

impl ToolError {
    /// Whether this error happened inside a handler (as opposed to being
    /// rejected before any handler ran).
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            ToolError::ExecutionFailed { .. }
                | ToolError::ClientUnavailable(_)
                | ToolError::ClientRejected { .. }
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error("Step program for agent {agent_id} failed: {reason}")]
    Program { agent_id: String, reason: String },

    #[error("Step program for agent {agent_id} panicked: {reason}")]
    Panicked { agent_id: String, reason: String },

    #[error("Unknown step program: {0}")]
    UnknownProgram(String),

    #[error("Tool {tool_name} failed during a programmatic step: {reason}")]
    ToolFailed { tool_name: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum SpawnError {
    #[error("Agent template {0} does not exist")]
    UnknownTemplate(String),

    #[error("Agent type {child} is not in the spawnable agents list of {parent}")]
    NotSpawnable { parent: String, child: String },

    #[error("Invalid input for agent type {agent_type}: {reason}")]
    InvalidInput { agent_type: String, reason: String },

    #[error("Spawning is not available in this context")]
    Unsupported,
}

#[derive(Debug, Clone, Error)]
pub enum MessagingError {
    #[error("Agent {0} not found")]
    TargetNotFound(String),

    #[error("Agent {0} has no parent to send a message to")]
    NoParent(String),
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("Template {template_id} declares unknown tool {tool_name}")]
    UnknownTool {
        template_id: String,
        tool_name: String,
    },

    #[error("Template {template_id} lists unknown spawnable agent {child}")]
    UnknownSpawnable { template_id: String, child: String },

    #[error("Template {template_id} has an invalid schema: {reason}")]
    InvalidSchema { template_id: String, reason: String },
}
