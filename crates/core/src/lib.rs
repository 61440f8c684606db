//! # StepForge Core
//!
//! Domain types, boundary traits, and error definitions for the StepForge
//! agent execution runtime. This crate has **no runtime dependencies on the
//! other StepForge crates**. It defines the domain model that the parser,
//! dispatcher, step controller, and coordinator implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the model completion service, the remote
//! client that executes tools, the agent spawner) is defined as a trait here.
//! Implementations live in their respective crates. This enables:
//! - Swapping a live model for a scripted one in tests
//! - Tools that spawn or message agents without depending on the coordinator
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod spawn;
pub mod template;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentState, InboxMessage};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, TextStream};
pub use spawn::{AgentMessenger, AgentSpawner, Delivery, SpawnOutcome, SpawnRequest, PARENT_ALIAS};
pub use template::{
    AgentTemplate, Implementation, InputSchema, OutputMode, ScriptStep, TemplateLayer, TemplateRegistry,
    TemplateSource,
};
pub use tool::{
    AgentEffect, ClientToolRequester, Tool, ToolCall, ToolContext, ToolDefinition, ToolOutput,
    ToolResult, ToolServices,
};
