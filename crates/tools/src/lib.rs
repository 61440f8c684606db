//! Tool validation, dispatch, and the built-in tools.
//!
//! Tools give an agent the ability to act: end its turn, record output,
//! spawn and message other agents, and (through the connected client) read
//! files, write files, and run commands on the user's machine.

pub mod add_message;
pub mod client;
pub mod dispatch;
pub mod end_turn;
pub mod registry;
pub mod render;
pub mod schema;
pub mod send_agent_message;
pub mod set_output;
pub mod spawn_agents;
pub mod think_deeply;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

pub use dispatch::{DispatchQueue, Dispatched, Dispatcher, Enqueued, Settlement};
pub use registry::ToolRegistry;
pub use render::render_results;

/// Create a registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(end_turn::EndTurnTool));
    registry.register(Arc::new(set_output::SetOutputTool));
    registry.register(Arc::new(add_message::AddMessageTool));
    registry.register(Arc::new(think_deeply::ThinkDeeplyTool));
    registry.register(Arc::new(spawn_agents::SpawnAgentsTool));
    registry.register(Arc::new(send_agent_message::SendAgentMessageTool));
    registry.register(Arc::new(client::ClientTool::read_files()));
    registry.register(Arc::new(client::ClientTool::write_file()));
    registry.register(Arc::new(client::ClientTool::run_terminal_command()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_every_builtin() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec![
                "add_message",
                "end_turn",
                "read_files",
                "run_terminal_command",
                "send_agent_message",
                "set_output",
                "spawn_agents",
                "think_deeply",
                "write_file",
            ]
        );
    }

    #[test]
    fn builtin_schemas_validate_their_own_examples() {
        let registry = default_registry();
        assert!(registry.validate("end_turn", &serde_json::json!({})).is_ok());
        assert!(registry
            .validate("spawn_agents", &serde_json::json!({"agents": [{"agent_type": "x"}]}))
            .is_ok());
        assert!(registry.validate("spawn_agents", &serde_json::json!({"agents": []})).is_err());
    }
}
