//! The tool registry.
//!
//! Holds every known tool together with its compiled parameter schema. The
//! agent loop uses it to:
//! 1. Build the tag schema the parser recognizes
//! 2. Advertise tool definitions to the model
//! 3. Turn raw markup parameters into schema-checked arguments

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use stepforge_core::error::ToolError;
use stepforge_core::template::AgentTemplate;
use stepforge_core::tool::{Tool, ToolDefinition};
use stepforge_parser::TagSchema;

use crate::schema;

struct Entry {
    tool: Arc<dyn Tool>,
    validator: Result<jsonschema::Validator, String>,
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    ///
    /// A schema that does not compile is logged; every call to that tool is
    /// then rejected during validation.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let validator = schema::compile(&tool.parameters_schema());
        if let Err(reason) = &validator {
            warn!(tool = %name, %reason, "Tool parameter schema does not compile");
        }
        self.tools.insert(name, Entry { tool, validator });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|e| e.tool.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions of the tools `template` may use, in allow-list order.
    pub fn definitions_for(&self, template: &AgentTemplate) -> Vec<ToolDefinition> {
        template
            .tool_names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|e| e.tool.to_definition())
            .collect()
    }

    /// Every registered tool with its parameter names.
    ///
    /// Tools outside an agent's allow-list are still recognized so that the
    /// agent gets an "unavailable" result instead of silence.
    pub fn tag_schema(&self) -> TagSchema {
        let mut tags = TagSchema::new();
        for (name, entry) in &self.tools {
            tags.insert(name.clone(), schema::param_names(&entry.tool.parameters_schema()));
        }
        tags
    }

    /// Coerce raw markup parameters for `name` into typed arguments.
    pub fn coerce(&self, name: &str, params: HashMap<String, String>) -> Result<Value, ToolError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        Ok(schema::coerce_params(&entry.tool.parameters_schema(), params))
    }

    /// Check `arguments` against the tool's parameter schema.
    pub fn validate(&self, name: &str, arguments: &Value) -> Result<(), ToolError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let invalid = |reason: String| ToolError::InvalidArguments {
            tool_name: name.to_string(),
            reason,
        };
        let validator = entry.validator.as_ref().map_err(|e| invalid(e.clone()))?;
        match schema::violations(validator, arguments) {
            Some(reason) => Err(invalid(reason)),
            None => Ok(()),
        }
    }
}
