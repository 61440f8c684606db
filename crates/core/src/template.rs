//! Agent templates and the immutable template registry.
//!
//! Templates come from several layers, merged once at startup:
//!
//! 1. **Built-in** — templates compiled into the runtime
//! 2. **Discovered** — templates found in configured discovery directories
//! 3. **Project-local** — `.stepforge/agents/*.toml` in the working directory
//!
//! Later layers override earlier ones by template id. The merged
//! [`TemplateRegistry`] has no mutators and is shared across all agents.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::RegistryError;

/// How an agent's final report is assembled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// The last assistant message
    #[default]
    LastMessage,
    /// Every message of the agent's history
    AllMessages,
    /// The payload recorded through `set_output`
    StructuredOutput,
}

/// One instruction of a declarative step program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Request a tool. String values of the form `$prompt` or
    /// `$params.<key>` are substituted from the agent's context.
    Tool {
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    /// Let the model take one step, then resume.
    Pause,
    /// Stop waiting for external steps; the model runs the turn to its end.
    RunToCompletion,
}

/// What drives the agent's turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Implementation {
    /// Free-form: live model output is parsed and dispatched.
    #[default]
    Model,
    /// A named step program registered in the program library.
    Program { name: String },
    /// An inline list of steps run by the step interpreter.
    Steps { steps: Vec<ScriptStep> },
}

/// JSON Schemas for what a spawner must hand a new agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Schema for the prompt string (`None` = prompt is optional free text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<serde_json::Value>,

    /// Schema for the params object (`None` = params are not checked)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// An immutable declaration of one kind of agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTemplate {
    pub id: String,

    #[serde(default)]
    pub display_name: String,

    /// Model identifier passed to the provider
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub system_prompt: String,

    /// Allow-list of tool names
    #[serde(default)]
    pub tool_names: Vec<String>,

    /// Allow-list of template ids this agent may spawn
    #[serde(default)]
    pub spawnable_agents: Vec<String>,

    #[serde(default)]
    pub input_schema: InputSchema,

    /// Seed spawned instances with the parent's message history
    #[serde(default)]
    pub include_message_history: bool,

    #[serde(default)]
    pub output_mode: OutputMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,

    #[serde(default)]
    pub implementation: Implementation,
}

impl AgentTemplate {
    /// A bare model-driven template with no tools.
    pub fn model_driven(id: impl Into<String>, model: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            model: model.into(),
            system_prompt: String::new(),
            tool_names: Vec::new(),
            spawnable_agents: Vec::new(),
            input_schema: InputSchema::default(),
            include_message_history: false,
            output_mode: OutputMode::default(),
            output_schema: None,
            implementation: Implementation::Model,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_spawnable<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spawnable_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_implementation(mut self, implementation: Implementation) -> Self {
        self.implementation = implementation;
        self
    }

    pub fn allows_tool(&self, name: &str) -> bool {
        self.tool_names.iter().any(|t| t == name)
    }

    pub fn can_spawn(&self, template_id: &str) -> bool {
        self.spawnable_agents.iter().any(|a| a == template_id)
    }

    /// Whether turns start in the stepping state.
    pub fn has_step_program(&self) -> bool {
        !matches!(self.implementation, Implementation::Model)
    }
}

/// Where a template layer came from. Ordered by precedence (lowest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateSource {
    Builtin,
    Discovered,
    ProjectLocal,
}

impl std::fmt::Display for TemplateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TemplateSource::Builtin => "builtin",
            TemplateSource::Discovered => "discovered",
            TemplateSource::ProjectLocal => "project",
        };
        f.write_str(name)
    }
}

/// One override source.
#[derive(Debug, Clone)]
pub struct TemplateLayer {
    pub source: TemplateSource,
    pub templates: Vec<AgentTemplate>,
}

impl TemplateLayer {
    pub fn new(source: TemplateSource, templates: Vec<AgentTemplate>) -> Self {
        Self { source, templates }
    }
}

/// The effective template map. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<AgentTemplate>>,
    sources: HashMap<String, TemplateSource>,
}

impl TemplateRegistry {
    /// Merge layers into one snapshot. Layers are applied in precedence
    /// order regardless of the order given; within a layer, later templates
    /// with the same id win.
    pub fn merge(layers: impl IntoIterator<Item = TemplateLayer>) -> Self {
        let mut layers: Vec<TemplateLayer> = layers.into_iter().collect();
        layers.sort_by_key(|layer| layer.source);

        let mut templates = HashMap::new();
        let mut sources = HashMap::new();
        for layer in layers {
            for template in layer.templates {
                if let Some(previous) = sources.insert(template.id.clone(), layer.source) {
                    debug!(
                        template = %template.id,
                        from = %previous,
                        to = %layer.source,
                        "Template overridden"
                    );
                }
                templates.insert(template.id.clone(), Arc::new(template));
            }
        }
        Self { templates, sources }
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentTemplate>> {
        self.templates.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Which layer supplied the effective template.
    pub fn source(&self, id: &str) -> Option<TemplateSource> {
        self.sources.get(id).copied()
    }

    /// All template ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Check cross references once, before any agent is spawned.
    pub fn validate(&self, tool_exists: impl Fn(&str) -> bool) -> Result<(), RegistryError> {
        for id in self.ids() {
            let template = &self.templates[id];
            if let Some(tool_name) = template.tool_names.iter().find(|t| !tool_exists(t.as_str())) {
                return Err(RegistryError::UnknownTool {
                    template_id: id.to_string(),
                    tool_name: tool_name.clone(),
                });
            }
            if let Some(child) = template
                .spawnable_agents
                .iter()
                .find(|c| !self.contains(c.as_str()))
            {
                return Err(RegistryError::UnknownSpawnable {
                    template_id: id.to_string(),
                    child: child.clone(),
                });
            }
            if let Implementation::Steps { steps } = &template.implementation {
                let undeclared = steps.iter().find_map(|step| match step {
                    ScriptStep::Tool { tool, .. } if !template.allows_tool(tool) => Some(tool),
                    _ => None,
                });
                if let Some(tool_name) = undeclared {
                    return Err(RegistryError::UnknownTool {
                        template_id: id.to_string(),
                        tool_name: tool_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(id: &str, model: &str) -> AgentTemplate {
        AgentTemplate::model_driven(id, model)
    }

    #[test]
    fn later_layers_override_earlier() {
        let registry = TemplateRegistry::merge(vec![
            TemplateLayer::new(TemplateSource::ProjectLocal, vec![named("base", "project-model")]),
            TemplateLayer::new(TemplateSource::Builtin, vec![named("base", "builtin-model"), named("reviewer", "m")]),
            TemplateLayer::new(TemplateSource::Discovered, vec![named("base", "discovered-model")]),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("base").unwrap().model, "project-model");
        assert_eq!(registry.source("base"), Some(TemplateSource::ProjectLocal));
        assert_eq!(registry.source("reviewer"), Some(TemplateSource::Builtin));
        assert_eq!(registry.ids(), vec!["base", "reviewer"]);
    }

    #[test]
    fn validate_rejects_unknown_tool() {
        let registry = TemplateRegistry::merge(vec![TemplateLayer::new(
            TemplateSource::Builtin,
            vec![named("base", "m").with_tools(["end_turn", "teleport"])],
        )]);
        let err = registry.validate(|t| t == "end_turn").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownTool { ref tool_name, .. } if tool_name == "teleport"));
    }

    #[test]
    fn validate_rejects_unknown_spawnable() {
        let registry = TemplateRegistry::merge(vec![TemplateLayer::new(
            TemplateSource::Builtin,
            vec![named("base", "m").with_spawnable(["ghost"])],
        )]);
        assert!(matches!(
            registry.validate(|_| true),
            Err(RegistryError::UnknownSpawnable { .. })
        ));
    }

    #[test]
    fn validate_rejects_script_step_outside_allow_list() {
        let template = named("picker", "m")
            .with_tools(["end_turn"])
            .with_implementation(Implementation::Steps {
                steps: vec![ScriptStep::Tool {
                    tool: "read_files".into(),
                    input: serde_json::json!({}),
                }],
            });
        let registry = TemplateRegistry::merge(vec![TemplateLayer::new(TemplateSource::Builtin, vec![template])]);
        assert!(registry.validate(|_| true).is_err());
    }

    #[test]
    fn implementation_deserializes_from_json() {
        let template: AgentTemplate = serde_json::from_value(serde_json::json!({
            "id": "picker",
            "implementation": {
                "kind": "steps",
                "steps": [
                    {"step": "tool", "tool": "read_files", "input": {"paths": "$params.paths"}},
                    {"step": "pause"},
                    {"step": "run_to_completion"}
                ]
            }
        }))
        .unwrap();
        assert!(template.has_step_program());
        let Implementation::Steps { steps } = &template.implementation else {
            panic!("expected inline steps");
        };
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1], ScriptStep::Pause);
        assert_eq!(template.output_mode, OutputMode::LastMessage);
    }
}
