//! Built-in agent templates, the lowest-precedence registry layer.

use serde_json::json;
use stepforge_core::template::{
    AgentTemplate, Implementation, InputSchema, OutputMode, ScriptStep, TemplateLayer, TemplateSource,
};

const BASE_PROMPT: &str = "You are a coding agent. Call a tool by writing its tag with one child \
tag per parameter, for example <read_files><paths>[\"src/main.rs\"]</paths></read_files>. \
Parameter bodies are taken literally. Write <end_turn/> when you are finished.";

const PICKER_PROMPT: &str = "You were given the contents of candidate files. Reply with the paths \
that matter for the task and one sentence on why, then end your turn.";

const REVIEWER_PROMPT: &str = "Review the conversation so far. Record your verdict with set_output, \
then end your turn.";

/// Every built-in template, with `model` filled in.
pub fn builtin_templates(model: &str) -> Vec<AgentTemplate> {
    let base = AgentTemplate {
        display_name: "Base".into(),
        system_prompt: BASE_PROMPT.into(),
        ..AgentTemplate::model_driven("base", model)
    }
    .with_tools([
        "read_files",
        "write_file",
        "run_terminal_command",
        "think_deeply",
        "spawn_agents",
        "send_agent_message",
        "add_message",
        "set_output",
        "end_turn",
    ])
    .with_spawnable(["file_picker", "reviewer"]);

    let file_picker = AgentTemplate {
        display_name: "File Picker".into(),
        system_prompt: PICKER_PROMPT.into(),
        input_schema: InputSchema {
            prompt: Some(json!({"type": "string"})),
            params: Some(json!({
                "type": "object",
                "properties": {
                    "paths": {"type": "array", "items": {"type": "string"}, "minItems": 1}
                },
                "required": ["paths"]
            })),
        },
        ..AgentTemplate::model_driven("file_picker", model)
    }
    .with_tools(["read_files", "send_agent_message", "end_turn"])
    .with_implementation(Implementation::Steps {
        steps: vec![
            ScriptStep::Tool {
                tool: "read_files".into(),
                input: json!({"paths": "$params.paths"}),
            },
            ScriptStep::RunToCompletion,
        ],
    });

    let reviewer = AgentTemplate {
        display_name: "Reviewer".into(),
        system_prompt: REVIEWER_PROMPT.into(),
        include_message_history: true,
        output_mode: OutputMode::StructuredOutput,
        output_schema: Some(json!({
            "type": "object",
            "properties": {
                "verdict": {"enum": ["approve", "request_changes"]},
                "comments": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["verdict"]
        })),
        ..AgentTemplate::model_driven("reviewer", model)
    }
    .with_tools(["read_files", "think_deeply", "set_output", "end_turn"]);

    vec![base, file_picker, reviewer]
}

pub fn builtin_layer(model: &str) -> TemplateLayer {
    TemplateLayer::new(TemplateSource::Builtin, builtin_templates(model))
}
