//! Deterministic step programs.
//!
//! A step program is a resumable procedure that yields tool requests
//! instead of being driven by model text. Programs are explicit state
//! objects: each [`StepProgram::resume`] call picks up where the previous
//! one stopped, receiving the result of the tool it last requested.
//!
//! Two kinds are provided:
//! - [`ScriptedProgram`] interprets the inline `steps` list of a template
//! - [`FnProgram`] wraps a closure that keeps its own state
//!
//! Named programs are looked up in a [`ProgramLibrary`].

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use stepforge_core::agent::AgentState;
use stepforge_core::error::StepError;
use stepforge_core::template::{AgentTemplate, Implementation, ScriptStep};
use stepforge_core::tool::ToolResult;

/// What a program sees when it is resumed.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    /// Result of the tool requested by the previous yield, if any
    pub tool_result: Option<&'a ToolResult>,
    /// Current agent state
    pub state: &'a AgentState,
}

/// What a program hands back to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum StepYield {
    /// Dispatch this tool and resume with its result.
    Tool { name: String, input: Value },
    /// Give the model a step; resume on the next step call.
    Pause,
    /// Stop stepping; the model drives the rest of the turn.
    RunToCompletion,
    /// The program finished; the turn ends.
    Done,
}

impl StepYield {
    pub fn tool(name: impl Into<String>, input: Value) -> Self {
        Self::Tool {
            name: name.into(),
            input,
        }
    }
}

pub trait StepProgram: Send {
    fn resume(&mut self, input: StepInput<'_>) -> Result<StepYield, StepError>;
}

// ── Scripted programs ─────────────────────────────────────────────────────

/// Interpreter over a template's declared steps.
///
/// String values in a tool step's input are substituted when the step runs:
/// - `$prompt` → the agent's prompt
/// - `$params` → the whole params object
/// - `$params.<key>` → one param
/// - `$last_result` → output of the previous tool
///
/// A placeholder with nothing to substitute becomes `null`.
pub struct ScriptedProgram {
    steps: Vec<ScriptStep>,
    cursor: usize,
}

impl ScriptedProgram {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self { steps, cursor: 0 }
    }
}

impl StepProgram for ScriptedProgram {
    fn resume(&mut self, input: StepInput<'_>) -> Result<StepYield, StepError> {
        let Some(step) = self.steps.get(self.cursor) else {
            return Ok(StepYield::Done);
        };
        self.cursor += 1;
        Ok(match step {
            ScriptStep::Tool { tool, input: args } => StepYield::tool(tool.clone(), substitute(args, &input)),
            ScriptStep::Pause => StepYield::Pause,
            ScriptStep::RunToCompletion => StepYield::RunToCompletion,
        })
    }
}

fn substitute(value: &Value, input: &StepInput<'_>) -> Value {
    match value {
        Value::String(s) if s.starts_with('$') => placeholder(s, input).unwrap_or(Value::Null),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, input)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, input)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn placeholder(name: &str, input: &StepInput<'_>) -> Option<Value> {
    match name {
        "$prompt" => input.state.prompt().map(|p| Value::String(p.to_string())),
        "$params" => input.state.params().cloned(),
        "$last_result" => input.tool_result.map(|r| Value::String(r.output.clone())),
        _ => {
            let key = name.strip_prefix("$params.")?;
            input.state.params()?.get(key).cloned()
        }
    }
}

// ── Closure programs ──────────────────────────────────────────────────────

/// A program backed by a closure.
pub struct FnProgram<F>(F);

impl<F> FnProgram<F>
where
    F: FnMut(StepInput<'_>) -> Result<StepYield, StepError> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> StepProgram for FnProgram<F>
where
    F: FnMut(StepInput<'_>) -> Result<StepYield, StepError> + Send,
{
    fn resume(&mut self, input: StepInput<'_>) -> Result<StepYield, StepError> {
        (self.0)(input)
    }
}

// ── Library ───────────────────────────────────────────────────────────────

type Factory = Arc<dyn Fn(&AgentTemplate) -> Box<dyn StepProgram> + Send + Sync>;

/// Named program factories, shared by every controller.
#[derive(Clone, Default)]
pub struct ProgramLibrary {
    factories: HashMap<String, Factory>,
}

impl ProgramLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&AgentTemplate) -> Box<dyn StepProgram> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build a fresh program for `template`, or `None` for model-driven
    /// templates.
    pub fn construct(&self, template: &AgentTemplate) -> Result<Option<Box<dyn StepProgram>>, StepError> {
        match &template.implementation {
            Implementation::Model => Ok(None),
            Implementation::Steps { steps } => Ok(Some(Box::new(ScriptedProgram::new(steps.clone())))),
            Implementation::Program { name } => {
                let factory = self
                    .factories
                    .get(name)
                    .ok_or_else(|| StepError::UnknownProgram(name.clone()))?;
                Ok(Some(factory(template)))
            }
        }
    }
}
