//! Tool call validation and ordered-effect dispatch.
//!
//! Every call goes through the same admission pipeline:
//!
//! 1. **Schema** — arguments are checked against the tool's parameter schema
//! 2. **Allow-list** — the tool must be declared by the agent's template
//! 3. **Launch** — the handler starts on its own task immediately
//!
//! A call rejected at step 1 or 2 short-circuits to an error result and its
//! handler never runs. Launched handlers overlap freely, but their effects
//! are applied strictly in emission order by [`DispatchQueue::settle`].

use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use stepforge_core::agent::AgentState;
use stepforge_core::error::ToolError;
use stepforge_core::event::{DomainEvent, EventBus};
use stepforge_core::tool::{AgentEffect, Tool, ToolCall, ToolContext, ToolOutput, ToolResult};

use crate::registry::ToolRegistry;

type HandlerResult = Result<ToolOutput, ToolError>;

/// Validates calls and launches handlers. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    events: Option<Arc<EventBus>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry, events: None }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Start collecting the calls of one model step.
    pub fn queue(&self, ctx: ToolContext) -> DispatchQueue {
        DispatchQueue {
            dispatcher: self.clone(),
            ctx,
            slots: VecDeque::new(),
            turn_ended: false,
            discarded: 0,
        }
    }

    /// Dispatch a single already-typed call to completion and apply its
    /// effects. Used by step programs, which wait for each result.
    pub async fn dispatch_one(
        &self,
        name: &str,
        arguments: Value,
        state: &mut AgentState,
        ctx: ToolContext,
    ) -> Dispatched {
        let (tool, call) = match self.admit(name, arguments, &ctx) {
            Ok(admitted) => admitted,
            Err(result) => {
                return Dispatched {
                    result,
                    failure: None,
                    ended_turn: false,
                };
            }
        };

        let started = Instant::now();
        let joined = launch(tool, call.clone(), ctx).await;
        let settled = self.settle_one(&state.agent_id, &call, started, joined);
        let mut ended_turn = false;
        for effect in settled.effects {
            ended_turn |= state.apply(effect);
        }
        Dispatched {
            result: settled.result,
            failure: settled.failure,
            ended_turn,
        }
    }

    fn admit(&self, name: &str, arguments: Value, ctx: &ToolContext) -> Result<(Arc<dyn Tool>, ToolCall), ToolResult> {
        let call = ToolCall::new(name, arguments);
        let Some(tool) = self.registry.get(name) else {
            return Err(rejected(&call, ToolError::NotFound(name.to_string())));
        };
        if let Err(e) = self.registry.validate(name, &call.arguments) {
            return Err(rejected(&call, e));
        }
        if !ctx.template.allows_tool(name) {
            return Err(rejected(
                &call,
                ToolError::Unavailable {
                    tool_name: name.to_string(),
                    template_id: ctx.template.id.clone(),
                },
            ));
        }
        debug!(agent_id = %ctx.agent.agent_id, tool = %name, call_id = %call.id, "Launching tool");
        Ok((tool, call))
    }

    fn settle_one(
        &self,
        agent_id: &str,
        call: &ToolCall,
        started: Instant,
        joined: Result<HandlerResult, JoinError>,
    ) -> Settled {
        let settled = match joined {
            Ok(Ok(output)) => Settled {
                result: ToolResult::ok(call, output.output),
                effects: output.effects,
                failure: None,
            },
            // A handler rejecting its own arguments is a validation error,
            // not a failure of the step.
            Ok(Err(e)) => {
                warn!(agent_id = %agent_id, tool = %call.name, error = %e, "Tool handler failed");
                Settled {
                    result: ToolResult::error(&call.name, &call.id, &e),
                    effects: Vec::new(),
                    failure: e.is_execution_failure().then_some(e),
                }
            }
            Err(join_error) => {
                let e = ToolError::ExecutionFailed {
                    tool_name: call.name.clone(),
                    reason: join_error.to_string(),
                };
                warn!(agent_id = %agent_id, tool = %call.name, error = %e, "Tool handler aborted");
                Settled {
                    result: ToolResult::error(&call.name, &call.id, &e),
                    effects: Vec::new(),
                    failure: Some(e),
                }
            }
        };

        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                agent_id: agent_id.to_string(),
                tool_name: call.name.clone(),
                success: settled.result.success,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
        }
        settled
    }
}

/// The outcome of [`Dispatcher::dispatch_one`].
#[derive(Debug)]
pub struct Dispatched {
    pub result: ToolResult,
    /// Set when a handler ran and failed, as opposed to a call rejected
    /// before any handler was invoked.
    pub failure: Option<ToolError>,
    pub ended_turn: bool,
}

struct Settled {
    result: ToolResult,
    effects: Vec<AgentEffect>,
    failure: Option<ToolError>,
}

/// What happened to a call handed to [`DispatchQueue::push`].
#[derive(Debug)]
pub enum Enqueued {
    Launched(ToolCall),
    Rejected(ToolResult),
    /// Arrived after the turn had already ended.
    Discarded,
}

enum Slot {
    Rejected(ToolResult),
    Running {
        call: ToolCall,
        started: Instant,
        handle: JoinHandle<HandlerResult>,
        notes: Vec<String>,
    },
}

/// The calls of one model step, in the order their markup closed.
pub struct DispatchQueue {
    dispatcher: Dispatcher,
    ctx: ToolContext,
    slots: VecDeque<Slot>,
    turn_ended: bool,
    discarded: usize,
}

impl DispatchQueue {
    /// Admit a call parsed from markup and start its handler.
    pub fn push(&mut self, name: &str, params: HashMap<String, String>) -> Enqueued {
        self.push_annotated(name, params, Vec::new())
    }

    /// Like [`push`](Self::push), with markup diagnostics from the call's
    /// opening tag. They are appended to the call's result text so the
    /// model sees them.
    pub fn push_annotated(&mut self, name: &str, params: HashMap<String, String>, notes: Vec<String>) -> Enqueued {
        if self.turn_ended {
            debug!(agent_id = %self.ctx.agent.agent_id, tool = %name, "Discarding tool call after end of turn");
            self.discarded += 1;
            return Enqueued::Discarded;
        }

        let arguments = match self.dispatcher.registry.coerce(name, params) {
            Ok(arguments) => arguments,
            Err(e) => {
                let result = with_notes(rejected(&ToolCall::new(name, Value::Null), e), &notes);
                self.slots.push_back(Slot::Rejected(result.clone()));
                return Enqueued::Rejected(result);
            }
        };

        match self.dispatcher.admit(name, arguments, &self.ctx) {
            Ok((tool, call)) => {
                if tool.ends_turn() {
                    self.turn_ended = true;
                }
                let handle = tokio::spawn(run_handler(tool, call.clone(), self.ctx.clone()));
                self.slots.push_back(Slot::Running {
                    call: call.clone(),
                    started: Instant::now(),
                    handle,
                    notes,
                });
                Enqueued::Launched(call)
            }
            Err(result) => {
                let result = with_notes(result, &notes);
                self.slots.push_back(Slot::Rejected(result.clone()));
                Enqueued::Rejected(result)
            }
        }
    }

    /// Whether a terminal tool has been admitted.
    pub fn turn_ended(&self) -> bool {
        self.turn_ended
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Wait for every handler and apply effects in emission order. A later
    /// handler that finished first waits for its predecessors.
    pub async fn settle(mut self, state: &mut AgentState) -> Settlement {
        let mut results = Vec::with_capacity(self.slots.len());
        let mut ended_turn = self.turn_ended;
        let mut failures = Vec::new();

        while let Some(slot) = self.slots.pop_front() {
            match slot {
                Slot::Rejected(result) => results.push(result),
                Slot::Running {
                    call,
                    started,
                    handle,
                    notes,
                } => {
                    let joined = handle.await;
                    let settled = self
                        .dispatcher
                        .settle_one(&state.agent_id, &call, started, joined);
                    for effect in settled.effects {
                        ended_turn |= state.apply(effect);
                    }
                    if let Some(e) = settled.failure {
                        failures.push(e);
                    }
                    results.push(with_notes(settled.result, &notes));
                }
            }
        }

        Settlement {
            results,
            failures,
            ended_turn,
            discarded: self.discarded,
        }
    }
}

/// Everything one model step dispatched.
#[derive(Debug, Default)]
pub struct Settlement {
    /// One result per admitted or rejected call, in emission order.
    pub results: Vec<ToolResult>,
    pub failures: Vec<ToolError>,
    pub ended_turn: bool,
    /// Calls dropped because they followed a terminal tool.
    pub discarded: usize,
}

async fn run_handler(tool: Arc<dyn Tool>, call: ToolCall, ctx: ToolContext) -> HandlerResult {
    tool.execute(&call, &ctx).await
}

async fn launch(tool: Arc<dyn Tool>, call: ToolCall, ctx: ToolContext) -> Result<HandlerResult, JoinError> {
    tokio::spawn(run_handler(tool, call, ctx)).await
}

fn with_notes(mut result: ToolResult, notes: &[String]) -> ToolResult {
    if !notes.is_empty() {
        result.output.push_str("\n\nMalformed markup in this call:");
        for note in notes {
            result.output.push_str("\n- ");
            result.output.push_str(note);
        }
    }
    result
}

fn rejected(call: &ToolCall, error: ToolError) -> ToolResult {
    warn!(tool = %call.name, error = %error, "Tool call rejected");
    ToolResult::error(&call.name, &call.id, error)
}
