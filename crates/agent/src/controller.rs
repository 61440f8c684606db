//! The per-agent step controller.
//!
//! A turn is a sequence of step cycles. Each cycle is either:
//!
//! ```text
//!  Stepping ── resume program ──▶ tool request ──▶ dispatch_one ──┐
//!     ▲                                                           │
//!     └───────────────────── result fed back ◀────────────────────┘
//!
//!  Streaming ── provider.stream() ──▶ parser ──▶ dispatch queue ──▶ settle
//! ```
//!
//! Stepping runs first when the agent's template declares a step program.
//! Programs live in a resumption table keyed by agent id: constructed on
//! first use, kept while paused, replaced by a run-to-completion marker when
//! the program hands control to the model, and evicted when the turn ends.
//!
//! Failures never escape a step. A program error, a program panic, a tool
//! failure inside a program step, or a broken model stream is written into
//! the agent's output, reported on the live event stream, and ends the turn.

use chrono::Utc;
use futures::StreamExt;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use stepforge_core::agent::AgentState;
use stepforge_core::error::StepError;
use stepforge_core::event::{DomainEvent, EventBus};
use stepforge_core::message::Message;
use stepforge_core::provider::{Provider, ProviderRequest};
use stepforge_core::template::AgentTemplate;
use stepforge_core::tool::{ToolContext, ToolResult, ToolServices};
use stepforge_parser::{DEFAULT_MAX_TAG_LEN, TagEvent, TagStreamParser};
use stepforge_tools::{DispatchQueue, Dispatcher, Enqueued, render_results};

use crate::program::{ProgramLibrary, StepInput, StepProgram, StepYield};
use crate::stream_event::{AgentStreamEvent, EventSink};

/// Everything that stays fixed for one agent's turn.
#[derive(Clone)]
pub struct TurnContext {
    pub template: Arc<AgentTemplate>,
    pub services: ToolServices,
    pub sink: EventSink,
}

impl TurnContext {
    pub fn new(template: Arc<AgentTemplate>) -> Self {
        Self {
            template,
            services: ToolServices::default(),
            sink: EventSink::discard(),
        }
    }

    pub fn with_services(mut self, services: ToolServices) -> Self {
        self.services = services;
        self
    }

    pub fn with_sink(mut self, sink: EventSink) -> Self {
        self.sink = sink;
        self
    }

    fn tool_context(&self, state: &AgentState) -> ToolContext {
        ToolContext {
            agent: Arc::new(state.clone()),
            template: self.template.clone(),
            services: self.services.clone(),
        }
    }
}

/// Where a step cycle left the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The turn goes on.
    Continue,
    /// The turn ended normally.
    TurnEnded,
    /// The step failed; the error is in the agent's output and the turn is over.
    Failed,
}

enum ProgramSlot {
    Active(Box<dyn StepProgram>),
    /// The program handed control to the model for the rest of the turn.
    RunToCompletion,
}

pub struct StepController {
    provider: Arc<dyn Provider>,
    dispatcher: Dispatcher,
    programs: Arc<ProgramLibrary>,
    events: Arc<EventBus>,
    max_tag_len: usize,
    /// Resumption table, keyed by agent id
    slots: HashMap<String, ProgramSlot>,
    tool_calls_made: usize,
}

impl StepController {
    pub fn new(
        provider: Arc<dyn Provider>,
        dispatcher: Dispatcher,
        programs: Arc<ProgramLibrary>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            programs,
            events,
            max_tag_len: DEFAULT_MAX_TAG_LEN,
            slots: HashMap::new(),
            tool_calls_made: 0,
        }
    }

    pub fn with_max_tag_len(mut self, max_tag_len: usize) -> Self {
        self.max_tag_len = max_tag_len;
        self
    }

    /// Total tool results produced through this controller.
    pub fn tool_calls_made(&self) -> usize {
        self.tool_calls_made
    }

    /// Whether a program (or run-to-completion marker) is cached for the agent.
    pub fn has_program(&self, agent_id: &str) -> bool {
        self.slots.contains_key(agent_id)
    }

    /// Drop the agent's cached program. Called when its turn ends.
    pub fn end_turn(&mut self, agent_id: &str) {
        if self.slots.remove(agent_id).is_some() {
            trace!(agent_id = %agent_id, "Evicted step program");
        }
    }

    // ── Stepping ──────────────────────────────────────────────────────────

    /// Resume the agent's step program until it pauses, hands control to the
    /// model, finishes, or fails.
    ///
    /// Model-driven agents and agents past run-to-completion return
    /// [`StepOutcome::Continue`] without doing anything.
    pub async fn run_programmatic_step(&mut self, state: &mut AgentState, turn: &TurnContext) -> StepOutcome {
        let agent_id = state.agent_id.clone();
        let mut program = match self.slots.remove(&agent_id) {
            Some(ProgramSlot::RunToCompletion) => {
                self.slots.insert(agent_id, ProgramSlot::RunToCompletion);
                return StepOutcome::Continue;
            }
            Some(ProgramSlot::Active(program)) => program,
            None => match self.programs.construct(&turn.template) {
                Ok(Some(program)) => {
                    debug!(agent_id = %agent_id, template = %turn.template.id, "Constructed step program");
                    program
                }
                Ok(None) => return StepOutcome::Continue,
                Err(e) => return self.fail(state, turn, e),
            },
        };

        let mut last_result: Option<ToolResult> = None;
        loop {
            let resumed = catch_unwind(AssertUnwindSafe(|| {
                program.resume(StepInput {
                    tool_result: last_result.as_ref(),
                    state: &*state,
                })
            }));
            let yielded = match resumed {
                Ok(Ok(yielded)) => yielded,
                Ok(Err(e)) => return self.fail(state, turn, e),
                Err(payload) => {
                    let e = StepError::Panicked {
                        agent_id: agent_id.clone(),
                        reason: panic_message(payload.as_ref()),
                    };
                    return self.fail(state, turn, e);
                }
            };

            match yielded {
                StepYield::Tool { name, input } => {
                    let ctx = turn.tool_context(state);
                    let dispatched = self.dispatcher.dispatch_one(&name, input.clone(), state, ctx).await;
                    self.tool_calls_made += 1;
                    turn.sink.emit(AgentStreamEvent::ToolCall {
                        agent_id: agent_id.clone(),
                        id: dispatched.result.call_id.clone(),
                        name: name.clone(),
                        input,
                    });
                    emit_result(&turn.sink, &agent_id, &dispatched.result);
                    state
                        .messages
                        .push(Message::tool_results(render_results(std::slice::from_ref(&dispatched.result))));

                    if let Some(failure) = dispatched.failure {
                        let e = StepError::ToolFailed {
                            tool_name: name,
                            reason: failure.to_string(),
                        };
                        return self.fail(state, turn, e);
                    }
                    if dispatched.ended_turn {
                        debug!(agent_id = %agent_id, "Step program ended the turn");
                        return StepOutcome::TurnEnded;
                    }
                    last_result = Some(dispatched.result);
                }
                StepYield::Pause => {
                    trace!(agent_id = %agent_id, "Step program paused");
                    self.slots.insert(agent_id, ProgramSlot::Active(program));
                    return StepOutcome::Continue;
                }
                StepYield::RunToCompletion => {
                    debug!(agent_id = %agent_id, "Step program handed control to the model");
                    self.slots.insert(agent_id, ProgramSlot::RunToCompletion);
                    return StepOutcome::Continue;
                }
                StepYield::Done => {
                    debug!(agent_id = %agent_id, "Step program finished");
                    return StepOutcome::TurnEnded;
                }
            }
        }
    }

    // ── Streaming ─────────────────────────────────────────────────────────

    /// Run one model step: stream the completion through the parser, launch
    /// tools as their markup closes, then apply results in emission order.
    ///
    /// The turn ends when a terminal tool was dispatched or the model wrote
    /// no tool calls at all.
    pub async fn run_model_step(&mut self, state: &mut AgentState, turn: &TurnContext) -> StepOutcome {
        let registry = self.dispatcher.registry().clone();
        let request = ProviderRequest {
            model: turn.template.model.clone(),
            agent_id: state.agent_id.clone(),
            system_prompt: turn.template.system_prompt.clone(),
            messages: state.messages.clone(),
            tools: registry.definitions_for(&turn.template),
        };

        let mut stream = match self.provider.stream(request).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(state, turn, e),
        };

        let agent_id = state.agent_id.clone();
        let mut parser = TagStreamParser::with_max_tag_len(registry.tag_schema(), self.max_tag_len);
        let mut queue = self.dispatcher.queue(turn.tool_context(state));
        let mut text = String::new();
        let mut notes = Vec::new();
        let mut interrupted = None;

        while let Some(fragment) = stream.next().await {
            match fragment {
                Ok(fragment) => {
                    turn.sink.emit(AgentStreamEvent::Chunk {
                        agent_id: agent_id.clone(),
                        content: fragment.clone(),
                    });
                    route(parser.feed(&fragment), &mut queue, &mut notes, &agent_id, &turn.sink);
                    text.push_str(&fragment);
                }
                Err(e) => {
                    interrupted = Some(e);
                    break;
                }
            }
        }
        route(parser.finish(), &mut queue, &mut notes, &agent_id, &turn.sink);

        if !text.is_empty() {
            state.messages.push(Message::assistant(text));
        }
        let settlement = queue.settle(state).await;
        self.tool_calls_made += settlement.results.len();
        for result in &settlement.results {
            emit_result(&turn.sink, &agent_id, result);
        }
        if !settlement.results.is_empty() {
            state.messages.push(Message::tool_results(render_results(&settlement.results)));
        }
        if settlement.discarded > 0 {
            debug!(agent_id = %agent_id, discarded = settlement.discarded, "Ignored tool calls after end of turn");
        }

        if let Some(e) = interrupted {
            return self.fail(state, turn, e);
        }
        if settlement.ended_turn || settlement.results.is_empty() {
            StepOutcome::TurnEnded
        } else {
            StepOutcome::Continue
        }
    }

    fn fail(&mut self, state: &mut AgentState, turn: &TurnContext, error: impl std::fmt::Display) -> StepOutcome {
        let message = error.to_string();
        warn!(agent_id = %state.agent_id, error = %message, "Step failed, ending turn");
        self.end_turn(&state.agent_id);
        state.record_error(&message);
        turn.sink.emit(AgentStreamEvent::Error {
            agent_id: state.agent_id.clone(),
            message: message.clone(),
        });
        self.events.publish(DomainEvent::StepFailed {
            agent_id: state.agent_id.clone(),
            error_message: message,
            timestamp: Utc::now(),
        });
        StepOutcome::Failed
    }
}

/// Feed parser events to the queue. Attribute diagnostics from a tool's
/// opening tag wait in `notes` until that tool's end event.
fn route(events: Vec<TagEvent>, queue: &mut DispatchQueue, notes: &mut Vec<String>, agent_id: &str, sink: &EventSink) {
    for event in events {
        match event {
            TagEvent::ToolStart { name, errors, .. } => {
                for error in &errors {
                    warn!(agent_id = %agent_id, tool = %name, %error, "Malformed tool attribute");
                }
                *notes = errors.iter().map(ToString::to_string).collect();
            }
            TagEvent::ToolEnd { name, params } => {
                if let Enqueued::Launched(call) = queue.push_annotated(&name, params, std::mem::take(notes)) {
                    sink.emit(AgentStreamEvent::ToolCall {
                        agent_id: agent_id.to_string(),
                        id: call.id,
                        name: call.name,
                        input: call.arguments,
                    });
                }
            }
            TagEvent::TagStart { name, .. } | TagEvent::TagEnd { name } => {
                trace!(agent_id = %agent_id, tag = %name, "Ignoring foreign tag");
            }
        }
    }
}

fn emit_result(sink: &EventSink, agent_id: &str, result: &ToolResult) {
    sink.emit(AgentStreamEvent::ToolResult {
        agent_id: agent_id.to_string(),
        id: result.call_id.clone(),
        name: result.tool_name.clone(),
        output: result.output.clone(),
        success: result.success,
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
