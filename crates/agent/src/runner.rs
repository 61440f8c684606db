//! The turn loop.
//!
//! ```text
//!  ┌─▶ drain inbox ─▶ programmatic step ─▶ budget check ─▶ model step ─┐
//!  └──────────────────────────── Continue ◀────────────────────────────┘
//! ```
//!
//! The session inbox is drained at the top of every cycle so messages from
//! other agents are visible to the next program resume or model step. Each
//! model step costs one unit of the agent's step budget; an exhausted budget
//! ends the turn normally.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use stepforge_core::agent::{AgentState, InboxMessage};
use stepforge_core::template::OutputMode;

use crate::controller::{StepController, StepOutcome, TurnContext};
use crate::stream_event::AgentStreamEvent;

/// An agent's pending inbound messages. Cheap to clone; all clones share
/// one queue.
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    queue: Arc<Mutex<VecDeque<InboxMessage>>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self, message: InboxMessage) {
        self.lock().push_back(message);
    }

    /// Take every pending message, oldest first.
    pub fn drain(&self) -> Vec<InboxMessage> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<InboxMessage>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// How a turn went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReport {
    pub agent_id: String,
    pub agent_type: String,
    pub failed: bool,
    /// The final report shaped by the template's output mode, or the error
    /// payload for a failed turn
    pub report: Value,
    pub steps_used: u32,
    pub tool_calls_made: usize,
}

impl TurnReport {
    /// Report for an agent whose task died before producing a result.
    pub fn aborted(agent_id: &str, agent_type: &str, error: impl std::fmt::Display) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            agent_type: agent_type.to_string(),
            failed: true,
            report: serde_json::json!({ "error": error.to_string() }),
            steps_used: 0,
            tool_calls_made: 0,
        }
    }
}

/// Drives one agent's turn through its [`StepController`].
pub struct AgentRunner {
    controller: StepController,
}

impl AgentRunner {
    pub fn new(controller: StepController) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &StepController {
        &self.controller
    }

    /// Run step cycles until the turn ends, fails, or runs out of budget.
    pub async fn run_turn(&mut self, state: &mut AgentState, turn: &TurnContext, inbox: &Mailbox) -> TurnReport {
        let budget = state.steps_remaining;
        let calls_before = self.controller.tool_calls_made();

        let failed = loop {
            for message in inbox.drain() {
                debug!(agent_id = %state.agent_id, from = %message.from_agent_id, "Delivering inbox message");
                state.messages.push(message.into_message());
            }

            match self.controller.run_programmatic_step(state, turn).await {
                StepOutcome::Continue => {}
                StepOutcome::TurnEnded => break false,
                StepOutcome::Failed => break true,
            }

            if state.steps_remaining == 0 {
                warn!(agent_id = %state.agent_id, budget, "Step budget exhausted, ending turn");
                break false;
            }
            state.steps_remaining -= 1;

            match self.controller.run_model_step(state, turn).await {
                StepOutcome::Continue => {}
                StepOutcome::TurnEnded => break false,
                StepOutcome::Failed => break true,
            }
        };
        self.controller.end_turn(&state.agent_id);

        let steps_used = budget - state.steps_remaining;
        let tool_calls_made = self.controller.tool_calls_made() - calls_before;
        let report = if failed {
            state.output.clone().unwrap_or(Value::Null)
        } else {
            final_report(state, turn.template.output_mode)
        };

        info!(
            agent_id = %state.agent_id,
            agent_type = %state.agent_type,
            failed,
            steps_used,
            tool_calls_made,
            "Turn finished"
        );
        turn.sink.emit(AgentStreamEvent::Done {
            agent_id: state.agent_id.clone(),
            steps_used,
            tool_calls_made,
        });

        TurnReport {
            agent_id: state.agent_id.clone(),
            agent_type: state.agent_type.clone(),
            failed,
            report,
            steps_used,
            tool_calls_made,
        }
    }
}

/// Shape the agent's final report according to `mode`.
pub fn final_report(state: &AgentState, mode: OutputMode) -> Value {
    match mode {
        OutputMode::LastMessage => state
            .last_assistant_message()
            .map(|m| Value::String(m.to_string()))
            .unwrap_or(Value::Null),
        OutputMode::AllMessages => serde_json::to_value(&state.messages).unwrap_or(Value::Null),
        OutputMode::StructuredOutput => state.output.clone().unwrap_or(Value::Null),
    }
}
