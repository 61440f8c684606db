//! The agent runtime — step control and multi-agent coordination.
//!
//! An agent's turn is a loop of step cycles:
//!
//! 1. **Drain** messages other agents sent to this one
//! 2. **Step** the template's program, if it has one, dispatching each tool
//!    it requests and feeding the result back
//! 3. **Stream** a model completion through the tag parser, launching tools
//!    as their markup closes
//! 4. **Settle** tool results in emission order and loop back to step 1
//!
//! The turn ends when a terminal tool runs, the model writes no tool calls,
//! the program finishes, the step budget runs out, or a step fails.
//!
//! Agents run on their own tasks under a [`Coordinator`], which validates
//! spawn requests, tracks lifecycle status, and relays messages.

pub mod controller;
pub mod coordinator;
pub mod program;
pub mod runner;
pub mod stream_event;
pub mod templates;

#[cfg(test)]
mod test_helpers;

pub use controller::{StepController, StepOutcome, TurnContext};
pub use coordinator::{AgentInfo, AgentStatus, Coordinator, CoordinatorBuilder};
pub use program::{FnProgram, ProgramLibrary, ScriptedProgram, StepInput, StepProgram, StepYield};
pub use runner::{AgentRunner, Mailbox, TurnReport, final_report};
pub use stream_event::{AgentStreamEvent, EventSink};
pub use templates::{builtin_layer, builtin_templates};
