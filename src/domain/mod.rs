//! Domain types for Goalrun
//!
//! - RunConfig: immutable description of a run (goal, cwd, model, budget, HITL flag)
//! - RunStatus: lifecycle status tracked by the run manager
//! - HumanDecision: normalized answer to a human checkpoint
//! - RunState: the mutable record threaded through the orchestrator
//! - ConversationEntry, ToolCall, ToolResult: conversation history items

pub mod run;
pub mod state;

pub use run::{DEFAULT_MAX_ITERATIONS, DEFAULT_MODEL, HumanDecision, RunConfig, RunStatus};
pub use state::{ConversationEntry, Role, RunState, ToolCall, ToolResult};
