//! Run orchestration
//!
//! - [`next_step`] is the transition function of the PLAN/ACT/EVALUATE/HUMAN_CHECK machine
//! - [`Orchestrator`] drives one run through it, publishing events as it goes
//! - [`trim_window`] bounds the history sent to the reasoner
//! - [`strategy_shift`] nudges a run that keeps failing the same way

mod history;
mod orchestrator;
mod prompt;
mod reflect;
mod step;

pub use history::{status_message, trim_window};
pub use orchestrator::{
    DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_HISTORY_OUTPUT_CHARS, Halt, Orchestrator, OrchestratorConfig, RunOutcome,
};
pub use prompt::build_system_prompt;
pub use reflect::{REFLECT_AFTER_FAILURES, STUCK_SIMILARITY, is_stuck, record_outcome, similarity, strategy_shift};
pub use step::{Disposition, Step, Transition, evaluate_transition, next_step};
