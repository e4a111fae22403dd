//! Goalrun - iterate-until-solved agent runs
//!
//! A run repeatedly asks a reasoner what to do, executes the requested tools,
//! checks its goal and optionally pauses for a human before continuing. Runs are
//! driven by the [`runner::Orchestrator`] state machine, observed through a
//! per-run [`events::EventBus`] and managed by [`manager::RunManager`].

pub mod domain;
pub mod error;
pub mod events;
pub mod goals;
pub mod id;
pub mod llm;
pub mod manager;
pub mod runner;
pub mod storage;
pub mod tools;

pub use error::{GoalrunError, Result};
