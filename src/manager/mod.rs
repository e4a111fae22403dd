//! Run Manager module
//!
//! Owns the registry of runs and their lifecycle - creation, execution,
//! suspension, resumption and abort.

mod run_manager;

pub use run_manager::{RunManager, RunManagerConfig, RunSnapshot};
