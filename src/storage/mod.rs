//! Persistence for suspended runs and finished-run history.
//!
//! Both stores are plain files: one JSON document per checkpoint, and a single
//! JSONL file for history.

mod checkpoint;
mod history;

pub(crate) use checkpoint::is_safe_id;
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore};
pub use history::{HistoryStore, RunRecord};
