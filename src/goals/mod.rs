//! Goal contract
//!
//! A goal decides whether a run is done and tells the reasoner what "done"
//! means. Goals read the run state and the working directory; they never
//! mutate either.

mod command;
mod registry;

pub use command::{CommandGoal, DEFAULT_GOAL_TIMEOUT, presets};
pub use registry::GoalRegistry;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::RunState;
use crate::error::Result;

/// Outcome of a single goal evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalResult {
    pub achieved: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl GoalResult {
    pub fn achieved(reason: impl Into<String>) -> Self {
        Self {
            achieved: true,
            reason: reason.into(),
            details: None,
        }
    }

    pub fn not_achieved(reason: impl Into<String>) -> Self {
        Self {
            achieved: false,
            reason: reason.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// A pluggable success condition
#[async_trait]
pub trait Goal: Send + Sync {
    /// Registry key, e.g. `cargo-test`
    fn name(&self) -> &str;

    /// Guidance appended to the system prompt
    fn prompt_fragment(&self, cwd: &Path) -> String;

    /// Evaluate the goal. `Err` means the check itself broke, which is fatal
    /// to the run; an unmet goal is `Ok` with `achieved == false`.
    async fn check(&self, state: &RunState, cwd: &Path) -> Result<GoalResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_goal_result_constructors() {
        let ok = GoalResult::achieved("done");
        assert!(ok.achieved);
        assert!(ok.details.is_none());

        let no = GoalResult::not_achieved("2 failing").with_details(json!({"failed": 2}));
        assert!(!no.achieved);
        assert_eq!(no.details, Some(json!({"failed": 2})));
    }

    #[test]
    fn test_goal_result_serialization_skips_missing_details() {
        let json = serde_json::to_value(GoalResult::achieved("ok")).unwrap();
        assert_eq!(json, json!({"achieved": true, "reason": "ok"}));
    }
}
