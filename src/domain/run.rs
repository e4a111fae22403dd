//! Run configuration, lifecycle status and human decisions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Model used when a run does not name one
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Iteration budget used when a run does not set one
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Everything needed to start a run. Immutable once the run is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Name of a goal in the goal registry
    pub goal: String,
    /// Project directory every tool call is confined to
    pub cwd: PathBuf,
    pub model: String,
    pub max_iterations: u32,
    pub human_in_the_loop: bool,
    /// Filled in by the run manager when absent
    pub run_id: Option<String>,
}

impl RunConfig {
    pub fn new(goal: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            goal: goal.into(),
            cwd: cwd.into(),
            model: DEFAULT_MODEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            human_in_the_loop: false,
            run_id: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_human_in_the_loop(mut self, enabled: bool) -> Self {
        self.human_in_the_loop = enabled;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// Lifecycle status of a run as seen by the run manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Registered, not started
    Pending,
    /// Orchestrator task is driving the state machine
    Running,
    /// Halted at a human checkpoint, waiting for a decision
    Suspended,
    /// Goal met
    Achieved,
    /// Iteration budget exhausted, or a fatal reasoner/goal error
    Failed,
    /// Rejected by a human or aborted by a caller
    Aborted,
}

impl RunStatus {
    /// Terminal statuses never transition further
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Achieved | RunStatus::Failed | RunStatus::Aborted)
    }

    pub fn can_abort(&self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Suspended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Suspended => "suspended",
            RunStatus::Achieved => "achieved",
            RunStatus::Failed => "failed",
            RunStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a human checkpoint.
///
/// Only explicit approval markers approve; everything else rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanDecision {
    Approve,
    Reject,
}

const APPROVAL_MARKERS: &[&str] = &["approve", "approved", "yes", "y", "true", "1", "ok", "continue"];

impl HumanDecision {
    /// Normalize free text (`"yes"`, `"Approve"`, `"1"`, ...)
    pub fn from_text(text: &str) -> Self {
        let normalized = text.trim().to_ascii_lowercase();
        if APPROVAL_MARKERS.contains(&normalized.as_str()) {
            HumanDecision::Approve
        } else {
            HumanDecision::Reject
        }
    }

    /// Normalize a JSON value as received from an external caller
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Bool(true) => HumanDecision::Approve,
            Value::Number(n) if n.as_i64() == Some(1) => HumanDecision::Approve,
            Value::String(s) => Self::from_text(s),
            _ => HumanDecision::Reject,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, HumanDecision::Approve)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HumanDecision::Approve => "approve",
            HumanDecision::Reject => "reject",
        }
    }
}

impl From<bool> for HumanDecision {
    fn from(approved: bool) -> Self {
        if approved { HumanDecision::Approve } else { HumanDecision::Reject }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::new("cargo-test", "/tmp/project");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.max_iterations, 50);
        assert!(!config.human_in_the_loop);
        assert!(config.run_id.is_none());
    }

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new("pytest", ".")
            .with_model("claude-3-haiku-20240307")
            .with_max_iterations(3)
            .with_human_in_the_loop(true)
            .with_run_id("run-1");
        assert_eq!(config.model, "claude-3-haiku-20240307");
        assert_eq!(config.max_iterations, 3);
        assert!(config.human_in_the_loop);
        assert_eq!(config.run_id.as_deref(), Some("run-1"));
    }

    #[test]
    fn test_status_terminal() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Suspended.is_terminal());
        assert!(RunStatus::Achieved.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Aborted.is_terminal());
    }

    #[test]
    fn test_status_can_abort() {
        assert!(RunStatus::Running.can_abort());
        assert!(RunStatus::Suspended.can_abort());
        assert!(!RunStatus::Pending.can_abort());
        assert!(!RunStatus::Achieved.can_abort());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&RunStatus::Suspended).unwrap(), "\"suspended\"");
        assert_eq!(RunStatus::Aborted.to_string(), "aborted");
    }

    #[test]
    fn test_decision_from_text() {
        for approve in ["approve", "Approved", " yes ", "Y", "true", "1", "OK", "continue"] {
            assert_eq!(HumanDecision::from_text(approve), HumanDecision::Approve, "{approve}");
        }
        for reject in ["no", "reject", "", "maybe", "0", "approve please"] {
            assert_eq!(HumanDecision::from_text(reject), HumanDecision::Reject, "{reject}");
        }
    }

    #[test]
    fn test_decision_from_value() {
        assert!(HumanDecision::from_value(&json!(true)).is_approved());
        assert!(HumanDecision::from_value(&json!(1)).is_approved());
        assert!(HumanDecision::from_value(&json!("yes")).is_approved());
        assert!(!HumanDecision::from_value(&json!(false)).is_approved());
        assert!(!HumanDecision::from_value(&json!(null)).is_approved());
        assert!(!HumanDecision::from_value(&json!({"approve": true})).is_approved());
    }
}
