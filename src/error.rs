//! Error types for Goalrun
//!
//! Centralized error handling using thiserror. Tool-level failures never show up
//! here: they are folded into failed tool results and handed back to the reasoner.

use thiserror::Error;

use crate::llm::ReasonerError;

/// All error types that can surface from the Goalrun library
#[derive(Debug, Error)]
pub enum GoalrunError {
    /// Run id not present in the registry
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// A run with this id is already registered
    #[error("Run already exists: {0}")]
    RunExists(String),

    /// Lifecycle operation not valid for the run's current status
    #[error("Invalid run state transition: cannot {action} run {run_id} while {status}")]
    InvalidTransition {
        run_id: String,
        status: String,
        action: &'static str,
    },

    /// Run configuration rejected at creation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Goal name not present in the goal registry
    #[error("Unknown goal: '{name}'. Available: {available}")]
    UnknownGoal { name: String, available: String },

    /// Reasoner call failed
    #[error("Reasoner error: {0}")]
    Reasoner(#[from] ReasonerError),

    /// Goal check itself failed (not the same as "not achieved")
    #[error("Goal check failed: {0}")]
    GoalCheck(String),

    /// Tool registry or dispatch error
    #[error("Tool error: {0}")]
    Tool(String),

    /// Checkpoint persistence error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Goalrun operations
pub type Result<T> = std::result::Result<T, GoalrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_not_found_error() {
        let err = GoalrunError::RunNotFound("run-001".to_string());
        assert_eq!(err.to_string(), "Run not found: run-001");
    }

    #[test]
    fn test_invalid_transition_error() {
        let err = GoalrunError::InvalidTransition {
            run_id: "run-001".to_string(),
            status: "running".to_string(),
            action: "resume",
        };
        assert_eq!(
            err.to_string(),
            "Invalid run state transition: cannot resume run run-001 while running"
        );
    }

    #[test]
    fn test_unknown_goal_error() {
        let err = GoalrunError::UnknownGoal {
            name: "nope".to_string(),
            available: "cargo-test, pytest".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown goal: 'nope'. Available: cargo-test, pytest");
    }

    #[test]
    fn test_reasoner_error_conversion() {
        let err: GoalrunError = ReasonerError::Failed("boom".to_string()).into();
        assert!(matches!(err, GoalrunError::Reasoner(_)));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GoalrunError = io_err.into();
        assert!(matches!(err, GoalrunError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: GoalrunError = json_err.into();
        assert!(matches!(err, GoalrunError::Json(_)));
    }
}
