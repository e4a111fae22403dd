//! Command-backed goals: the goal is met when a shell command exits 0

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{Goal, GoalResult};
use crate::domain::RunState;
use crate::error::{GoalrunError, Result};
use crate::tools::process::{GroupKill, Keep, collect, shell};
use crate::tools::truncate_tail;

pub const DEFAULT_GOAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Tail of the command output kept in the reason
const REASON_OUTPUT_CHARS: usize = 3000;

/// Tail of each output stream held while the check runs
const CAPTURE_BYTES: usize = 64 * 1024;

/// Goal that runs a shell command in the working directory
#[derive(Debug, Clone)]
pub struct CommandGoal {
    name: String,
    command: String,
    prompt: String,
    timeout: Duration,
    env: Vec<(String, String)>,
}

impl CommandGoal {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        let command = command.into();
        Self {
            name: name.into(),
            prompt: format!("The goal is met when `{}` exits successfully.", command),
            command,
            timeout: DEFAULT_GOAL_TIMEOUT,
            env: Vec::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Goal for CommandGoal {
    fn name(&self) -> &str {
        &self.name
    }

    fn prompt_fragment(&self, cwd: &Path) -> String {
        format!(
            "{}\n\nSuccess check: `{}` is run in {} after every iteration; exit code 0 means the goal is achieved.",
            self.prompt,
            self.command,
            cwd.display()
        )
    }

    async fn check(&self, _state: &RunState, cwd: &Path) -> Result<GoalResult> {
        let mut cmd = shell(&self.command, cwd);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| GoalrunError::GoalCheck(format!("failed to spawn `{}`: {}", self.command, e)))?;
        let mut group = GroupKill::new(&child);

        let (stdout, stderr, status) =
            match tokio::time::timeout(self.timeout, collect(&mut child, CAPTURE_BYTES, Keep::Tail)).await {
                Ok(result) => {
                    result.map_err(|e| GoalrunError::GoalCheck(format!("`{}` failed to run: {}", self.command, e)))?
                }
                Err(_) => {
                    group.kill();
                    let _ = child.start_kill();
                    let timeout_ms = self.timeout.as_millis() as u64;
                    log::warn!("goal check `{}` timed out after {}ms", self.command, timeout_ms);
                    return Ok(GoalResult::not_achieved(format!(
                        "`{}` timed out after {}ms",
                        self.command, timeout_ms
                    ))
                    .with_details(json!({"command": self.command, "error": "timeout", "timeout_ms": timeout_ms})));
                }
            };
        group.release();

        let mut combined = stdout.text();
        let stderr = stderr.text();
        if !stderr.trim().is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        let tail = truncate_tail(combined.trim_end(), REASON_OUTPUT_CHARS);
        let exit_code = status.code().unwrap_or(-1);

        let details = json!({
            "command": self.command,
            "exit_code": exit_code,
            "output": tail,
        });

        if status.success() {
            Ok(GoalResult::achieved(format!("`{}` exited 0", self.command)).with_details(details))
        } else {
            Ok(GoalResult::not_achieved(format!(
                "`{}` failed with exit code {}:\n{}",
                self.command, exit_code, tail
            ))
            .with_details(details))
        }
    }
}

/// Goals for common test runners
pub mod presets {
    use super::*;

    pub fn pytest() -> CommandGoal {
        CommandGoal::new("pytest", "python -m pytest --tb=short -q")
            .with_prompt("Make every pytest test in the project pass. Fix the code, not the tests.")
    }

    pub fn cargo_test() -> CommandGoal {
        CommandGoal::new("cargo-test", "cargo test --color never")
            .with_prompt("Make `cargo test` pass: the crate must compile and every test must succeed.")
    }

    pub fn npm_test() -> CommandGoal {
        CommandGoal::new("npm-test", "npm test --silent")
            .with_prompt("Make `npm test` pass. Install nothing new unless a missing dependency is the cause.")
    }

    pub fn go_test() -> CommandGoal {
        CommandGoal::new("go-test", "go test ./...")
            .with_prompt("Make `go test ./...` pass for every package in the module.")
    }

    pub fn make_test() -> CommandGoal {
        CommandGoal::new("make-test", "make test").with_prompt("Make the `make test` target succeed.")
    }

    /// Every preset, in registration order
    pub fn all() -> Vec<CommandGoal> {
        vec![pytest(), cargo_test(), npm_test(), go_test(), make_test()]
    }
}
