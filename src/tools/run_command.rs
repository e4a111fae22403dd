//! run_command tool - Execute shell commands in the working directory

use async_trait::async_trait;
use serde_json::Value;

use super::process::{Captured, GroupKill, Keep, collect, shell};
use super::{Tool, ToolContext, ToolError, ToolOutput};

pub struct RunCommandTool;

/// Stream text, noting anything past the capture limit
fn describe(captured: &Captured) -> String {
    let text = captured.text();
    if captured.discarded == 0 {
        text
    } else {
        format!("{}\n[... {} bytes discarded]", text, captured.discarded)
    }
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the working directory. Use for git, build tools, tests."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 60000)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> eyre::Result<ToolOutput> {
        let command = input["command"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("command is required"))?;

        ctx.safety().check_command(command)?;

        let root = ctx.canonical_root()?;
        let timeout = ctx.timeout();

        let mut child = shell(command, &root).spawn().map_err(|e| ToolError::Io {
            operation: "spawn sh".to_string(),
            source: e,
        })?;
        let mut group = GroupKill::new(&child);

        let outcome = tokio::time::timeout(timeout, collect(&mut child, ctx.max_output(), Keep::Head)).await;
        let (stdout, stderr, status) = match outcome {
            Ok(collected) => collected.map_err(|e| ToolError::Io {
                operation: format!("run '{}'", command),
                source: e,
            })?,
            Err(_) => {
                group.kill();
                let _ = child.start_kill();
                log::warn!("run {} command timed out after {:?}: {}", ctx.run_id(), timeout, command);
                return Err(ToolError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
        };
        group.release();

        let stdout = describe(&stdout);
        let stderr = describe(&stderr);

        let combined = if stdout.is_empty() && !stderr.is_empty() {
            stderr
        } else if stderr.is_empty() {
            stdout
        } else {
            format!("{}\n\nSTDERR:\n{}", stdout, stderr)
        };

        if status.success() {
            Ok(ToolOutput::success(combined))
        } else {
            Ok(ToolOutput::error(format!(
                "Exit code: {}\n{}",
                status.code().unwrap_or(-1),
                combined
            )))
        }
    }
}
