//! Tool dispatch
//!
//! Tools give the reasoner file system access and command execution, all scoped to
//! the run's working directory through a [`ToolContext`]. The [`ToolRegistry`] is
//! the dispatch boundary: it resolves tools by name, enforces the per-call timeout,
//! bounds output size and turns every failure into a failed [`ToolResult`].
//!
//! [`ToolResult`]: crate::domain::ToolResult

mod context;
mod edit_file;
mod glob_tool;
mod grep;
mod list_directory;
pub(crate) mod process;
mod read_file;
mod registry;
mod run_command;
mod safety;
mod write_file;

pub use context::{ToolContext, ToolError};
pub use registry::{DEFAULT_MAX_OUTPUT_CHARS, DEFAULT_TOOL_TIMEOUT, ToolRegistry};
pub use safety::SafetyGuard;

pub use edit_file::EditFileTool;
pub use glob_tool::GlobTool;
pub use grep::GrepTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use write_file::WriteFileTool;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolDefinition;

/// A capability the reasoner can invoke by name
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the reasoner's tool call name)
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool. `Err` and `ToolOutput::error` both end up as a failed
    /// result; `Err` is for failures the tool could not describe itself.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> eyre::Result<ToolOutput>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// What a tool produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Keep the first `max_chars` characters
pub fn truncate_head(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!(
            "{}\n... [output truncated, {} chars total]",
            &text[..idx],
            text.chars().count()
        ),
        None => text.to_string(),
    }
}

/// Keep the last `max_chars` characters, where test runners and compilers put
/// their summaries
pub fn truncate_tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let skip = total - max_chars;
    let start = text.char_indices().nth(skip).map(|(idx, _)| idx).unwrap_or(text.len());
    format!("[... {} chars truncated]\n{}", skip, &text[start..])
}
