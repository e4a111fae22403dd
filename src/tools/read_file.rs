//! read_file tool - Read file contents with line numbers

use async_trait::async_trait;
use eyre::eyre;
use serde_json::Value;

use super::{Tool, ToolContext, ToolError, ToolOutput};

const DEFAULT_LINE_LIMIT: usize = 2000;
const MAX_LINE_CHARS: usize = 2000;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file's contents with line numbers."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the working directory"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Max lines to read (default: 2000)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> eyre::Result<ToolOutput> {
        let path = input["path"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("path is required"))?;
        let offset = input["offset"].as_u64().unwrap_or(1).max(1) as usize;
        let limit = input["limit"].as_u64().map(|l| l as usize).unwrap_or(DEFAULT_LINE_LIMIT);

        let full_path = ctx.resolve_path(path)?;

        let content = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|e| eyre!("Failed to read file '{}': {}", path, e))?;

        let lines: Vec<_> = content
            .lines()
            .skip(offset - 1)
            .take(limit)
            .enumerate()
            .map(|(i, line)| {
                let line_num = offset + i;
                match line.char_indices().nth(MAX_LINE_CHARS) {
                    Some((idx, _)) => format!("{:>6}|{}...", line_num, &line[..idx]),
                    None => format!("{:>6}|{}", line_num, line),
                }
            })
            .collect();

        if lines.is_empty() && !content.is_empty() {
            return Ok(ToolOutput::error(format!(
                "Offset {} is past the end of '{}' ({} lines)",
                offset,
                path,
                content.lines().count()
            )));
        }

        Ok(ToolOutput::success(lines.join("\n")))
    }
}
