//! glob tool - Find files matching a glob pattern

use std::path::{Component, Path};

use async_trait::async_trait;
use serde_json::Value;

use super::context::normalize;
use super::{Tool, ToolContext, ToolError, ToolOutput};

const MAX_MATCHES: usize = 1000;

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &'static str {
        "glob"
    }

    fn description(&self) -> &'static str {
        "Find files matching a glob pattern (e.g., **/*.rs)"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match"
                },
                "path": {
                    "type": "string",
                    "description": "Base directory (default: working directory)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> eyre::Result<ToolOutput> {
        let pattern = input["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("pattern is required"))?;
        let base = input["path"].as_str().unwrap_or(".");

        let pattern_path = Path::new(pattern);
        if pattern_path.is_absolute() || pattern_path.components().any(|c| c == Component::ParentDir) {
            return Err(ToolError::PathTraversal {
                path: pattern.to_string(),
                root: ctx.canonical_root()?,
            }
            .into());
        }

        let root = ctx.canonical_root()?;
        let base_path = ctx.resolve_path(base)?;
        let full_pattern = base_path.join(pattern);
        let full_pattern = full_pattern
            .to_str()
            .ok_or_else(|| ToolError::invalid("pattern is not valid UTF-8"))?;

        let paths = glob::glob(full_pattern).map_err(|e| ToolError::invalid(format!("bad pattern: {}", e)))?;

        let mut matches: Vec<String> = paths
            .filter_map(|r| r.ok())
            .map(|p| normalize(&p))
            .filter(|p| p.starts_with(&root))
            .filter_map(|p| p.strip_prefix(&root).ok().map(|rel| rel.to_string_lossy().to_string()))
            .take(MAX_MATCHES)
            .collect();
        matches.sort();

        if matches.is_empty() {
            Ok(ToolOutput::success("No matches found"))
        } else {
            Ok(ToolOutput::success(matches.join("\n")))
        }
    }
}
