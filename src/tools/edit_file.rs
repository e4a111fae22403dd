//! edit_file tool - Replace a specific string in a file

use async_trait::async_trait;
use eyre::eyre;
use serde_json::Value;

use super::{Tool, ToolContext, ToolError, ToolOutput};

pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Replace an exact string in a file. The string must be unique unless replace_all is set."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the working directory"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement string"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> eyre::Result<ToolOutput> {
        let path = input["path"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("path is required"))?;
        let old_string = input["old_string"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("old_string is required"))?;
        let new_string = input["new_string"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("new_string is required"))?;
        let replace_all = input["replace_all"].as_bool().unwrap_or(false);

        if old_string.is_empty() {
            return Ok(ToolOutput::error("old_string must not be empty"));
        }

        let full_path = ctx.resolve_path(path)?;
        let content = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|e| eyre!("Failed to read file '{}': {}", path, e))?;

        let count = content.matches(old_string).count();
        if count == 0 {
            return Ok(ToolOutput::error(
                "old_string not found in file. Make sure it matches exactly including whitespace.",
            ));
        }
        if count > 1 && !replace_all {
            return Ok(ToolOutput::error(format!(
                "old_string found {} times. Use replace_all=true or provide more context.",
                count
            )));
        }

        let new_content = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        tokio::fs::write(&full_path, &new_content).await.map_err(|e| ToolError::Io {
            operation: format!("write {}", path),
            source: e,
        })?;

        Ok(ToolOutput::success(format!("Replaced {} occurrence(s) in {}", count, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_edit_file_basic() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");
        std::fs::write(dir.path().join("test.txt"), "Hello, World!").unwrap();

        let result = EditFileTool
            .execute(
                json!({"path": "test.txt", "old_string": "World", "new_string": "Rust"}),
                &ctx,
            )
            .await
            .unwrap();

        assert!(!result.is_error);
        assert_eq!(std::fs::read_to_string(dir.path().join("test.txt")).unwrap(), "Hello, Rust!");
    }

    #[tokio::test]
    async fn test_edit_file_not_found_string() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");
        std::fs::write(dir.path().join("test.txt"), "Hello").unwrap();

        let result = EditFileTool
            .execute(json!({"path": "test.txt", "old_string": "Nope", "new_string": "x"}), &ctx)
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(result.content.contains("not found"));
    }

    #[tokio::test]
    async fn test_edit_file_ambiguous_without_replace_all() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");
        std::fs::write(dir.path().join("test.txt"), "a a a").unwrap();

        let result = EditFileTool
            .execute(json!({"path": "test.txt", "old_string": "a", "new_string": "b"}), &ctx)
            .await
            .unwrap();

        assert!(result.is_error);
        assert!(result.content.contains("3 times"));
        assert_eq!(std::fs::read_to_string(dir.path().join("test.txt")).unwrap(), "a a a");
    }

    #[tokio::test]
    async fn test_edit_file_replace_all() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");
        std::fs::write(dir.path().join("test.txt"), "a a a").unwrap();

        let result = EditFileTool
            .execute(
                json!({"path": "test.txt", "old_string": "a", "new_string": "b", "replace_all": true}),
                &ctx,
            )
            .await
            .unwrap();

        assert!(result.content.contains("3 occurrence"));
        assert_eq!(std::fs::read_to_string(dir.path().join("test.txt")).unwrap(), "b b b");
    }

    #[tokio::test]
    async fn test_edit_file_missing_file() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");

        let result = EditFileTool
            .execute(json!({"path": "missing.txt", "old_string": "a", "new_string": "b"}), &ctx)
            .await;
        assert!(result.is_err());
    }
}
