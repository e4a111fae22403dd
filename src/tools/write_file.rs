//! write_file tool - Write content to a file

use async_trait::async_trait;
use serde_json::Value;

use super::{Tool, ToolContext, ToolError, ToolOutput};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file. Creates parent directories if needed."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path relative to the working directory"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> eyre::Result<ToolOutput> {
        let path = input["path"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("path is required"))?;
        let content = input["content"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("content is required"))?;

        let full_path = ctx.resolve_path(path)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ToolError::Io {
                operation: format!("create directory for {}", path),
                source: e,
            })?;
        }

        tokio::fs::write(&full_path, content).await.map_err(|e| ToolError::Io {
            operation: format!("write {}", path),
            source: e,
        })?;

        Ok(ToolOutput::success(format!("Wrote {} bytes to {}", content.len(), path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_file_basic() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");

        let result = WriteFileTool
            .execute(serde_json::json!({"path": "test.txt", "content": "Hello, World!"}), &ctx)
            .await
            .unwrap();

        assert!(!result.is_error);
        assert!(result.content.contains("13 bytes"));
        assert_eq!(std::fs::read_to_string(dir.path().join("test.txt")).unwrap(), "Hello, World!");
    }

    #[tokio::test]
    async fn test_write_file_creates_directories() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");

        WriteFileTool
            .execute(
                serde_json::json!({"path": "subdir/nested/test.txt", "content": "Nested content"}),
                &ctx,
            )
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("subdir/nested/test.txt")).unwrap();
        assert_eq!(content, "Nested content");
    }

    #[tokio::test]
    async fn test_write_file_overwrites_existing() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");
        std::fs::write(dir.path().join("test.txt"), "Old content").unwrap();

        WriteFileTool
            .execute(serde_json::json!({"path": "test.txt", "content": "New content"}), &ctx)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("test.txt")).unwrap(), "New content");
    }

    #[tokio::test]
    async fn test_write_file_missing_arguments() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");

        assert!(WriteFileTool.execute(serde_json::json!({"content": "x"}), &ctx).await.is_err());
        assert!(WriteFileTool.execute(serde_json::json!({"path": "a.txt"}), &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_write_file_outside_root_leaves_no_file() {
        let base = tempdir().unwrap();
        let root = base.path().join("project");
        std::fs::create_dir(&root).unwrap();
        let ctx = ToolContext::new(&root, "test");

        let result = WriteFileTool
            .execute(serde_json::json!({"path": "../escape.txt", "content": "x"}), &ctx)
            .await;

        assert!(result.is_err());
        assert!(!base.path().join("escape.txt").exists());
    }
}
