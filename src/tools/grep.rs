//! grep tool - Search file contents with regex
//!
//! Uses ripgrep when installed and falls back to `grep -rn`.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use super::{Tool, ToolContext, ToolError, ToolOutput};

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &'static str {
        "grep"
    }

    fn description(&self) -> &'static str {
        "Search file contents with regex. Returns matching lines with context."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search (default: working directory)"
                },
                "file_pattern": {
                    "type": "string",
                    "description": "Glob to filter files (e.g., *.rs)"
                },
                "context": {
                    "type": "integer",
                    "description": "Lines of context around matches (default: 2)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> eyre::Result<ToolOutput> {
        let pattern = input["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::invalid("pattern is required"))?;
        let path = input["path"].as_str().unwrap_or(".");
        let file_pattern = input["file_pattern"].as_str();
        let context_lines = input["context"].as_u64().unwrap_or(2);

        let root = ctx.canonical_root()?;
        let search_path = relative_to(&ctx.resolve_path(path)?, &root);

        let mut rg = Command::new("rg");
        rg.arg("--line-number")
            .arg("--no-heading")
            .arg(format!("--context={}", context_lines))
            .arg("--max-count=100");
        if let Some(fp) = file_pattern {
            rg.arg("--glob").arg(fp);
        }
        rg.arg("--").arg(pattern).arg(&search_path);

        let output = match spawn(rg, &root).await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("rg not available, falling back to grep");
                let mut grep = Command::new("grep");
                grep.arg("-rn").arg(format!("-C{}", context_lines)).arg("-E");
                if let Some(fp) = file_pattern {
                    grep.arg(format!("--include={}", fp));
                }
                grep.arg("--").arg(pattern).arg(&search_path);
                spawn(grep, &root).await.map_err(|e| ToolError::Io {
                    operation: "spawn grep".to_string(),
                    source: e,
                })?
            }
            Err(e) => {
                return Err(ToolError::Io {
                    operation: "spawn rg".to_string(),
                    source: e,
                }
                .into());
            }
        };

        // Exit code 1 means no matches for both rg and grep
        match output.status.code() {
            Some(0) | Some(1) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                if stdout.trim().is_empty() {
                    Ok(ToolOutput::success("No matches found"))
                } else {
                    Ok(ToolOutput::success(stdout.to_string()))
                }
            }
            _ => Ok(ToolOutput::error(String::from_utf8_lossy(&output.stderr).to_string())),
        }
    }
}

async fn spawn(mut cmd: Command, cwd: &Path) -> std::io::Result<Output> {
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
}

fn relative_to(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_grep_finds_matches() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");
        std::fs::write(dir.path().join("a.txt"), "alpha\nneedle here\nomega").unwrap();
        std::fs::write(dir.path().join("b.txt"), "nothing").unwrap();

        let result = GrepTool
            .execute(serde_json::json!({"pattern": "needle", "context": 0}), &ctx)
            .await
            .unwrap();

        assert!(!result.is_error);
        assert!(result.content.contains("needle here"));
        assert!(result.content.contains("a.txt"));
        assert!(!result.content.contains("b.txt"));
    }

    #[tokio::test]
    async fn test_grep_no_matches() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();

        let result = GrepTool
            .execute(serde_json::json!({"pattern": "zzz_not_present"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.content, "No matches found");
    }

    #[tokio::test]
    async fn test_grep_outside_root() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "test");

        let result = GrepTool
            .execute(serde_json::json!({"pattern": "root", "path": "/etc"}), &ctx)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(relative_to(Path::new("/r"), Path::new("/r")), PathBuf::from("."));
        assert_eq!(relative_to(Path::new("/r/src"), Path::new("/r")), PathBuf::from("src"));
    }
}
