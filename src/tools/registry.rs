//! Tool registry - name lookup and the dispatch boundary

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{
    EditFileTool, GlobTool, GrepTool, ListDirectoryTool, ReadFileTool, RunCommandTool, Tool, ToolContext, ToolError,
    WriteFileTool, truncate_head,
};
use crate::domain::{ToolCall, ToolResult};
use crate::llm::ToolDefinition;

/// Per-call timeout when neither the caller nor the arguments set one
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Output bound applied at the tool boundary
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 100_000;

/// Maps tool names to implementations. Built once and shared by every run.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    default_timeout: Duration,
    max_output_chars: usize,
}

impl ToolRegistry {
    /// Empty registry (for custom tool sets)
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }

    /// Registry with the built-in file, search and command tools
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReadFileTool));
        registry.register(Arc::new(WriteFileTool));
        registry.register(Arc::new(EditFileTool));
        registry.register(Arc::new(ListDirectoryTool));
        registry.register(Arc::new(GlobTool));
        registry.register(Arc::new(GrepTool));
        registry.register(Arc::new(RunCommandTool));
        registry
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_max_output_chars(mut self, max_output_chars: usize) -> Self {
        self.max_output_chars = max_output_chars;
        self
    }

    /// Add a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Sorted tool names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Declarations for every tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.definition())
            .collect()
    }

    /// Explicit timeout, else the call's `timeout_ms` argument, else the default
    pub fn timeout_for(&self, call: &ToolCall, explicit: Option<Duration>) -> Duration {
        explicit
            .or_else(|| call.args["timeout_ms"].as_u64().map(Duration::from_millis))
            .unwrap_or(self.default_timeout)
    }

    /// Execute one call. Never fails: unknown tools, bad input, tool errors and
    /// timeouts all come back as a failed result paired to the call.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext, timeout: Option<Duration>) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::failure(call, ToolError::UnknownTool { name: call.name.clone() }.to_string());
        };

        if !(call.args.is_object() || call.args.is_null()) {
            return ToolResult::failure(call, ToolError::invalid("arguments must be a JSON object").to_string());
        }

        let timeout = self.timeout_for(call, timeout);
        let scoped = ctx.with_timeout(timeout).with_max_output(self.max_output_chars);
        let started = Instant::now();

        let outcome = tokio::time::timeout(timeout, tool.execute(call.args.clone(), &scoped)).await;

        let result = match outcome {
            Ok(Ok(output)) => {
                let content = truncate_head(&output.content, self.max_output_chars);
                if output.is_error {
                    ToolResult::failure(call, content)
                } else {
                    ToolResult::success(call, content)
                }
            }
            Ok(Err(e)) => ToolResult::failure(call, describe_error(&e)),
            Err(_) => ToolResult::failure(
                call,
                ToolError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .to_string(),
            ),
        };

        log::debug!(
            "run {} tool {} ({}) finished in {:?}, error={}",
            ctx.run_id(),
            call.name,
            call.id,
            started.elapsed(),
            result.is_error
        );
        result
    }

    /// Execute calls sequentially, in order
    pub async fn execute_all(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call, ctx, None).await);
        }
        results
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Typed tool errors keep their own message; anything else gets a prefix
fn describe_error(err: &eyre::Report) -> String {
    match err.downcast_ref::<ToolError>() {
        Some(tool_err) => tool_err.to_string(),
        None => format!("Tool error: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutput;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tempfile::tempdir;

    struct SleepTool;

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &'static str {
            "sleep"
        }

        fn description(&self) -> &'static str {
            "Sleeps"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> eyre::Result<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ToolOutput::success("woke"))
        }
    }

    struct LoudTool;

    #[async_trait]
    impl Tool for LoudTool {
        fn name(&self) -> &'static str {
            "loud"
        }

        fn description(&self) -> &'static str {
            "Prints a lot"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> eyre::Result<ToolOutput> {
            Ok(ToolOutput::success("x".repeat(500)))
        }
    }

    #[test]
    fn test_standard_registry_has_all_tools() {
        let registry = ToolRegistry::standard();
        assert_eq!(
            registry.names(),
            vec!["edit_file", "glob", "grep", "list_directory", "read_file", "run_command", "write_file"]
        );
        assert_eq!(registry.definitions().len(), 7);
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.names().is_empty());
        assert!(registry.definitions().is_empty());
    }

    #[test]
    fn test_timeout_resolution() {
        let registry = ToolRegistry::new().with_default_timeout(Duration::from_secs(5));
        let plain = ToolCall::new("1", "run_command", json!({"command": "ls"}));
        let with_arg = ToolCall::new("2", "run_command", json!({"command": "ls", "timeout_ms": 250}));

        assert_eq!(registry.timeout_for(&plain, None), Duration::from_secs(5));
        assert_eq!(registry.timeout_for(&with_arg, None), Duration::from_millis(250));
        assert_eq!(
            registry.timeout_for(&with_arg, Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "run-1");
        let call = ToolCall::new("call_1", "nonexistent_tool", json!({}));

        let result = ToolRegistry::standard().execute(&call, &ctx, None).await;
        assert!(result.is_error);
        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.content, "Unknown tool: nonexistent_tool");
    }

    #[tokio::test]
    async fn test_execute_rejects_non_object_args() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "run-1");
        let call = ToolCall::new("call_1", "read_file", json!(["a.txt"]));

        let result = ToolRegistry::standard().execute(&call, &ctx, None).await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Invalid input"));
    }

    #[tokio::test]
    async fn test_execute_traversal_is_a_failed_result() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path().join("project"), "run-1");
        std::fs::create_dir(dir.path().join("project")).unwrap();
        let call = ToolCall::new("w1", "write_file", json!({"path": "../outside.txt", "content": "x"}));

        let result = ToolRegistry::standard().execute(&call, &ctx, None).await;
        assert!(result.is_error);
        assert!(result.content.starts_with("Path traversal denied"), "{}", result.content);
        assert!(!dir.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "run-1");
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool));

        let call = ToolCall::new("s1", "sleep", json!({}));
        let result = registry.execute(&call, &ctx, Some(Duration::from_millis(50))).await;
        assert!(result.is_error);
        assert_eq!(result.content, "Timed out after 50ms");
    }

    #[tokio::test]
    async fn test_execute_truncates_output() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "run-1");
        let mut registry = ToolRegistry::new().with_max_output_chars(100);
        registry.register(Arc::new(LoudTool));

        let result = registry.execute(&ToolCall::new("l1", "loud", json!({})), &ctx, None).await;
        assert!(!result.is_error);
        assert!(result.content.contains("[output truncated, 500 chars total]"));
    }

    #[tokio::test]
    async fn test_execute_all_in_order() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path(), "run-1");
        let registry = ToolRegistry::standard();

        let calls = vec![
            ToolCall::new("c1", "write_file", json!({"path": "a.txt", "content": "one"})),
            ToolCall::new("c2", "read_file", json!({"path": "a.txt"})),
            ToolCall::new("c3", "read_file", json!({"path": "missing.txt"})),
        ];

        let results = registry.execute_all(&calls, &ctx).await;
        let ids: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
        assert!(!results[0].is_error);
        assert!(results[1].content.contains("one"));
        assert!(results[2].is_error);
        assert!(results[2].content.starts_with("Tool error"));
    }
}
