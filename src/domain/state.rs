//! Run state and conversation history
//!
//! A `RunState` is owned by exactly one orchestrator at a time. The run manager
//! only ever holds serialized copies of it (checkpoints).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use super::RunConfig;
use crate::llm::TokenUsage;

/// Speaker of a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the reasoner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Argument map (a JSON object)
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Outcome of one tool call, paired to it by `tool_call_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub role: Role,
    pub content: String,
    /// Calls requested by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ConversationEntry {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            is_error: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// Tool turn carrying a (possibly re-truncated) result
    pub fn tool(result: &ToolResult, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(result.tool_call_id.clone()),
            tool_name: Some(result.name.clone()),
            is_error: result.is_error,
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// The mutable record threaded through the state machine for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub goal: String,
    pub model: String,
    pub cwd: PathBuf,

    /// Append-only; the system entry is always first
    pub messages: Vec<ConversationEntry>,
    /// Calls requested by the most recent plan step
    pub pending_tool_calls: Vec<ToolCall>,
    /// Results for `pending_tool_calls`, in request order
    pub tool_results: Vec<ToolResult>,

    pub goal_achieved: bool,
    pub goal_reason: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub human_in_the_loop: bool,
    pub usage: TokenUsage,

    /// Failed evaluations since the last success
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Summaries of failures that already triggered a strategy shift, oldest first
    #[serde(default)]
    pub failed_strategies: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl RunState {
    /// Fresh state for a run: system entry followed by a kickoff user turn
    pub fn new(run_id: impl Into<String>, config: &RunConfig, system_prompt: impl Into<String>) -> Self {
        let kickoff = format!(
            "Begin working on the goal '{}' in {}. Inspect the project, make changes with the \
             available tools, and stop requesting tools once you believe the goal is met.",
            config.goal,
            config.cwd.display()
        );
        Self {
            run_id: run_id.into(),
            goal: config.goal.clone(),
            model: config.model.clone(),
            cwd: config.cwd.clone(),
            messages: vec![ConversationEntry::system(system_prompt), ConversationEntry::user(kickoff)],
            pending_tool_calls: Vec::new(),
            tool_results: Vec::new(),
            goal_achieved: false,
            goal_reason: String::new(),
            iteration: 0,
            max_iterations: config.max_iterations,
            human_in_the_loop: config.human_in_the_loop,
            usage: TokenUsage::default(),
            consecutive_failures: 0,
            failed_strategies: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn push(&mut self, entry: ConversationEntry) {
        self.messages.push(entry);
    }

    /// Record a goal evaluation. Achievement is sticky.
    pub fn record_goal(&mut self, achieved: bool, reason: impl Into<String>) {
        self.goal_achieved |= achieved;
        self.goal_reason = reason.into();
    }

    pub fn budget_exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    pub fn remaining_iterations(&self) -> u32 {
        self.max_iterations.saturating_sub(self.iteration)
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.total()
    }

    /// Every pending call has exactly one result with matching identity
    pub fn results_complete(&self) -> bool {
        self.pending_tool_calls.len() == self.tool_results.len()
            && self
                .pending_tool_calls
                .iter()
                .zip(&self.tool_results)
                .all(|(call, result)| call.id == result.tool_call_id)
    }
}
