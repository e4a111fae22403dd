//! Event wire types
//!
//! Serialized as `{kind, runId, iteration, payload, timestamp}` with a snake_case
//! `kind` and an RFC 3339 UTC timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{HumanDecision, ToolCall, ToolResult};
use crate::llm::TokenUsage;

/// Characters of tool output carried in a `tool_result` event
const EVENT_CONTENT_CHARS: usize = 500;

/// Characters kept per string in `goal_check` details
const DETAIL_STRING_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StepStart,
    ToolCall,
    ToolResult,
    LlmUsage,
    GoalCheck,
    HumanCheckRequired,
    HumanCheckResponse,
    IterationComplete,
    RunEnd,
    Error,
    Log,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StepStart => "step_start",
            EventKind::ToolCall => "tool_call",
            EventKind::ToolResult => "tool_result",
            EventKind::LlmUsage => "llm_usage",
            EventKind::GoalCheck => "goal_check",
            EventKind::HumanCheckRequired => "human_check_required",
            EventKind::HumanCheckResponse => "human_check_response",
            EventKind::IterationComplete => "iteration_complete",
            EventKind::RunEnd => "run_end",
            EventKind::Error => "error",
            EventKind::Log => "log",
        }
    }
}

/// An immutable progress event of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    pub kind: EventKind,
    pub run_id: String,
    /// Iteration count at emission
    pub iteration: u32,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(kind: EventKind, run_id: &str, iteration: u32, payload: Value) -> Self {
        Self {
            kind,
            run_id: run_id.to_string(),
            iteration,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// `step_start` for `plan`, `act`, `evaluate` or `human_check`
    pub fn step_start(run_id: &str, iteration: u32, node: &str) -> Self {
        Self::new(
            EventKind::StepStart,
            run_id,
            iteration,
            json!({ "node": node, "iteration": iteration }),
        )
    }

    pub fn llm_usage(run_id: &str, iteration: u32, usage: &TokenUsage, model: &str) -> Self {
        Self::new(
            EventKind::LlmUsage,
            run_id,
            iteration,
            json!({
                "prompt_tokens": usage.prompt_tokens,
                "completion_tokens": usage.completion_tokens,
                "total_tokens": usage.total(),
                "model": model
            }),
        )
    }

    pub fn tool_call(run_id: &str, iteration: u32, call: &ToolCall) -> Self {
        Self::new(
            EventKind::ToolCall,
            run_id,
            iteration,
            json!({ "id": call.id, "tool": call.name, "args": call.args }),
        )
    }

    pub fn tool_result(run_id: &str, iteration: u32, result: &ToolResult) -> Self {
        Self::new(
            EventKind::ToolResult,
            run_id,
            iteration,
            json!({
                "id": result.tool_call_id,
                "tool": result.name,
                "content": clip(&result.content, EVENT_CONTENT_CHARS),
                "error": result.is_error
            }),
        )
    }

    pub fn goal_check(run_id: &str, iteration: u32, achieved: bool, reason: &str, details: Option<&Value>) -> Self {
        let details = details.map(|d| clip_strings(d, DETAIL_STRING_CHARS)).unwrap_or(Value::Null);
        Self::new(
            EventKind::GoalCheck,
            run_id,
            iteration,
            json!({ "achieved": achieved, "reason": reason, "details": details }),
        )
    }

    pub fn iteration_complete(run_id: &str, iteration: u32, goal_achieved: bool) -> Self {
        Self::new(
            EventKind::IterationComplete,
            run_id,
            iteration,
            json!({ "iteration": iteration, "goal_achieved": goal_achieved }),
        )
    }

    pub fn human_check_required(run_id: &str, iteration: u32, reason: &str) -> Self {
        Self::new(
            EventKind::HumanCheckRequired,
            run_id,
            iteration,
            json!({ "iteration": iteration, "reason": reason }),
        )
    }

    pub fn human_check_response(run_id: &str, iteration: u32, decision: HumanDecision) -> Self {
        Self::new(
            EventKind::HumanCheckResponse,
            run_id,
            iteration,
            json!({ "decision": decision.as_str(), "approved": decision.is_approved() }),
        )
    }

    /// Terminal event. `status` is `achieved`, `failed` or `aborted`;
    /// `disposition` additionally distinguishes `error`.
    pub fn run_end(
        run_id: &str,
        iteration: u32,
        status: &str,
        disposition: &str,
        reason: &str,
        total_tokens: u64,
    ) -> Self {
        Self::new(
            EventKind::RunEnd,
            run_id,
            iteration,
            json!({
                "status": status,
                "disposition": disposition,
                "reason": reason,
                "iterations": iteration,
                "total_tokens": total_tokens
            }),
        )
    }

    pub fn error(run_id: &str, iteration: u32, source: &str, message: &str) -> Self {
        Self::new(
            EventKind::Error,
            run_id,
            iteration,
            json!({ "source": source, "error": message }),
        )
    }

    pub fn log(run_id: &str, iteration: u32, message: &str) -> Self {
        Self::new(EventKind::Log, run_id, iteration, json!({ "message": message }))
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == EventKind::RunEnd
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Cut every string inside `value` to `max_chars`, marking cut strings with `...`
fn clip_strings(value: &Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) if s.chars().count() > max_chars => Value::String(format!("{}...", clip(s, max_chars))),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), clip_strings(v, max_chars))).collect()),
        Value::Array(items) => Value::Array(items.iter().map(|v| clip_strings(v, max_chars)).collect()),
        other => other.clone(),
    }
}
