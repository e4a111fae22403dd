//! End-to-end run tests
//!
//! Drives runs through the public RunManager API with a scripted reasoner and a
//! goal that succeeds on chosen evaluations.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use goalrun::domain::{HumanDecision, RunConfig, RunState, RunStatus, ToolCall};
use goalrun::error::{GoalrunError, Result};
use goalrun::events::{AgentEvent, EventKind};
use goalrun::goals::{Goal, GoalRegistry, GoalResult};
use goalrun::llm::{PlanRequest, PlanResponse, Reasoner, ReasonerError};
use goalrun::manager::{RunManager, RunManagerConfig};
use goalrun::tools::ToolRegistry;
use serde_json::json;
use tempfile::TempDir;

/// Replays canned responses, then answers with plain text
struct ScriptedReasoner {
    responses: Mutex<VecDeque<PlanResponse>>,
}

impl ScriptedReasoner {
    fn new(responses: Vec<PlanResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn plan(&self, _request: PlanRequest) -> std::result::Result<PlanResponse, ReasonerError> {
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| PlanResponse::text("still thinking").with_usage(10, 5)))
    }
}

/// Achieved on the listed (1-based) evaluations
struct SequencedGoal {
    achieved_on: Vec<u32>,
    calls: AtomicU32,
}

impl SequencedGoal {
    fn new(achieved_on: Vec<u32>) -> Arc<Self> {
        Arc::new(Self {
            achieved_on,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Goal for SequencedGoal {
    fn name(&self) -> &str {
        "sequenced"
    }

    fn prompt_fragment(&self, _cwd: &Path) -> String {
        "Pass the sequenced check.".to_string()
    }

    async fn check(&self, _state: &RunState, _cwd: &Path) -> Result<GoalResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(if self.achieved_on.contains(&call) {
            GoalResult::achieved(format!("passed on check {}", call))
        } else {
            GoalResult::not_achieved(format!("check {} failed", call))
        })
    }
}

fn manager(reasoner: Arc<ScriptedReasoner>, goal: Arc<SequencedGoal>) -> RunManager {
    let mut goals = GoalRegistry::new();
    goals.register(goal);
    RunManager::new(reasoner, goals, ToolRegistry::standard(), RunManagerConfig::default())
}

fn kinds(events: &[AgentEvent]) -> Vec<EventKind> {
    events.iter().map(|e| e.kind).collect()
}

fn plan_steps(events: &[AgentEvent]) -> usize {
    events
        .iter()
        .filter(|e| e.kind == EventKind::StepStart && e.payload["node"] == "plan")
        .count()
}

fn run_ends(events: &[AgentEvent]) -> Vec<&AgentEvent> {
    events.iter().filter(|e| e.kind == EventKind::RunEnd).collect()
}

/// Create, subscribe, start and wait; returns the final status and all events
async fn run_to_end(manager: &RunManager, config: RunConfig) -> (String, RunStatus, Vec<AgentEvent>) {
    let id = manager.create(config).await.unwrap();
    let sub = manager.subscribe(&id).await.unwrap();
    manager.start(&id).await.unwrap();
    let status = manager.wait(&id).await.unwrap();
    (id, status, sub.collect().await)
}

#[tokio::test]
async fn test_budget_exhausted_run_fails() {
    let dir = TempDir::new().unwrap();
    let manager = manager(ScriptedReasoner::new(vec![]), SequencedGoal::new(vec![]));

    let config = RunConfig::new("sequenced", dir.path()).with_max_iterations(1);
    let (id, status, events) = run_to_end(&manager, config).await;

    assert_eq!(status, RunStatus::Failed);
    assert_eq!(manager.get(&id).await.unwrap().iteration, 1);

    let ends = run_ends(&events);
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].payload["status"], "failed");
    assert!(
        ends[0].payload["reason"]
            .as_str()
            .unwrap()
            .starts_with("Max iterations (1) reached.")
    );
}

#[tokio::test]
async fn test_hitl_reject_aborts_without_further_planning() {
    let dir = TempDir::new().unwrap();
    let manager = manager(ScriptedReasoner::new(vec![]), SequencedGoal::new(vec![]));

    let config = RunConfig::new("sequenced", dir.path()).with_human_in_the_loop(true);
    let id = manager.create(config).await.unwrap();
    let sub = manager.subscribe(&id).await.unwrap();
    manager.start(&id).await.unwrap();

    assert_eq!(manager.wait(&id).await.unwrap(), RunStatus::Suspended);
    assert_eq!(manager.get(&id).await.unwrap().goal_reason, "check 1 failed");

    manager.resume(&id, HumanDecision::Reject).await.unwrap();
    assert_eq!(manager.wait(&id).await.unwrap(), RunStatus::Aborted);

    let events = sub.collect().await;
    assert_eq!(plan_steps(&events), 1);
    assert!(kinds(&events).contains(&EventKind::HumanCheckRequired));

    let response = events
        .iter()
        .find(|e| e.kind == EventKind::HumanCheckResponse)
        .unwrap();
    assert_eq!(response.payload["decision"], "reject");

    let ends = run_ends(&events);
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].payload["status"], "aborted");
}

#[tokio::test]
async fn test_hitl_approve_continues() {
    let dir = TempDir::new().unwrap();
    let manager = manager(ScriptedReasoner::new(vec![]), SequencedGoal::new(vec![2]));

    let config = RunConfig::new("sequenced", dir.path()).with_human_in_the_loop(true);
    let id = manager.create(config).await.unwrap();
    let sub = manager.subscribe(&id).await.unwrap();
    manager.start(&id).await.unwrap();

    assert_eq!(manager.wait(&id).await.unwrap(), RunStatus::Suspended);
    manager.resume(&id, HumanDecision::from_text("yes")).await.unwrap();
    assert_eq!(manager.wait(&id).await.unwrap(), RunStatus::Achieved);

    let events = sub.collect().await;
    assert_eq!(plan_steps(&events), 2);
    assert_eq!(manager.get(&id).await.unwrap().iteration, 2);
}

#[tokio::test]
async fn test_traversal_rejected_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir(&project).unwrap();

    let escape = ToolCall::new(
        "call-1",
        "write_file",
        json!({ "path": "../outside.txt", "content": "gotcha" }),
    );
    let reasoner = ScriptedReasoner::new(vec![PlanResponse::text("writing").with_tool_call(escape)]);
    let manager = manager(reasoner, SequencedGoal::new(vec![2]));

    let (_, status, events) = run_to_end(&manager, RunConfig::new("sequenced", &project)).await;

    assert_eq!(status, RunStatus::Achieved);
    assert!(!dir.path().join("outside.txt").exists());

    let result = events.iter().find(|e| e.kind == EventKind::ToolResult).unwrap();
    assert_eq!(result.payload["id"], "call-1");
    assert_eq!(result.payload["error"], true);
    assert!(
        result.payload["content"]
            .as_str()
            .unwrap()
            .contains("Path traversal denied")
    );
    assert_eq!(plan_steps(&events), 2);
}

#[tokio::test]
async fn test_achieved_first_evaluation_skips_human_check() {
    let dir = TempDir::new().unwrap();
    let manager = manager(ScriptedReasoner::new(vec![]), SequencedGoal::new(vec![1]));

    let config = RunConfig::new("sequenced", dir.path()).with_human_in_the_loop(true);
    let (_, status, events) = run_to_end(&manager, config).await;

    assert_eq!(status, RunStatus::Achieved);
    let kinds = kinds(&events);
    assert!(!kinds.contains(&EventKind::HumanCheckRequired));
    assert_eq!(run_ends(&events)[0].payload["status"], "achieved");
}

#[tokio::test]
async fn test_tool_calls_paired_and_ordered() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "one\ntwo\n").unwrap();

    let first = PlanResponse::text("looking")
        .with_tool_call(ToolCall::new("a", "read_file", json!({ "path": "notes.txt" })))
        .with_tool_call(ToolCall::new("b", "list_directory", json!({})))
        .with_usage(100, 20);
    let second = PlanResponse::text("editing")
        .with_tool_call(ToolCall::new(
            "c",
            "edit_file",
            json!({ "path": "notes.txt", "old_string": "two", "new_string": "three" }),
        ))
        .with_usage(100, 20);
    let manager = manager(ScriptedReasoner::new(vec![first, second]), SequencedGoal::new(vec![3]));

    let config = RunConfig::new("sequenced", dir.path()).with_max_iterations(5);
    let (id, status, events) = run_to_end(&manager, config).await;
    assert_eq!(status, RunStatus::Achieved);
    assert_eq!(std::fs::read_to_string(dir.path().join("notes.txt")).unwrap(), "one\nthree\n");

    // Iterations never go backwards or past the budget
    let mut last = 0;
    for event in &events {
        assert!(event.iteration >= last);
        assert!(event.iteration <= 5);
        last = event.iteration;
    }

    // Each iteration: plan, then calls and their results in order, then evaluate
    let mut open: Vec<String> = Vec::new();
    let mut seen_plan = false;
    for event in &events {
        match (event.kind, event.payload["node"].as_str()) {
            (EventKind::StepStart, Some("plan")) => {
                assert!(open.is_empty(), "plan started with unanswered calls {open:?}");
                seen_plan = true;
            }
            (EventKind::StepStart, Some("evaluate")) => {
                assert!(open.is_empty());
                seen_plan = false;
            }
            (EventKind::ToolCall, _) => {
                assert!(seen_plan);
                open.push(event.payload["id"].as_str().unwrap().to_string());
            }
            (EventKind::ToolResult, _) => {
                let id = event.payload["id"].as_str().unwrap();
                assert_eq!(open.first().map(String::as_str), Some(id));
                open.remove(0);
            }
            _ => {}
        }
    }

    let snapshot = manager.get(&id).await.unwrap();
    assert_eq!(snapshot.iteration, 3);
    assert_eq!(snapshot.total_tokens, 120 + 120 + 15);
}

#[tokio::test]
async fn test_resume_non_suspended_has_no_effect() {
    let dir = TempDir::new().unwrap();
    let manager = manager(ScriptedReasoner::new(vec![]), SequencedGoal::new(vec![1]));

    let (id, status, _) = run_to_end(&manager, RunConfig::new("sequenced", dir.path())).await;
    assert_eq!(status, RunStatus::Achieved);

    let before = manager.get(&id).await.unwrap();
    let err = manager.resume(&id, HumanDecision::Approve).await.unwrap_err();
    assert!(matches!(err, GoalrunError::InvalidTransition { action: "resume", .. }));
    assert_eq!(manager.get(&id).await.unwrap(), before);
}

#[tokio::test]
async fn test_unknown_tool_is_a_failed_result() {
    let dir = TempDir::new().unwrap();
    let reasoner = ScriptedReasoner::new(vec![
        PlanResponse::text("trying").with_tool_call(ToolCall::new("x", "teleport", json!({}))),
    ]);
    let manager = manager(reasoner, SequencedGoal::new(vec![1]));

    let (_, status, events) = run_to_end(&manager, RunConfig::new("sequenced", dir.path())).await;
    assert_eq!(status, RunStatus::Achieved);

    let result = events.iter().find(|e| e.kind == EventKind::ToolResult).unwrap();
    assert_eq!(result.payload["error"], true);
    assert_eq!(result.payload["content"], "Unknown tool: teleport");
}
