//! Run orchestrator - drives one run through PLAN → ACT → EVALUATE → HUMAN_CHECK.
//!
//! The orchestrator owns the run's [`RunState`] while it is running and is the
//! only publisher on the run's [`EventBus`]. It halts either at a terminal
//! disposition (after publishing `run_end` and closing the bus) or at
//! HUMAN_CHECK, handing the state back so the caller can checkpoint it and
//! later [`resume`](Orchestrator::resume) with a decision.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::history::{status_message, trim_window};
use super::reflect::{REFLECT_AFTER_FAILURES, record_outcome, strategy_shift};
use super::step::{Disposition, Step, Transition, evaluate_transition, next_step};
use crate::domain::{ConversationEntry, HumanDecision, RunState, ToolCall};
use crate::error::{GoalrunError, Result};
use crate::events::{AgentEvent, EventBus};
use crate::goals::Goal;
use crate::id::generate_tool_call_id;
use crate::llm::{PlanRequest, Reasoner};
use crate::tools::{SafetyGuard, ToolContext, ToolRegistry, truncate_head};

/// Entries sent to the reasoner per PLAN (system entry included)
pub const DEFAULT_HISTORY_WINDOW: usize = 60;

/// Tool output kept in history per call
pub const DEFAULT_MAX_HISTORY_OUTPUT_CHARS: usize = 8000;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub history_window: usize,
    pub max_history_output_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_window: DEFAULT_HISTORY_WINDOW,
            max_history_output_chars: DEFAULT_MAX_HISTORY_OUTPUT_CHARS,
        }
    }
}

/// A finished run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub disposition: Disposition,
    pub state: RunState,
    /// Text carried in `run_end.reason`
    pub reason: String,
    /// Set for `Disposition::Error`
    pub error: Option<String>,
}

/// Why the orchestrator returned
#[derive(Debug, Clone)]
pub enum Halt {
    Done(RunOutcome),
    /// Waiting at HUMAN_CHECK
    Suspended(RunState),
}

pub struct Orchestrator {
    reasoner: Arc<dyn Reasoner>,
    goal: Arc<dyn Goal>,
    tools: Arc<ToolRegistry>,
    safety: Arc<SafetyGuard>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(reasoner: Arc<dyn Reasoner>, goal: Arc<dyn Goal>, tools: Arc<ToolRegistry>, bus: Arc<EventBus>) -> Self {
        Self {
            reasoner,
            goal,
            tools,
            safety: Arc::new(SafetyGuard::new()),
            bus,
            cancel: CancellationToken::new(),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_safety(mut self, safety: Arc<SafetyGuard>) -> Self {
        self.safety = safety;
        self
    }

    /// Abort flag observed at every step boundary
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run from PLAN
    pub async fn run(&self, state: RunState) -> Halt {
        tracing::info!(run_id = %state.run_id, goal = %state.goal, "run starting");
        self.drive(state, Step::Plan, None).await
    }

    /// Continue a run suspended at HUMAN_CHECK
    pub async fn resume(&self, state: RunState, decision: HumanDecision) -> Halt {
        tracing::info!(run_id = %state.run_id, decision = decision.as_str(), "run resuming");
        self.bus
            .publish(AgentEvent::human_check_response(&state.run_id, state.iteration, decision));

        let transition = if decision.is_approved() {
            if state.budget_exhausted() {
                Transition::BudgetExhausted
            } else {
                Transition::Approved
            }
        } else {
            Transition::Rejected
        };
        let note = (!decision.is_approved()).then(|| "Rejected at human check".to_string());
        let step = self.advance(&state, Step::HumanCheck, transition);
        self.drive(state, step, note).await
    }

    async fn drive(&self, mut state: RunState, mut step: Step, mut note: Option<String>) -> Halt {
        let mut error = None;

        loop {
            if self.cancel.is_cancelled() && step != Step::Done(Disposition::Aborted) {
                tracing::info!(run_id = %state.run_id, step = %step, "abort observed");
                step = Step::Done(Disposition::Aborted);
                note = Some("Aborted".to_string());
            }

            let outcome = match step {
                Step::Done(disposition) => {
                    return Halt::Done(self.finish(state, disposition, note, error));
                }
                Step::HumanCheck => {
                    self.bus.publish(AgentEvent::human_check_required(
                        &state.run_id,
                        state.iteration,
                        &state.goal_reason,
                    ));
                    tracing::info!(run_id = %state.run_id, iteration = state.iteration, "suspended for human check");
                    return Halt::Suspended(state);
                }
                Step::Plan => self.plan(&mut state).await,
                Step::Act => self.act(&mut state).await,
                Step::Evaluate => self.evaluate(&mut state).await,
            };

            let transition = match outcome {
                Ok(transition) => transition,
                Err(e) => {
                    let message = e.to_string();
                    tracing::error!(run_id = %state.run_id, step = %step, error = %message, "fatal step failure");
                    self.bus
                        .publish(AgentEvent::error(&state.run_id, state.iteration, step.as_str(), &message));
                    error = Some(message);
                    Transition::Fatal
                }
            };

            step = self.advance(&state, step, transition);
        }
    }

    fn advance(&self, state: &RunState, step: Step, transition: Transition) -> Step {
        next_step(step, transition).unwrap_or_else(|| {
            tracing::error!(run_id = %state.run_id, step = %step, ?transition, "illegal transition");
            Step::Done(Disposition::Error)
        })
    }

    async fn plan(&self, state: &mut RunState) -> Result<Transition> {
        self.bus
            .publish(AgentEvent::step_start(&state.run_id, state.iteration, Step::Plan.as_str()));

        let request = PlanRequest {
            model: state.model.clone(),
            messages: trim_window(&state.messages, self.config.history_window),
            tools: self.tools.definitions(),
        };
        let response = self.reasoner.plan(request).await?;

        state.usage.add(&response.usage);
        self.bus.publish(AgentEvent::llm_usage(
            &state.run_id,
            state.iteration,
            &response.usage,
            &state.model,
        ));

        let calls: Vec<ToolCall> = response
            .tool_calls
            .into_iter()
            .map(|mut call| {
                if call.id.is_empty() {
                    call.id = generate_tool_call_id();
                }
                call
            })
            .collect();

        tracing::debug!(
            run_id = %state.run_id,
            iteration = state.iteration,
            tool_calls = calls.len(),
            "plan complete"
        );

        state.push(ConversationEntry::assistant(response.content, calls.clone()));
        state.tool_results.clear();
        state.pending_tool_calls = calls;

        Ok(if state.pending_tool_calls.is_empty() {
            Transition::NoToolCalls
        } else {
            Transition::ToolCallsRequested
        })
    }

    async fn act(&self, state: &mut RunState) -> Result<Transition> {
        self.bus
            .publish(AgentEvent::step_start(&state.run_id, state.iteration, Step::Act.as_str()));

        let ctx = ToolContext::new(&state.cwd, &state.run_id).with_safety(self.safety.clone());
        let calls = state.pending_tool_calls.clone();

        for call in &calls {
            self.bus
                .publish(AgentEvent::tool_call(&state.run_id, state.iteration, call));

            let result = self.tools.execute(call, &ctx, None).await;
            if result.is_error {
                tracing::debug!(run_id = %state.run_id, tool = %call.name, "tool call failed");
            }

            self.bus
                .publish(AgentEvent::tool_result(&state.run_id, state.iteration, &result));

            let content = truncate_head(&result.content, self.config.max_history_output_chars);
            state.push(ConversationEntry::tool(&result, content));
            state.tool_results.push(result);
        }

        if !state.results_complete() {
            return Err(GoalrunError::Tool(format!(
                "{} tool calls produced {} results",
                state.pending_tool_calls.len(),
                state.tool_results.len()
            )));
        }
        Ok(Transition::ToolsExecuted)
    }

    async fn evaluate(&self, state: &mut RunState) -> Result<Transition> {
        self.bus
            .publish(AgentEvent::step_start(&state.run_id, state.iteration, Step::Evaluate.as_str()));

        let cwd: PathBuf = state.cwd.clone();
        let result = self.goal.check(state, &cwd).await?;

        let previous_reason = std::mem::take(&mut state.goal_reason);
        state.iteration += 1;
        state.record_goal(result.achieved, result.reason.clone());
        record_outcome(state, result.achieved);
        let transition = evaluate_transition(state.goal_achieved, state.budget_exhausted(), state.human_in_the_loop);

        state.push(ConversationEntry::user(status_message(state, &result.reason)));

        self.bus.publish(AgentEvent::goal_check(
            &state.run_id,
            state.iteration,
            result.achieved,
            &result.reason,
            result.details.as_ref(),
        ));
        self.bus.publish(AgentEvent::iteration_complete(
            &state.run_id,
            state.iteration,
            state.goal_achieved,
        ));

        tracing::info!(
            run_id = %state.run_id,
            iteration = state.iteration,
            max_iterations = state.max_iterations,
            achieved = state.goal_achieved,
            "iteration complete"
        );

        if matches!(transition, Transition::Continue | Transition::NeedsHuman) {
            self.reflect(state, &previous_reason, &result.reason);
        }
        Ok(transition)
    }

    /// Inject a strategy-shift turn when the run keeps failing the same way
    fn reflect(&self, state: &mut RunState, previous_reason: &str, reason: &str) {
        if state.consecutive_failures < REFLECT_AFTER_FAILURES {
            return;
        }
        self.bus.publish(AgentEvent::log(
            &state.run_id,
            state.iteration,
            &format!(
                "Reflecting on {} consecutive failures. Analyzing stuck patterns...",
                state.consecutive_failures
            ),
        ));

        let Some(turn) = strategy_shift(state, previous_reason, reason) else {
            return;
        };
        state.push(ConversationEntry::user(turn));
        self.bus.publish(AgentEvent::log(
            &state.run_id,
            state.iteration,
            "Strategy shift triggered, injecting a new approach",
        ));
        tracing::warn!(
            run_id = %state.run_id,
            consecutive_failures = state.consecutive_failures,
            "run is stuck, strategy shift injected"
        );
    }

    fn finish(
        &self,
        mut state: RunState,
        disposition: Disposition,
        note: Option<String>,
        error: Option<String>,
    ) -> RunOutcome {
        let reason = match disposition {
            Disposition::Achieved => state.goal_reason.clone(),
            Disposition::Failed => {
                let reason = format!("Max iterations ({}) reached. {}", state.max_iterations, state.goal_reason);
                state.goal_reason = reason.clone();
                reason
            }
            Disposition::Aborted => note.unwrap_or_else(|| "Aborted".to_string()),
            Disposition::Error => error.clone().unwrap_or_else(|| "Unknown error".to_string()),
        };

        self.bus.publish(AgentEvent::run_end(
            &state.run_id,
            state.iteration,
            disposition.status().as_str(),
            disposition.as_str(),
            &reason,
            state.total_tokens(),
        ));
        self.bus.close();

        tracing::info!(
            run_id = %state.run_id,
            disposition = %disposition,
            iterations = state.iteration,
            total_tokens = state.total_tokens(),
            "run finished"
        );

        RunOutcome {
            disposition,
            state,
            reason,
            error,
        }
    }
}
