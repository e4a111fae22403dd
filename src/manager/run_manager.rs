//! Run Manager implementation
//!
//! RunManager owns the registry of runs: it validates and creates them, starts
//! each one as an independent tokio task, parks suspended runs until a human
//! decision arrives, and applies lifecycle operations (abort, purge) under a
//! single write lock. Checkpoint and history files are written on the blocking
//! pool after that lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;

use crate::domain::{HumanDecision, RunConfig, RunState, RunStatus};
use crate::error::{GoalrunError, Result};
use crate::events::{AgentEvent, DEFAULT_QUEUE_CAPACITY, EventBus, Subscription};
use crate::goals::{Goal, GoalRegistry};
use crate::id::generate_run_id;
use crate::llm::Reasoner;
use crate::runner::{Halt, Orchestrator, OrchestratorConfig, RunOutcome, build_system_prompt};
use crate::storage::{Checkpoint, CheckpointStore, HistoryStore, RunRecord, is_safe_id};
use crate::tools::{SafetyGuard, ToolRegistry};

/// Configuration for the RunManager
#[derive(Debug, Clone)]
pub struct RunManagerConfig {
    pub orchestrator: OrchestratorConfig,
    /// Per-subscriber queue capacity of each run's event bus
    pub event_queue_capacity: usize,
}

impl Default for RunManagerConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Read-only view of a registered run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub config: RunConfig,
    pub status: RunStatus,
    pub iteration: u32,
    pub goal_reason: String,
    pub total_tokens: u64,
    /// Set when the run ended on a reasoner or goal-check failure
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct RunEntry {
    config: RunConfig,
    status: RunStatus,
    status_tx: watch::Sender<RunStatus>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
    /// Resolved once, at start or restore
    goal: Option<Arc<dyn Goal>>,
    /// Present while suspended
    checkpoint: Option<RunState>,
    iteration: u32,
    goal_reason: String,
    total_tokens: u64,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl RunEntry {
    fn new(config: RunConfig, status: RunStatus, capacity: usize) -> Self {
        let now = Utc::now();
        let (status_tx, _) = watch::channel(status);
        Self {
            config,
            status,
            status_tx,
            bus: Arc::new(EventBus::with_capacity(capacity)),
            cancel: CancellationToken::new(),
            goal: None,
            checkpoint: None,
            iteration: 0,
            goal_reason: String::new(),
            total_tokens: 0,
            error: None,
            created_at: now,
            started_at: None,
            updated_at: now,
        }
    }

    fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
        self.status_tx.send_replace(status);
    }

    fn absorb(&mut self, state: &RunState) {
        self.iteration = state.iteration;
        self.goal_reason = state.goal_reason.clone();
        self.total_tokens = state.total_tokens();
    }

    fn snapshot(&self, run_id: &str) -> RunSnapshot {
        RunSnapshot {
            run_id: run_id.to_string(),
            config: self.config.clone(),
            status: self.status,
            iteration: self.iteration,
            goal_reason: self.goal_reason.clone(),
            total_tokens: self.total_tokens,
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn invalid(&self, run_id: &str, action: &'static str) -> GoalrunError {
        GoalrunError::InvalidTransition {
            run_id: run_id.to_string(),
            status: self.status.to_string(),
            action,
        }
    }
}

type Registry = Arc<RwLock<HashMap<String, RunEntry>>>;

const ABORTED_AT_HUMAN_CHECK: &str = "Aborted while waiting for human check";

/// Storage writes decided under the registry lock and carried out after it is
/// released, on the blocking pool
struct Persist {
    run_id: String,
    save: Option<Checkpoint>,
    forget: bool,
    record: Option<RunRecord>,
}

impl Persist {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            save: None,
            forget: false,
            record: None,
        }
    }

    fn forget(run_id: &str) -> Self {
        Self {
            forget: true,
            ..Self::new(run_id)
        }
    }

    fn write(self, checkpoints: Option<&dyn CheckpointStore>, history: Option<&HistoryStore>) {
        if let Some(store) = checkpoints {
            if let Some(checkpoint) = &self.save
                && let Err(e) = store.save(checkpoint)
            {
                tracing::error!(run_id = %self.run_id, error = %e, "failed to persist checkpoint");
            }
            if self.forget
                && let Err(e) = store.delete(&self.run_id)
            {
                tracing::warn!(run_id = %self.run_id, error = %e, "failed to delete checkpoint");
            }
        }
        if let (Some(history), Some(record)) = (history, &self.record)
            && let Err(e) = history.append(record)
        {
            tracing::error!(run_id = %self.run_id, error = %e, "failed to append run history");
        }
    }
}

/// Close out a run that never left HUMAN_CHECK
fn end_at_human_check(run_id: &str, entry: &mut RunEntry) {
    entry.checkpoint = None;
    entry.bus.publish(AgentEvent::run_end(
        run_id,
        entry.iteration,
        RunStatus::Aborted.as_str(),
        "aborted",
        ABORTED_AT_HUMAN_CHECK,
        entry.total_tokens,
    ));
    entry.bus.close();
    entry.set_status(RunStatus::Aborted);
    tracing::info!(run_id = %run_id, iterations = entry.iteration, "run aborted at human check");
}

/// Applies orchestrator results back onto the registry. Cloned into every
/// run task.
#[derive(Clone)]
struct Settler {
    runs: Registry,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    history: Option<Arc<HistoryStore>>,
}

impl Settler {
    async fn settle(&self, run_id: &str, halt: Halt) {
        match halt {
            Halt::Suspended(state) => self.suspend(run_id, state).await,
            Halt::Done(outcome) => self.finish(run_id, outcome).await,
        }
    }

    async fn suspend(&self, run_id: &str, state: RunState) {
        // Saved before the run shows as suspended, so only a later resume can delete it
        let save = {
            let runs = self.runs.read().await;
            runs.get(run_id)
                .filter(|entry| self.checkpoints.is_some() && !entry.cancel.is_cancelled())
                .map(|entry| Checkpoint::new(entry.config.clone(), state.clone()))
        };
        if let Some(checkpoint) = save {
            self.apply(Persist {
                save: Some(checkpoint),
                ..Persist::new(run_id)
            })
            .await;
        }

        let persist = {
            let mut runs = self.runs.write().await;
            let Some(entry) = runs.get_mut(run_id) else {
                tracing::warn!(run_id = %run_id, "settled run is no longer registered");
                return;
            };
            entry.absorb(&state);
            if !entry.cancel.is_cancelled() {
                entry.checkpoint = Some(state);
                entry.set_status(RunStatus::Suspended);
                tracing::info!(run_id = %run_id, iteration = entry.iteration, "run suspended");
                return;
            }
            // Abort raced the suspension. The run stays `running` until its
            // records are written; resume cannot touch it meanwhile.
            self.finished(run_id, entry, RunStatus::Aborted, &state, ABORTED_AT_HUMAN_CHECK)
        };
        self.apply(persist).await;

        let mut runs = self.runs.write().await;
        if let Some(entry) = runs.get_mut(run_id) {
            end_at_human_check(run_id, entry);
        }
    }

    async fn finish(&self, run_id: &str, outcome: RunOutcome) {
        let RunOutcome {
            disposition,
            state,
            reason,
            error,
        } = outcome;
        let status = disposition.status();

        // History lands before `wait` can observe the terminal status
        let persist = {
            let runs = self.runs.read().await;
            let Some(entry) = runs.get(run_id) else {
                tracing::warn!(run_id = %run_id, "settled run is no longer registered");
                return;
            };
            self.finished(run_id, entry, status, &state, &reason)
        };
        self.apply(persist).await;

        let mut runs = self.runs.write().await;
        let Some(entry) = runs.get_mut(run_id) else {
            tracing::warn!(run_id = %run_id, "settled run is no longer registered");
            return;
        };
        entry.absorb(&state);
        entry.error = error;
        entry.checkpoint = None;
        entry.set_status(status);
        tracing::info!(run_id = %run_id, status = %entry.status, iterations = entry.iteration, "run terminal");
    }

    /// End a run parked at HUMAN_CHECK without resuming it. The caller applies
    /// the returned storage work once the lock is released.
    fn abort_suspended(&self, run_id: &str, entry: &mut RunEntry) -> Persist {
        let state = entry.checkpoint.take();
        end_at_human_check(run_id, entry);
        match state {
            Some(state) => self.finished(run_id, entry, RunStatus::Aborted, &state, ABORTED_AT_HUMAN_CHECK),
            None => Persist::forget(run_id),
        }
    }

    /// Storage work for a run ending in `status`
    fn finished(&self, run_id: &str, entry: &RunEntry, status: RunStatus, state: &RunState, reason: &str) -> Persist {
        let record = self.history.as_ref().map(|_| {
            RunRecord::new(
                run_id,
                &entry.config,
                status,
                state.iteration,
                &state.usage,
                entry.started_at.unwrap_or(entry.created_at),
                reason,
            )
        });
        Persist {
            record,
            ..Persist::forget(run_id)
        }
    }

    async fn apply(&self, persist: Persist) {
        if self.checkpoints.is_none() && self.history.is_none() {
            return;
        }
        let checkpoints = self.checkpoints.clone();
        let history = self.history.clone();
        let written =
            tokio::task::spawn_blocking(move || persist.write(checkpoints.as_deref(), history.as_deref())).await;
        if let Err(e) = written {
            tracing::error!(error = %e, "storage task failed");
        }
    }
}

/// Manages run lifecycle - creation, execution, suspension, abort
pub struct RunManager {
    reasoner: Arc<dyn Reasoner>,
    goals: Arc<GoalRegistry>,
    tools: Arc<ToolRegistry>,
    safety: Arc<SafetyGuard>,
    config: RunManagerConfig,
    settler: Settler,
}

impl RunManager {
    pub fn new(reasoner: Arc<dyn Reasoner>, goals: GoalRegistry, tools: ToolRegistry, config: RunManagerConfig) -> Self {
        Self {
            reasoner,
            goals: Arc::new(goals),
            tools: Arc::new(tools),
            safety: Arc::new(SafetyGuard::new()),
            config,
            settler: Settler {
                runs: Arc::new(RwLock::new(HashMap::new())),
                checkpoints: None,
                history: None,
            },
        }
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.settler.checkpoints = Some(store);
        self
    }

    pub fn with_history_store(mut self, store: Arc<HistoryStore>) -> Self {
        self.settler.history = Some(store);
        self
    }

    pub fn with_safety(mut self, safety: Arc<SafetyGuard>) -> Self {
        self.safety = safety;
        self
    }

    pub fn goals(&self) -> &GoalRegistry {
        &self.goals
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Validate and register a run as `pending`. Returns its id.
    pub async fn create(&self, mut config: RunConfig) -> Result<String> {
        if !self.goals.contains(&config.goal) {
            return Err(GoalrunError::UnknownGoal {
                name: config.goal.clone(),
                available: self.goals.names().join(", "),
            });
        }
        if !config.cwd.is_dir() {
            return Err(GoalrunError::InvalidConfig(format!(
                "working directory {} does not exist or is not a directory",
                config.cwd.display()
            )));
        }
        if config.max_iterations < 1 {
            return Err(GoalrunError::InvalidConfig("max_iterations must be at least 1".to_string()));
        }

        let run_id = match &config.run_id {
            Some(id) if !is_safe_id(id) => {
                return Err(GoalrunError::InvalidConfig(format!(
                    "run id '{}' may only contain letters, digits, '-', '_' and '.'",
                    id
                )));
            }
            Some(id) => id.clone(),
            None => generate_run_id(),
        };
        config.run_id = Some(run_id.clone());

        let mut runs = self.settler.runs.write().await;
        if runs.contains_key(&run_id) {
            return Err(GoalrunError::RunExists(run_id));
        }
        runs.insert(
            run_id.clone(),
            RunEntry::new(config, RunStatus::Pending, self.config.event_queue_capacity),
        );

        tracing::info!(run_id = %run_id, "run created");
        Ok(run_id)
    }

    /// `pending → running`: resolve the goal and launch the orchestrator task
    pub async fn start(&self, run_id: &str) -> Result<()> {
        let mut runs = self.settler.runs.write().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| GoalrunError::RunNotFound(run_id.to_string()))?;
        if entry.status != RunStatus::Pending {
            return Err(entry.invalid(run_id, "start"));
        }

        let goal = self.goals.get(&entry.config.goal)?;
        let state = RunState::new(run_id, &entry.config, build_system_prompt(goal.as_ref(), &entry.config));
        let orchestrator = self.orchestrator(goal.clone(), entry);

        entry.goal = Some(goal);
        entry.started_at = Some(Utc::now());
        entry.set_status(RunStatus::Running);

        let settler = self.settler.clone();
        let id = run_id.to_string();
        tokio::spawn(async move {
            let halt = orchestrator.run(state).await;
            settler.settle(&id, halt).await;
        });

        tracing::info!(run_id = %run_id, "run started");
        Ok(())
    }

    /// Feed a human decision to a suspended run
    pub async fn resume(&self, run_id: &str, decision: HumanDecision) -> Result<()> {
        let mut runs = self.settler.runs.write().await;
        let entry = runs
            .get_mut(run_id)
            .ok_or_else(|| GoalrunError::RunNotFound(run_id.to_string()))?;
        if entry.status != RunStatus::Suspended {
            return Err(entry.invalid(run_id, "resume"));
        }

        let goal = match &entry.goal {
            Some(goal) => goal.clone(),
            None => self.goals.get(&entry.config.goal)?,
        };
        let state = entry
            .checkpoint
            .take()
            .ok_or_else(|| GoalrunError::Checkpoint(format!("suspended run {} has no checkpoint", run_id)))?;
        let orchestrator = self.orchestrator(goal.clone(), entry);

        entry.goal = Some(goal);
        entry.started_at.get_or_insert_with(Utc::now);
        entry.set_status(RunStatus::Running);

        let settler = self.settler.clone();
        let id = run_id.to_string();
        tokio::spawn(async move {
            // Ahead of the resumed run, so a new suspension's checkpoint survives
            settler.apply(Persist::forget(&id)).await;
            let halt = orchestrator.resume(state, decision).await;
            settler.settle(&id, halt).await;
        });

        tracing::info!(run_id = %run_id, decision = decision.as_str(), "run resumed");
        Ok(())
    }

    /// Abort a running or suspended run.
    ///
    /// A suspended run ends immediately. A running run is only signalled: it
    /// stops at its next step boundary (after the in-flight reasoner call or
    /// tool call returns), and until then `get` still reports `running`. Use
    /// [`wait`](Self::wait) to observe the final `aborted` status.
    pub async fn abort(&self, run_id: &str) -> Result<()> {
        let persist = {
            let mut runs = self.settler.runs.write().await;
            let entry = runs
                .get_mut(run_id)
                .ok_or_else(|| GoalrunError::RunNotFound(run_id.to_string()))?;

            match entry.status {
                RunStatus::Running => {
                    entry.cancel.cancel();
                    tracing::info!(run_id = %run_id, "abort requested");
                    return Ok(());
                }
                RunStatus::Suspended => {
                    entry.cancel.cancel();
                    self.settler.abort_suspended(run_id, entry)
                }
                _ => return Err(entry.invalid(run_id, "abort")),
            }
        };
        self.settler.apply(persist).await;
        Ok(())
    }

    pub async fn get(&self, run_id: &str) -> Result<RunSnapshot> {
        let runs = self.settler.runs.read().await;
        runs.get(run_id)
            .map(|entry| entry.snapshot(run_id))
            .ok_or_else(|| GoalrunError::RunNotFound(run_id.to_string()))
    }

    /// Every registered run, oldest first
    pub async fn list(&self) -> Vec<RunSnapshot> {
        let runs = self.settler.runs.read().await;
        let mut snapshots: Vec<RunSnapshot> = runs.iter().map(|(id, entry)| entry.snapshot(id)).collect();
        snapshots.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.run_id.cmp(&b.run_id)));
        snapshots
    }

    /// Live event stream of a run
    pub async fn subscribe(&self, run_id: &str) -> Result<Subscription> {
        let runs = self.settler.runs.read().await;
        runs.get(run_id)
            .map(|entry| entry.bus.subscribe())
            .ok_or_else(|| GoalrunError::RunNotFound(run_id.to_string()))
    }

    /// Wait until the run is no longer `running` (terminal or suspended)
    pub async fn wait(&self, run_id: &str) -> Result<RunStatus> {
        let mut rx = {
            let runs = self.settler.runs.read().await;
            runs.get(run_id)
                .map(|entry| entry.status_tx.subscribe())
                .ok_or_else(|| GoalrunError::RunNotFound(run_id.to_string()))?
        };
        let status = *rx
            .wait_for(|status| *status != RunStatus::Running)
            .await
            .map_err(|_| GoalrunError::RunNotFound(run_id.to_string()))?;
        Ok(status)
    }

    /// Register a persisted checkpoint as a suspended run
    pub async fn restore(&self, run_id: &str) -> Result<()> {
        let store = self
            .settler
            .checkpoints
            .clone()
            .ok_or_else(|| GoalrunError::InvalidConfig("no checkpoint store configured".to_string()))?;

        if self.settler.runs.read().await.contains_key(run_id) {
            return Err(GoalrunError::RunExists(run_id.to_string()));
        }

        let id = run_id.to_string();
        let checkpoint = tokio::task::spawn_blocking(move || store.load(&id))
            .await
            .map_err(|e| GoalrunError::Checkpoint(format!("checkpoint load task failed: {}", e)))??
            .ok_or_else(|| GoalrunError::RunNotFound(run_id.to_string()))?;
        let goal = self.goals.get(&checkpoint.config.goal)?;

        let mut runs = self.settler.runs.write().await;
        if runs.contains_key(run_id) {
            return Err(GoalrunError::RunExists(run_id.to_string()));
        }

        let mut entry = RunEntry::new(
            checkpoint.config,
            RunStatus::Suspended,
            self.config.event_queue_capacity,
        );
        entry.absorb(&checkpoint.state);
        entry.created_at = checkpoint.state.created_at;
        entry.goal = Some(goal);
        entry.checkpoint = Some(checkpoint.state);
        runs.insert(run_id.to_string(), entry);

        tracing::info!(run_id = %run_id, "run restored from checkpoint");
        Ok(())
    }

    /// Drop a terminal run from the registry
    pub async fn purge(&self, run_id: &str) -> Result<RunSnapshot> {
        let mut runs = self.settler.runs.write().await;
        let entry = runs
            .get(run_id)
            .ok_or_else(|| GoalrunError::RunNotFound(run_id.to_string()))?;
        if !entry.status.is_terminal() {
            return Err(entry.invalid(run_id, "purge"));
        }
        let snapshot = entry.snapshot(run_id);
        runs.remove(run_id);
        Ok(snapshot)
    }

    fn orchestrator(&self, goal: Arc<dyn Goal>, entry: &RunEntry) -> Orchestrator {
        Orchestrator::new(self.reasoner.clone(), goal, self.tools.clone(), entry.bus.clone())
            .with_config(self.config.orchestrator.clone())
            .with_safety(self.safety.clone())
            .with_cancellation(entry.cancel.clone())
    }
}
