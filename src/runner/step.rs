//! Run state machine: steps, dispositions and the transition function

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::RunStatus;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Achieved,
    /// Iteration budget exhausted
    Failed,
    /// Human rejection or abort
    Aborted,
    /// Fatal reasoner or goal-check failure
    Error,
}

impl Disposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Achieved => "achieved",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
            Self::Error => "error",
        }
    }

    /// Lifecycle status of a run that ended this way
    pub fn status(self) -> RunStatus {
        match self {
            Self::Achieved => RunStatus::Achieved,
            Self::Failed | Self::Error => RunStatus::Failed,
            Self::Aborted => RunStatus::Aborted,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Plan,
    Act,
    Evaluate,
    HumanCheck,
    Done(Disposition),
}

impl Step {
    /// Node name used in `step_start` events
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Act => "act",
            Self::Evaluate => "evaluate",
            Self::HumanCheck => "human_check",
            Self::Done(_) => "done",
        }
    }

    pub fn is_done(self) -> bool {
        matches!(self, Self::Done(_))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Planner asked for at least one tool call
    ToolCallsRequested,
    NoToolCalls,
    /// Every pending call has a result
    ToolsExecuted,
    GoalAchieved,
    BudgetExhausted,
    NeedsHuman,
    Continue,
    Approved,
    Rejected,
    Aborted,
    Fatal,
}

/// Successor of `step` after observing `transition`, or `None` when the pair
/// is not a legal edge. Abort and fatal errors end the run from any live step.
pub fn next_step(step: Step, transition: Transition) -> Option<Step> {
    use Transition::*;

    match (step, transition) {
        (Step::Done(_), _) => None,
        (_, Aborted) => Some(Step::Done(Disposition::Aborted)),
        (_, Fatal) => Some(Step::Done(Disposition::Error)),

        (Step::Plan, ToolCallsRequested) => Some(Step::Act),
        (Step::Plan, NoToolCalls) => Some(Step::Evaluate),

        (Step::Act, ToolsExecuted) => Some(Step::Evaluate),

        (Step::Evaluate, GoalAchieved) => Some(Step::Done(Disposition::Achieved)),
        (Step::Evaluate, BudgetExhausted) => Some(Step::Done(Disposition::Failed)),
        (Step::Evaluate, NeedsHuman) => Some(Step::HumanCheck),
        (Step::Evaluate, Continue) => Some(Step::Plan),

        (Step::HumanCheck, Approved) => Some(Step::Plan),
        (Step::HumanCheck, Rejected) => Some(Step::Done(Disposition::Aborted)),
        (Step::HumanCheck, BudgetExhausted) => Some(Step::Done(Disposition::Failed)),

        _ => None,
    }
}

/// Outcome of EVALUATE. Achievement is checked before the budget so an
/// achieved run never visits HUMAN_CHECK.
pub fn evaluate_transition(achieved: bool, budget_exhausted: bool, human_in_the_loop: bool) -> Transition {
    if achieved {
        Transition::GoalAchieved
    } else if budget_exhausted {
        Transition::BudgetExhausted
    } else if human_in_the_loop {
        Transition::NeedsHuman
    } else {
        Transition::Continue
    }
}
