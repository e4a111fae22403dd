//! Stuck-pattern reflection
//!
//! A run that fails its goal check the same way evaluation after evaluation is
//! usually repeating one approach. Once the failure streak reaches
//! [`REFLECT_AFTER_FAILURES`] and the last two failure reasons mostly share
//! their words, the run gets an extra user turn telling the reasoner to change
//! strategy, listing the failures that already triggered a shift.

use std::collections::HashSet;

use crate::domain::RunState;

/// Failure streak at which reflection starts
pub const REFLECT_AFTER_FAILURES: u32 = 2;

/// Word overlap above which two failures count as the same failure
pub const STUCK_SIMILARITY: f64 = 0.6;

const MAX_FAILED_STRATEGIES: usize = 10;
const STRATEGY_SUMMARY_CHARS: usize = 200;
const LISTED_STRATEGIES: usize = 5;
const LISTED_STRATEGY_CHARS: usize = 150;

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn words(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Jaccard similarity of the lowercase word sets
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = words(a);
    let b = words(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let all = a.union(&b).count();
    shared as f64 / all as f64
}

pub fn is_stuck(previous: &str, current: &str) -> bool {
    similarity(previous, current) > STUCK_SIMILARITY
}

/// Count an evaluation toward the failure streak
pub fn record_outcome(state: &mut RunState, achieved: bool) {
    if achieved {
        state.consecutive_failures = 0;
    } else {
        state.consecutive_failures += 1;
    }
}

/// Strategy-shift turn for a run that keeps failing the same way.
///
/// `None` until the streak reaches [`REFLECT_AFTER_FAILURES`] or when `reason`
/// differs enough from `previous`. A triggered shift remembers `reason` in
/// `failed_strategies` (last ten kept).
pub fn strategy_shift(state: &mut RunState, previous: &str, reason: &str) -> Option<String> {
    if state.consecutive_failures < REFLECT_AFTER_FAILURES || !is_stuck(previous, reason) {
        return None;
    }

    let message = reflection_message(state.consecutive_failures, &state.failed_strategies);

    let summary = clip(reason, STRATEGY_SUMMARY_CHARS);
    if !state.failed_strategies.contains(&summary) {
        state.failed_strategies.push(summary);
    }
    let excess = state.failed_strategies.len().saturating_sub(MAX_FAILED_STRATEGIES);
    state.failed_strategies.drain(..excess);

    Some(message)
}

fn reflection_message(failures: u32, failed_strategies: &[String]) -> String {
    let mut message = format!(
        "🔄 REFLECTION (after {} consecutive failures)\n\n\
         Your recent attempts have not succeeded and the failure is not changing. \
         Before trying again, stop and work out:\n\
         1. What is the actual root cause of the failure?\n\
         2. Why did the previous approach not fix it?\n\
         3. What different approach could?",
        failures
    );

    if !failed_strategies.is_empty() {
        message.push_str("\n\nPreviously failed approaches (do not repeat these):");
        let start = failed_strategies.len().saturating_sub(LISTED_STRATEGIES);
        for strategy in &failed_strategies[start..] {
            message.push_str(&format!("\n- {}", clip(strategy, LISTED_STRATEGY_CHARS)));
        }
    }

    if failures >= 5 {
        message.push_str(&format!(
            "\n\n⚠️ You have failed {} times in a row. Take a completely different approach:\n\
             - Rewrite the whole function instead of patching it\n\
             - Re-read what the failing check expects; it may encode something you missed\n\
             - Read the entire file or module before editing again",
            failures
        ));
    } else if failures >= 3 {
        message.push_str(
            "\n\n⚡ Strategy shift required. Try something fundamentally different:\n\
             - Search the project more broadly with `grep`\n\
             - Read the callers and callees of the failing code\n\
             - Try a simpler, more direct fix\n\
             - Check for a different root cause than the one you assumed",
        );
    }

    message.push_str("\n\nReason step by step about a new strategy, then carry it out.");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunConfig;

    fn state() -> RunState {
        RunState::new("run-1", &RunConfig::new("pytest", "/work"), "sys")
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("a b c", "A B C"), 1.0);
        assert_eq!(similarity("a b", "c d"), 0.0);
        assert_eq!(similarity("", "a"), 0.0);
        assert!((similarity("a b c d", "a b c e") - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_is_stuck_needs_more_than_sixty_percent() {
        assert!(is_stuck(
            "`pytest` failed with exit code 1: 2 failed in test_math.py",
            "`pytest` failed with exit code 1: 2 failed in test_math.py"
        ));
        // Exactly 0.6 is not enough
        assert!(!is_stuck("a b c d", "a b c e"));
        assert!(!is_stuck("cannot find module foo", "syntax error near line 12"));
    }

    #[test]
    fn test_record_outcome_streak() {
        let mut state = state();
        record_outcome(&mut state, false);
        record_outcome(&mut state, false);
        assert_eq!(state.consecutive_failures, 2);
        record_outcome(&mut state, true);
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_no_shift_below_threshold() {
        let mut state = state();
        state.consecutive_failures = 1;
        assert!(strategy_shift(&mut state, "2 failed", "2 failed").is_none());
        assert!(state.failed_strategies.is_empty());
    }

    #[test]
    fn test_no_shift_when_failure_changes() {
        let mut state = state();
        state.consecutive_failures = 4;
        assert!(strategy_shift(&mut state, "ImportError: no module named foo", "AssertionError in test_add").is_none());
    }

    #[test]
    fn test_shift_when_stuck() {
        let mut state = state();
        state.consecutive_failures = 2;
        let message = strategy_shift(&mut state, "2 tests failed", "2 tests failed").unwrap();
        assert!(message.contains("after 2 consecutive failures"));
        assert!(!message.contains("Previously failed approaches"));
        assert_eq!(state.failed_strategies, vec!["2 tests failed"]);

        // The remembered failure shows up next time, once
        state.consecutive_failures = 3;
        let message = strategy_shift(&mut state, "2 tests failed", "2 tests failed").unwrap();
        assert!(message.contains("- 2 tests failed"));
        assert!(message.contains("Strategy shift required"));
        assert_eq!(state.failed_strategies.len(), 1);
    }

    #[test]
    fn test_escalation_after_five_failures() {
        let mut state = state();
        state.consecutive_failures = 5;
        let message = strategy_shift(&mut state, "same failure", "same failure").unwrap();
        assert!(message.contains("failed 5 times in a row"));
        assert!(!message.contains("Strategy shift required"));
    }

    #[test]
    fn test_failed_strategies_bounded() {
        let mut state = state();
        state.consecutive_failures = 2;
        for n in 0..15 {
            let reason = format!("case {n} failed");
            strategy_shift(&mut state, &reason, &reason).unwrap();
        }
        assert_eq!(state.failed_strategies.len(), 10);
        assert_eq!(state.failed_strategies[0], "case 5 failed");
        assert_eq!(state.failed_strategies[9], "case 14 failed");
    }
}
