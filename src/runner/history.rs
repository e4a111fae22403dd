//! Conversation windowing and status turns

use crate::domain::{ConversationEntry, Role, RunState};

/// Bound the history sent to the reasoner: the first (system) entry plus the
/// last `window - 1` entries. The kept tail always opens on a user turn;
/// assistant and tool entries ahead of it lost their context to the trim and
/// are dropped as well.
pub fn trim_window(messages: &[ConversationEntry], window: usize) -> Vec<ConversationEntry> {
    let window = window.max(2);
    if messages.len() <= window {
        return messages.to_vec();
    }

    let start = messages.len() - (window - 1);
    let tail = &messages[start..];
    let mut kept = Vec::with_capacity(window);
    kept.push(messages[0].clone());

    match tail.iter().position(|entry| entry.role == Role::User) {
        Some(first_user) => kept.extend_from_slice(&tail[first_user..]),
        None => {
            // No user turn left in the window: fall back to the latest one before it
            if let Some(user) = messages[1..start].iter().rev().find(|e| e.role == Role::User) {
                kept.push(user.clone());
            }
        }
    }
    kept
}

/// User turn appended after every evaluation
pub fn status_message(state: &RunState, reason: &str) -> String {
    let header = format!(
        "[Iteration {}/{} | Tokens: {}]",
        state.iteration,
        state.max_iterations,
        state.total_tokens()
    );

    if state.goal_achieved {
        format!("{} ✅ Goal ACHIEVED! {}", header, reason)
    } else if state.budget_exhausted() {
        format!("{} ⛔ Max iterations reached. Final status: {}", header, reason)
    } else {
        format!(
            "{} Goal NOT YET achieved. {}\n\nYou have {} iterations remaining. Keep working toward the goal.",
            header,
            reason,
            state.remaining_iterations()
        )
    }
}
