//! Terminal rendering of run events and stored runs

use colored::*;
use serde_json::Value;

use goalrun::events::{AgentEvent, EventKind};
use goalrun::storage::{Checkpoint, RunRecord};

const ARGS_CHARS: usize = 120;

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn str_field<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or("")
}

fn u64_field(payload: &Value, key: &str) -> u64 {
    payload.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn bool_field(payload: &Value, key: &str) -> bool {
    payload.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// One line per event. Step boundaries and token usage only show up in
/// verbose mode.
pub fn render_event(event: &AgentEvent, verbose: bool) -> Option<String> {
    let p = &event.payload;
    let line = match event.kind {
        EventKind::StepStart if verbose => format!("[{}] {}", event.iteration, str_field(p, "node"))
            .dimmed()
            .to_string(),
        EventKind::LlmUsage if verbose => format!(
            "tokens +{} ({} in / {} out)",
            u64_field(p, "total_tokens"),
            u64_field(p, "prompt_tokens"),
            u64_field(p, "completion_tokens")
        )
        .dimmed()
        .to_string(),
        EventKind::StepStart | EventKind::LlmUsage => return None,
        EventKind::ToolCall => {
            let args = p.get("args").map(|a| a.to_string()).unwrap_or_default();
            format!("{} {} {}", "→".cyan(), str_field(p, "tool").cyan().bold(), clip(&args, ARGS_CHARS))
        }
        EventKind::ToolResult => {
            let summary = clip(first_line(str_field(p, "content")), ARGS_CHARS);
            if bool_field(p, "error") {
                format!("  {} {}: {}", "✗".red(), str_field(p, "tool"), summary.red())
            } else {
                format!("  {} {}: {}", "✓".green(), str_field(p, "tool"), summary)
            }
        }
        EventKind::GoalCheck => {
            let reason = first_line(str_field(p, "reason"));
            if bool_field(p, "achieved") {
                format!("{} {}", "goal achieved:".green().bold(), reason)
            } else {
                format!("{} {}", "goal not met:".yellow(), reason)
            }
        }
        EventKind::IterationComplete => format!("── iteration {} complete ──", u64_field(p, "iteration"))
            .dimmed()
            .to_string(),
        EventKind::HumanCheckRequired => format!(
            "{} {}",
            "human check required:".yellow().bold(),
            first_line(str_field(p, "reason"))
        ),
        EventKind::HumanCheckResponse => format!("human decision: {}", str_field(p, "decision").bold()),
        EventKind::RunEnd => {
            let status = str_field(p, "status");
            let label = format!("run {}", status);
            let label = match status {
                "achieved" => label.green().bold(),
                "aborted" => label.yellow().bold(),
                _ => label.red().bold(),
            };
            format!(
                "{}: {} ({} iterations, {} tokens)",
                label,
                first_line(str_field(p, "reason")),
                u64_field(p, "iterations"),
                u64_field(p, "total_tokens")
            )
        }
        EventKind::Error => format!(
            "{} {}",
            format!("error in {}:", str_field(p, "source")).red().bold(),
            str_field(p, "error")
        ),
        EventKind::Log => str_field(p, "message").to_string(),
    };
    Some(line)
}

pub fn render_record(record: &RunRecord) -> String {
    format!(
        "{}  {:<10} {:<12} {:>3} it  {:>8} tok  ${:.4}  {}",
        record.finished_at.format("%Y-%m-%d %H:%M"),
        record.status.as_str(),
        record.goal,
        record.iterations,
        record.total_tokens,
        record.cost_usd,
        record.run_id
    )
}

pub fn render_checkpoint(checkpoint: &Checkpoint) -> String {
    format!(
        "{}  {:<12} iteration {}/{}  {}  {}",
        checkpoint.run_id.bold(),
        checkpoint.config.goal,
        checkpoint.state.iteration,
        checkpoint.state.max_iterations,
        checkpoint.config.cwd.display(),
        first_line(&checkpoint.state.goal_reason).dimmed()
    )
}
