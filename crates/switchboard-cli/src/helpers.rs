//! Shared CLI helpers: path expansion, outcome and event printing, banner.

use std::path::PathBuf;

use colored::Colorize;

use switchboard_agent::NetworkEvent;
use switchboard_core::thread::ThreadSummary;
use switchboard_core::types::{RunOutcome, RunStatus};
use switchboard_core::utils::truncate_string;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Print the outcome of a run or resume.
pub fn print_outcome(outcome: &RunOutcome) {
    println!();
    println!("{}", "Switchboard".cyan().bold());
    if outcome.result.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", outcome.result);
    }
    println!();
    println!("{}", outcome_footer(outcome).dimmed());
    if let RunStatus::Waiting { .. } = outcome.status {
        println!(
            "{}",
            format!(
                "Reply with `switchboard resume --thread {} --confirm yes|no`",
                outcome.thread_id
            )
            .yellow()
        );
    }
    println!();
}

/// One-line summary: thread, status, iterations, last resource.
pub fn outcome_footer(outcome: &RunOutcome) -> String {
    let status = match &outcome.status {
        RunStatus::Completed => "completed".to_string(),
        RunStatus::BudgetExhausted => "budget exhausted".to_string(),
        RunStatus::Waiting { run_id, .. } => format!("waiting (run {run_id})"),
    };
    let mut footer = format!(
        "thread {} · {status} · {} iteration(s)",
        outcome.thread_id, outcome.iterations
    );
    if !outcome.resource_id.is_empty() {
        footer.push_str(&format!(" · last: {}", outcome.resource_id));
    }
    footer
}

/// Print one streamed network event.
pub fn print_event(event: &NetworkEvent) {
    match event {
        NetworkEvent::RoutingSelected {
            iteration,
            resource_id,
            resource_type,
            selection_reason,
            ..
        } => {
            println!(
                "{} {} {} {}",
                format!("[{iteration}]").dimmed(),
                "→".cyan(),
                format!("{resource_type} {resource_id}").bold(),
                truncate_string(selection_reason, 100).dimmed()
            );
        }
        NetworkEvent::ResourceOutputDelta { delta, .. } => {
            println!("    {}", truncate_string(delta, 200));
        }
        NetworkEvent::ResourceFinished { resource_id, .. } => {
            println!("    {} {}", "✓".green(), resource_id.dimmed());
        }
        NetworkEvent::ResourceSuspended { resource_id, run_id, .. } => {
            println!(
                "    {} {} waits for confirmation (run {run_id})",
                "⏸".yellow(),
                resource_id
            );
        }
        NetworkEvent::LoopComplete { .. } => {}
    }
}

/// Row of `switchboard threads`.
pub fn format_summary(summary: &ThreadSummary) -> String {
    let pending = if summary.pending { " [pending]" } else { "" };
    format!(
        "{:<38} {:>4} msgs  {}  {}{pending}",
        summary.id,
        summary.message_count,
        summary.updated_at.format("%Y-%m-%d %H:%M"),
        summary.resource_id
    )
}

/// Print the banner shown at REPL start.
pub fn print_banner(thread_id: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Switchboard".cyan().bold(), version.dimmed());
    println!("{}", format!("thread {thread_id}").dimmed());
    println!(
        "{}",
        "Type a task, /new for a fresh thread, /cancel to drop a pending confirmation, or \"exit\" to quit."
            .dimmed()
    );
    println!();
}

/// Print a "thinking" placeholder (for non-log mode).
pub fn print_thinking() {
    eprint!("{}", "⠿ routing...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
