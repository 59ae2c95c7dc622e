//! Interactive REPL over one thread.
//!
//! Uses `rustyline` for readline-style editing with persistent history.
//! When the thread has a suspended run, the next line answers it.

use std::sync::Arc;

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use switchboard_agent::{AgentNetwork, Confirmation, RunOptions};

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// What one line of input asks for.
#[derive(Debug, PartialEq)]
enum Input<'a> {
    Exit,
    NewThread,
    Cancel,
    Text(&'a str),
}

fn classify(line: &str) -> Input<'_> {
    let lower = line.to_lowercase();
    if EXIT_COMMANDS.contains(&lower.as_str()) {
        Input::Exit
    } else if lower == "/new" {
        Input::NewThread
    } else if lower == "/cancel" {
        Input::Cancel
    } else {
        Input::Text(line)
    }
}

/// Run the interactive REPL loop.
pub async fn run(network: Arc<AgentNetwork>, thread: Option<String>) -> Result<()> {
    let mut thread_id = thread.unwrap_or_else(fresh_thread_id);
    helpers::print_banner(&thread_id);

    let mut editor = create_editor()?;

    loop {
        let pending = network.pending(&thread_id).await?;
        let prompt = if pending.is_some() { "Confirm: " } else { "You: " };

        let input = match editor.readline(prompt) {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(&input);

        let result = match classify(trimmed) {
            Input::Exit => {
                println!("\nGoodbye!");
                break;
            }
            Input::NewThread => {
                thread_id = fresh_thread_id();
                println!("started thread {thread_id}\n");
                continue;
            }
            Input::Cancel => {
                match network.cancel_pending(&thread_id).await? {
                    Some(handle) => println!("discarded pending run {}\n", handle.run_id),
                    None => println!("nothing to cancel\n"),
                }
                continue;
            }
            Input::Text(text) if pending.is_some() => {
                debug!(thread = %thread_id, "answering suspended run");
                helpers::print_thinking();
                network.resume(&thread_id, Confirmation::parse(text)).await
            }
            Input::Text(text) => {
                debug!(thread = %thread_id, input = text, "running task");
                helpers::print_thinking();
                network.run(text, RunOptions::thread(&thread_id)).await
            }
        };

        helpers::clear_thinking();
        match result {
            Ok(outcome) => helpers::print_outcome(&outcome),
            Err(e) => eprintln!("\nError: {e}\n"),
        }
    }

    save_history(&mut editor);
    Ok(())
}

/// Thread id for a new REPL conversation.
fn fresh_thread_id() -> String {
    format!("chat-{}", uuid::Uuid::new_v4())
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// Path to the history file.
fn history_path() -> std::path::PathBuf {
    switchboard_core::utils::get_data_path()
        .join("history")
        .join("cli_history")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
