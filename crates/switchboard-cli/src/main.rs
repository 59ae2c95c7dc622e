//! Switchboard CLI: entry point.
//!
//! # Commands
//!
//! - `switchboard run -m MESSAGE [--thread T] [--max-iterations N] [--stream] [--once]`
//! - `switchboard resume --thread T --confirm yes|no|JSON`
//! - `switchboard chat [--thread T]`: interactive REPL
//! - `switchboard threads`: list stored threads
//! - `switchboard status`: show configuration and provider status
//! - `switchboard onboard`: write a default config file

mod helpers;
mod onboard;
mod repl;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use switchboard_agent::{build_network, AgentNetwork, Confirmation, RunOptions};
use switchboard_core::config::{load_config, Config};
use switchboard_core::thread::{ConversationStore, JsonlThreadStore};
use switchboard_providers::create_provider;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Switchboard: route tasks across a network of agents, workflows and tools
#[derive(Parser)]
#[command(name = "switchboard", version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task through the network
    Run {
        /// The task to route
        #[arg(short, long)]
        message: String,

        /// Thread to continue (a new one is created when omitted)
        #[arg(short, long)]
        thread: Option<String>,

        /// Routing budget for this run (0 = unbounded)
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Print network events as they happen
        #[arg(long, default_value_t = false)]
        stream: bool,

        /// Route once and return that resource's output
        #[arg(long, default_value_t = false, conflicts_with = "stream")]
        once: bool,
    },

    /// Answer a suspended run
    Resume {
        #[arg(short, long)]
        thread: String,

        /// `yes`, `no`, or a JSON value
        #[arg(short, long)]
        confirm: String,
    },

    /// Interactive chat on one thread
    Chat {
        #[arg(short, long)]
        thread: Option<String>,
    },

    /// List stored threads
    Threads,

    /// Show configuration and provider status
    Status,

    /// Write a default configuration file
    Onboard,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs, cli.json_logs);

    match cli.command {
        Commands::Run {
            message,
            thread,
            max_iterations,
            stream,
            once,
        } => {
            let network = Arc::new(load_network()?);
            let opts = RunOptions {
                thread_id: thread,
                max_iterations,
                ..Default::default()
            };
            run_task(network, message, opts, stream, once).await
        }
        Commands::Resume { thread, confirm } => {
            let network = load_network()?;
            let outcome = network
                .resume(&thread, Confirmation::parse(&confirm))
                .await
                .with_context(|| format!("resuming thread '{thread}' failed"))?;
            helpers::print_outcome(&outcome);
            Ok(())
        }
        Commands::Chat { thread } => {
            let network = Arc::new(load_network()?);
            repl::run(network, thread).await
        }
        Commands::Threads => list_threads().await,
        Commands::Status => status::run(),
        Commands::Onboard => onboard::run(None),
    }
}

// ─────────────────────────────────────────────
// Run command
// ─────────────────────────────────────────────

async fn run_task(
    network: Arc<AgentNetwork>,
    message: String,
    opts: RunOptions,
    stream: bool,
    once: bool,
) -> Result<()> {
    info!(network = %network.name(), once, stream, "running task");

    let outcome = if once {
        network.generate(message, opts).await?
    } else if stream {
        let mut events = network.stream(message, opts);
        while let Some(event) = events.next().await {
            helpers::print_event(&event);
        }
        events.finish().await?
    } else {
        network.run(message, opts).await?
    };

    helpers::print_outcome(&outcome);
    Ok(())
}

async fn list_threads() -> Result<()> {
    let config = load_config(None);
    let store = open_store(&config)?;
    let threads = store.list_threads().await?;

    if threads.is_empty() {
        println!("{}", "(no threads)".dimmed());
        return Ok(());
    }
    for summary in threads {
        println!("{}", helpers::format_summary(&summary));
    }
    Ok(())
}

// ─────────────────────────────────────────────
// Assembly
// ─────────────────────────────────────────────

fn open_store(config: &Config) -> Result<Arc<dyn ConversationStore>> {
    let dir = helpers::expand_tilde(&config.storage.threads_dir);
    let store = JsonlThreadStore::new(Some(dir.clone()))
        .with_context(|| format!("failed to open thread store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

/// Build the agent network from the loaded configuration.
fn load_network() -> Result<AgentNetwork> {
    let config = load_config(None);
    let providers_map = config.providers.to_map();
    let provider = create_provider(&config.network.model, &providers_map)
        .map_err(|e| anyhow::anyhow!(e))?;
    let store = open_store(&config)?;

    build_network(&config, Arc::new(provider), store).context("failed to assemble the network")
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("switchboard=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
