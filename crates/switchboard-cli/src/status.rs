//! `switchboard status`: show configuration, provider and hub status.

use anyhow::Result;
use colored::Colorize;

use switchboard_core::config::{get_config_path, load_config};
use switchboard_providers::PROVIDERS;

use crate::helpers::expand_tilde;

fn check(ok: bool, missing: &str) -> String {
    if ok {
        "✓".green().to_string()
    } else {
        missing.red().to_string()
    }
}

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();
    let net = &config.network;

    println!();
    println!("{}", "Switchboard Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        check(config_path.exists(), "(not found)")
    );

    let threads_dir = expand_tilde(&config.storage.threads_dir);
    println!(
        "  {:<18} {} {}",
        "Threads:".bold(),
        threads_dir.display(),
        check(threads_dir.exists(), "(not created yet)")
    );

    println!("  {:<18} {} ({})", "Network:".bold(), net.name, net.model);
    println!(
        "  {:<18} {} | {} | {}",
        "Parameters:".bold(),
        format!("max_iterations: {}", net.max_iterations).dimmed(),
        format!("max_tokens: {}", net.max_tokens).dimmed(),
        format!("timeout: {}s", net.run_timeout_secs).dimmed(),
    );

    println!();
    println!("  {}", "Agents:".bold());
    for agent in &config.agents {
        let marker = if net.default_agent.as_deref() == Some(agent.name.as_str()) {
            " (default)".dimmed().to_string()
        } else {
            String::new()
        };
        let tools = if agent.tools.is_empty() {
            "no tools".to_string()
        } else {
            agent.tools.join(", ")
        };
        println!("    {:<20} {}{}", agent.name, tools.dimmed(), marker);
    }

    println!();
    println!("  {}", "Providers:".bold());
    let providers_map = config.providers.to_map();
    for spec in PROVIDERS {
        let status = match providers_map.get(spec.name) {
            Some(prov_config) if prov_config.is_configured() => {
                format!("{} (key set)", "✓".green())
            }
            _ => format!("{}", "· not configured".dimmed()),
        };
        println!("    {:<20} {}", spec.display_name, status);
    }

    println!();
    let hub_status = if config.hub.is_configured() {
        format!(
            "{} {} (page limit {})",
            "✓".green(),
            config.hub.api_url,
            config.hub.page_limit
        )
    } else {
        format!("{}", "· not configured (order tools disabled)".dimmed())
    };
    println!("  {:<18} {}", "Order hub:".bold(), hub_status);
    println!();

    Ok(())
}
