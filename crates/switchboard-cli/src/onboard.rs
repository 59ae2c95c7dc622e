//! `switchboard onboard`: write a default configuration and data directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use switchboard_core::config::{get_config_path, load_config, save_config};
use switchboard_core::utils::get_data_path;

use crate::helpers::expand_tilde;

/// Run the onboard command. `config_path` overrides the default location.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    println!();
    println!("{}", "Switchboard setup".cyan().bold());
    println!();

    let config_path: PathBuf = config_path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    let created = write_default_config(&config_path)?;
    let verb = if created { "created" } else { "config already exists at" };
    println!("  {} {} {}", "✓".green(), verb, config_path.display());

    let config = load_config(Some(&config_path));
    let threads_dir = expand_tilde(&config.storage.threads_dir);
    std::fs::create_dir_all(&threads_dir)
        .with_context(|| format!("failed to create {}", threads_dir.display()))?;
    println!("  {} threads at {}", "✓".green(), threads_dir.display());

    let history_dir = get_data_path().join("history");
    std::fs::create_dir_all(&history_dir)?;

    println!();
    if !config.hub.is_configured() {
        println!(
            "  {}",
            "Set HUB_API_URL, HUB_USER_EMAIL and HUB_USER_PASSWORD to enable the order tools."
                .yellow()
        );
    }
    println!(
        "{}",
        "  Setup complete! Run `switchboard chat` to start.".green()
    );
    println!();

    Ok(())
}

/// Write the default config unless a file exists. Returns whether it wrote.
fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let config = load_config(Some(path));
    save_config(&config, Some(path))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
