//! Config loader: reads `~/.switchboard/config.json`, merges env vars, and
//! normalizes the older keyed `agents` layout.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.switchboard/config.json`
//! 3. Environment variables `SWITCHBOARD_<SECTION>__<FIELD>` and the
//!    `HUB_API_URL` / `HUB_USER_EMAIL` / `HUB_USER_PASSWORD` triple (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Rewrite `"agents": {"<name>": {...}}` into the list form.
///
/// The map key fills `name` unless the entry carries its own.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(agents) = raw.get_mut("agents") else {
        return;
    };
    let Some(map) = agents.as_object() else {
        return;
    };

    let list: Vec<serde_json::Value> = map
        .iter()
        .map(|(name, spec)| {
            let mut spec = spec.clone();
            if let Some(obj) = spec.as_object_mut() {
                obj.entry("name")
                    .or_insert_with(|| serde_json::Value::String(name.clone()));
            }
            spec
        })
        .collect();

    debug!("Migrated {} keyed agents to list form", list.len());
    *agents = serde_json::Value::Array(list);
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `SWITCHBOARD_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `SWITCHBOARD_NETWORK__MODEL` → `network.model`
/// - `SWITCHBOARD_NETWORK__MAX_ITERATIONS` → `network.max_iterations`
/// - `SWITCHBOARD_NETWORK__MAX_TOKENS` → `network.max_tokens`
/// - `SWITCHBOARD_NETWORK__TEMPERATURE` → `network.temperature`
/// - `SWITCHBOARD_NETWORK__RUN_TIMEOUT_SECS` → `network.run_timeout_secs`
/// - `SWITCHBOARD_PROVIDERS__<NAME>__API_KEY` → `providers.<name>.api_key`
/// - `SWITCHBOARD_PROVIDERS__<NAME>__API_BASE` → `providers.<name>.api_base`
/// - `SWITCHBOARD_STORAGE__THREADS_DIR` → `storage.threads_dir`
/// - `HUB_API_URL`, `HUB_USER_EMAIL`, `HUB_USER_PASSWORD` → `hub.*`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("SWITCHBOARD_NETWORK__MODEL") {
        config.network.model = val;
    }
    if let Ok(val) = std::env::var("SWITCHBOARD_NETWORK__MAX_ITERATIONS") {
        if let Ok(n) = val.parse::<u32>() {
            config.network.max_iterations = n;
        }
    }
    if let Ok(val) = std::env::var("SWITCHBOARD_NETWORK__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.network.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("SWITCHBOARD_NETWORK__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.network.temperature = t;
        }
    }
    if let Ok(val) = std::env::var("SWITCHBOARD_NETWORK__RUN_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.network.run_timeout_secs = n;
        }
    }

    for (name, provider) in config.providers.entries_mut() {
        let upper = name.to_uppercase();
        if let Ok(val) = std::env::var(format!("SWITCHBOARD_PROVIDERS__{upper}__API_KEY")) {
            provider.api_key = val;
        }
        if let Ok(val) = std::env::var(format!("SWITCHBOARD_PROVIDERS__{upper}__API_BASE")) {
            provider.api_base = Some(val);
        }
    }

    if let Ok(val) = std::env::var("SWITCHBOARD_STORAGE__THREADS_DIR") {
        config.storage.threads_dir = val;
    }

    if let Ok(val) = std::env::var("HUB_API_URL") {
        config.hub.api_url = val;
    }
    if let Ok(val) = std::env::var("HUB_USER_EMAIL") {
        config.hub.user_email = val;
    }
    if let Ok(val) = std::env::var("HUB_USER_PASSWORD") {
        config.hub.user_password = val;
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
