//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, StormConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/barnstorm/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("barnstorm/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("barnstorm.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and lay its values over `config`.
///
/// Keys missing from the file keep whatever `config` already had, so files
/// can be applied one after another.
pub fn apply_file(config: &mut StormConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Lay values from a TOML string over `config`.
pub fn apply_toml(config: &mut StormConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Some(backend) = table.get("backend").and_then(|v| v.as_table()) {
        if let Some(v) = backend.get("base_url").and_then(|v| v.as_str()) {
            config.backend.base_url = v.to_string();
        }
        if let Some(v) = backend.get("timeout_ms").and_then(|v| v.as_integer()) {
            config.backend.timeout_ms = non_negative(v, "backend.timeout_ms", path)?;
        }
    }

    if let Some(polling) = table.get("polling").and_then(|v| v.as_table()) {
        if let Some(v) = polling.get("first_delay_ms").and_then(|v| v.as_integer()) {
            config.polling.first_delay_ms = non_negative(v, "polling.first_delay_ms", path)?;
        }
        if let Some(v) = polling.get("jitter_min_ms").and_then(|v| v.as_integer()) {
            config.polling.jitter_min_ms = non_negative(v, "polling.jitter_min_ms", path)?;
        }
        if let Some(v) = polling.get("jitter_max_ms").and_then(|v| v.as_integer()) {
            config.polling.jitter_max_ms = non_negative(v, "polling.jitter_max_ms", path)?;
        }
    }

    if let Some(defaults) = table.get("defaults").and_then(|v| v.as_table()) {
        if let Some(v) = defaults.get("n_midi").and_then(|v| v.as_integer()) {
            config.defaults.n_midi = non_negative(v, "defaults.n_midi", path)? as u32;
        }
        if let Some(v) = defaults.get("beats_per_chord").and_then(|v| v.as_integer()) {
            config.defaults.beats_per_chord = non_negative(v, "defaults.beats_per_chord", path)? as u32;
        }
        if let Some(v) = defaults.get("instrument").and_then(|v| v.as_str()) {
            config.defaults.instrument = v.to_string();
        }
        if let Some(alphas) = defaults.get("mix_alphas").and_then(|v| v.as_array()) {
            config.defaults.mix_alphas = alphas.iter().filter_map(as_number).collect();
        }
        if let Some(v) = defaults.get("bpm").and_then(as_number) {
            config.defaults.bpm = v;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.telemetry.otlp_endpoint = v.to_string();
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    Ok(())
}

/// TOML writes `120` and `120.0` differently; accept both.
fn as_number(value: &toml::Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|i| i as f64))
}

fn non_negative(value: i64, key: &str, path: &Path) -> Result<u64, ConfigError> {
    u64::try_from(value).map_err(|_| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("{key} must not be negative (got {value})"),
    })
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut StormConfig, sources: &mut ConfigSources) {
    apply_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from any key lookup. Later keys in the list win.
pub fn apply_overrides_from<F>(config: &mut StormConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("BARNSTORM_BACKEND_URL") {
        config.backend.base_url = v;
        sources.env_overrides.push("BARNSTORM_BACKEND_URL".to_string());
    }
    if let Some(v) = lookup("BARNSTORM_TIMEOUT_MS") {
        if let Ok(ms) = v.parse() {
            config.backend.timeout_ms = ms;
            sources.env_overrides.push("BARNSTORM_TIMEOUT_MS".to_string());
        }
    }

    if let Some(v) = lookup("BARNSTORM_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("BARNSTORM_OTLP_ENDPOINT".to_string());
    }
    // Standard OTEL variable
    if let Some(v) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("OTEL_EXPORTER_OTLP_ENDPOINT".to_string());
    }
    if let Some(v) = lookup("BARNSTORM_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("BARNSTORM_LOG_LEVEL".to_string());
    }
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}
