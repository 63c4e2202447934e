//! Configuration loading for barnstorm.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/barnstorm/config.toml` (system)
//! 2. `~/.config/barnstorm/config.toml` (user)
//! 3. `./barnstorm.toml`, or the `--config` path when given
//! 4. Environment variables (`BARNSTORM_*`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [backend]
//! base_url = "http://127.0.0.1:8000/"
//! timeout_ms = 30000
//!
//! [polling]
//! first_delay_ms = 200
//! jitter_min_ms = 700
//! jitter_max_ms = 1300
//!
//! [defaults]
//! n_midi = 5
//! beats_per_chord = 4
//! instrument = "piano"
//! mix_alphas = [0, 0.25, 0.5, 0.75, 1]
//! bpm = 120
//!
//! [telemetry]
//! otlp_endpoint = ""
//! log_level = "info"
//! ```

pub mod defaults;
pub mod infra;
pub mod loader;

pub use defaults::DefaultsConfig;
pub use infra::{BackendConfig, PollingConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete barnstorm configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StormConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl StormConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load with an explicit file taking the place of `./barnstorm.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(config_path);
        let (mut config, mut sources) = Self::load_files(&files)?;
        loader::apply_env_overrides(&mut config, &mut sources);
        config.validate()?;
        Ok((config, sources))
    }

    /// Layer the given files over the compiled defaults, without env overrides.
    pub fn load_files(files: &[PathBuf]) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = StormConfig::default();

        for path in files {
            loader::apply_file(&mut config, path)?;
            sources.files.push(path.clone());
        }

        Ok((config, sources))
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("backend.base_url is empty".to_string()));
        }
        if self.polling.jitter_max_ms < self.polling.jitter_min_ms {
            return Err(ConfigError::Invalid(format!(
                "polling.jitter_max_ms ({}) is below polling.jitter_min_ms ({})",
                self.polling.jitter_max_ms, self.polling.jitter_min_ms
            )));
        }
        if self.defaults.n_midi == 0 {
            return Err(ConfigError::Invalid("defaults.n_midi must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        // Built by hand so the output carries comments
        let mut output = String::new();

        output.push_str("# barnstorm configuration\n\n");

        output.push_str("[backend]\n");
        output.push_str(&format!("base_url = \"{}\"\n", self.backend.base_url));
        output.push_str(&format!("timeout_ms = {}\n", self.backend.timeout_ms));

        output.push_str("\n[polling]\n");
        output.push_str(&format!("first_delay_ms = {}\n", self.polling.first_delay_ms));
        output.push_str("# later checks wait a uniform delay in [jitter_min_ms, jitter_max_ms)\n");
        output.push_str(&format!("jitter_min_ms = {}\n", self.polling.jitter_min_ms));
        output.push_str(&format!("jitter_max_ms = {}\n", self.polling.jitter_max_ms));

        output.push_str("\n[defaults]\n");
        output.push_str(&format!("n_midi = {}\n", self.defaults.n_midi));
        output.push_str(&format!("beats_per_chord = {}\n", self.defaults.beats_per_chord));
        output.push_str(&format!("instrument = \"{}\"\n", self.defaults.instrument));
        let alphas: Vec<String> = self.defaults.mix_alphas.iter().map(|a| a.to_string()).collect();
        output.push_str(&format!("mix_alphas = [{}]\n", alphas.join(", ")));
        output.push_str(&format!("bpm = {}\n", self.defaults.bpm));

        output.push_str("\n[telemetry]\n");
        output.push_str("# empty disables OTLP export\n");
        output.push_str(&format!("otlp_endpoint = \"{}\"\n", self.telemetry.otlp_endpoint));
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = StormConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.defaults.n_midi, 5);
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = StormConfig::default();
        config.backend.base_url = "http://gpu:9000/".to_string();
        config.defaults.mix_alphas = vec![0.0, 0.5, 1.0];

        let rendered = config.to_toml();
        assert!(rendered.contains("[polling]"));

        let mut reparsed = StormConfig::default();
        loader::apply_toml(&mut reparsed, &rendered, Path::new("rendered.toml")).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_later_files_win() {
        let mut system = tempfile::NamedTempFile::new().unwrap();
        writeln!(system, "[backend]\nbase_url = \"http://a/\"\ntimeout_ms = 1000").unwrap();
        let mut local = tempfile::NamedTempFile::new().unwrap();
        writeln!(local, "[backend]\nbase_url = \"http://b/\"").unwrap();

        let files = vec![system.path().to_path_buf(), local.path().to_path_buf()];
        let (config, sources) = StormConfig::load_files(&files).unwrap();

        assert_eq!(config.backend.base_url, "http://b/");
        assert_eq!(config.backend.timeout_ms, 1000);
        assert_eq!(sources.files, files);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = StormConfig::load_files(&[PathBuf::from("/nonexistent/barnstorm.toml")]).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }

    #[test]
    fn test_validate_rejects_inverted_jitter() {
        let mut config = StormConfig::default();
        config.polling.jitter_min_ms = 2000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_url_and_zero_n_midi() {
        let mut config = StormConfig::default();
        config.backend.base_url = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = StormConfig::default();
        config.defaults.n_midi = 0;
        assert!(config.validate().is_err());
    }
}
