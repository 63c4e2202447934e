//! Connection, polling and telemetry settings. Fixed for the life of a process.

use serde::{Deserialize, Serialize};

/// Generation backend connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the generation service. A trailing slash is optional.
    /// Default: http://127.0.0.1:8000/
    #[serde(default = "BackendConfig::default_base_url")]
    pub base_url: String,

    /// Per-request HTTP timeout in milliseconds.
    /// A timed-out poll counts as a transient failure and is retried.
    /// Default: 30000
    #[serde(default = "BackendConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl BackendConfig {
    fn default_base_url() -> String {
        "http://127.0.0.1:8000/".to_string()
    }

    fn default_timeout_ms() -> u64 {
        30_000
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

/// Task status polling cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay before the first status check.
    /// Default: 200
    #[serde(default = "PollingConfig::default_first_delay_ms")]
    pub first_delay_ms: u64,

    /// Lower bound (inclusive) of the delay between later checks.
    /// Default: 700
    #[serde(default = "PollingConfig::default_jitter_min_ms")]
    pub jitter_min_ms: u64,

    /// Upper bound (exclusive) of the delay between later checks.
    /// Default: 1300
    #[serde(default = "PollingConfig::default_jitter_max_ms")]
    pub jitter_max_ms: u64,
}

impl PollingConfig {
    fn default_first_delay_ms() -> u64 {
        200
    }

    fn default_jitter_min_ms() -> u64 {
        700
    }

    fn default_jitter_max_ms() -> u64 {
        1300
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            first_delay_ms: Self::default_first_delay_ms(),
            jitter_min_ms: Self::default_jitter_min_ms(),
            jitter_max_ms: Self::default_jitter_max_ms(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry. Empty disables export.
    /// Default: ""
    #[serde(default)]
    pub otlp_endpoint: String,

    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    pub fn otlp_enabled(&self) -> bool {
        !self.otlp_endpoint.trim().is_empty()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: String::new(),
            log_level: Self::default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_defaults() {
        let backend = BackendConfig::default();
        assert_eq!(backend.base_url, "http://127.0.0.1:8000/");
        assert_eq!(backend.timeout_ms, 30_000);
    }

    #[test]
    fn test_polling_defaults() {
        let polling = PollingConfig::default();
        assert_eq!(polling.first_delay_ms, 200);
        assert_eq!(polling.jitter_min_ms, 700);
        assert_eq!(polling.jitter_max_ms, 1300);
    }

    #[test]
    fn test_telemetry_defaults() {
        let telemetry = TelemetryConfig::default();
        assert!(!telemetry.otlp_enabled());
        assert_eq!(telemetry.log_level, "info");
    }
}
