//! Tracing subscriber setup.
//!
//! Retry decisions and client calls are reported through `tracing`; this
//! module installs the global subscriber that renders them.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "keyvault-sample".to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Build a config from `LOG_LEVEL` and `LOG_FORMAT` (`json` or `text`).
    #[must_use]
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let mut config = Self::default().with_service_name(service_name);
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }
        config.json_output = std::env::var("LOG_FORMAT")
            .is_ok_and(|format| format.eq_ignore_ascii_case("json"));
        config
    }

    /// Set the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Initialize tracing with the given configuration.
///
/// Should be called once at application startup. Returns `false` if a global
/// subscriber was already installed.
pub fn init_tracing(config: &TracingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let installed = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    }
    .is_ok();

    if installed {
        tracing::info!(service = %config.service_name, "Tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "keyvault-sample");
        assert_eq!(config.log_level, "info");
        assert!(!config.json_output);
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::default()
            .with_service_name("provisioner")
            .with_log_level("debug")
            .with_json_output();

        assert_eq!(config.service_name, "provisioner");
        assert_eq!(config.log_level, "debug");
        assert!(config.json_output);
    }

    #[test]
    fn test_second_init_is_rejected() {
        let config = TracingConfig::default().with_log_level("warn");
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
