//! Logging setup
//!
//! Library code only emits `tracing` events. Applications that want them on
//! the console call [`init`] once at startup.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::errors::KubewireError;

/// Environment variable that overrides the configured filter
pub const LOG_ENV_VAR: &str = "KUBEWIRE_LOG";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `warn` or `kubewire=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    /// Map a `-v` count to a filter
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => "warn",
            1 => "kubewire=info",
            2 => "kubewire=debug",
            _ => "kubewire=trace",
        };
        Self {
            level: level.to_string(),
            ..Default::default()
        }
    }

    /// Resolve the filter, letting `KUBEWIRE_LOG` win when set
    pub fn env_filter(&self) -> Result<EnvFilter, KubewireError> {
        match std::env::var(LOG_ENV_VAR) {
            Ok(directive) if !directive.trim().is_empty() => parse_filter(&directive),
            _ => parse_filter(&self.level),
        }
    }
}

fn parse_filter(directive: &str) -> Result<EnvFilter, KubewireError> {
    EnvFilter::try_new(directive)
        .map_err(|e| KubewireError::Config(format!("Invalid log filter '{}': {}", directive, e)))
}

/// Install a global subscriber writing to stderr
pub fn init(config: &LoggingConfig) -> Result<(), KubewireError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = match config.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| KubewireError::Config(format!("Failed to install log subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_verbosity() {
        assert_eq!(LoggingConfig::from_verbosity(0).level, "warn");
        assert_eq!(LoggingConfig::from_verbosity(2).level, "kubewire=debug");
        assert_eq!(LoggingConfig::from_verbosity(9).level, "kubewire=trace");
    }

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter("kubewire=debug,reqwest=warn").is_ok());
        assert!(parse_filter("info").is_ok());
    }

    #[test]
    fn test_format_deserializes_lowercase() {
        let config: LoggingConfig = serde_json::from_str(r#"{"level":"info","format":"json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
    }
}
