// Logger configuration
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoggerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for terminals
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
    /// Bunyan-compatible JSON
    Bunyan,
}

impl FromStr for LogFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "bunyan" => Ok(LogFormat::Bunyan),
            other => Err(LoggerError::Init(format!("Unknown log format: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub redaction_enabled: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub format: LogFormat,
    /// Also write daily-rotated files here when set
    pub log_directory: Option<PathBuf>,
    pub file_prefix: String,
    pub service_name: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            redaction_enabled: true,
            log_level: "info".to_string(),
            format: LogFormat::Pretty,
            log_directory: None,
            file_prefix: "clinical-assistant.log".to_string(),
            service_name: "clinical-assistant".to_string(),
        }
    }
}

impl LoggerConfig {
    /// Read `LOG_LEVEL`, `LOG_FORMAT`, `LOG_DIR` and `LOG_REDACTION`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redaction_enabled: std::env::var("LOG_REDACTION")
                .ok()
                .map_or(defaults.redaction_enabled, |v| {
                    !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "off" | "no")
                }),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            format: std::env::var("LOG_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.format),
            log_directory: std::env::var("LOG_DIR").ok().map(PathBuf::from),
            ..defaults
        }
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.log_level = level.to_string();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("bunyan".parse::<LogFormat>().unwrap(), LogFormat::Bunyan);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = LoggerConfig::default().with_level("debug");
        assert!(config.redaction_enabled);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
    }
}
