//! Logging for the clinical assistant with PHI redaction
//!
//! Transcripts and generated notes are protected health information. Anything
//! derived from them must pass through [`redact`] (or a [`PhiRedactor`])
//! before it is handed to `tracing`.
//!
//! # Detected Data Types
//!
//! - **Email Addresses**: jane@example.com → EMAIL[hash] or ***@***
//! - **Phone Numbers**: 0412 345 678, (555) 123-4567 → PHONE[hash]
//! - **Medicare Numbers**: 2123 45670 1 → MEDICARE[hash]
//! - **Medical Record Numbers**: MRN 00123456 → MRN[hash]
//! - **Dates of Birth**: DOB: 03/07/1985 → DOB[hash]
//! - **Custom Patterns**: organization-specific regexes
//!
//! # Example
//!
//! ```no_run
//! use logger_redacted::{init, redact, LoggerConfig, LogFormat};
//!
//! let _guard = init(&LoggerConfig::default().with_format(LogFormat::Bunyan))?;
//! tracing::info!(excerpt = %redact("Patient DOB: 03/07/1985"), "Loaded transcript");
//! # Ok::<(), logger_redacted::LoggerError>(())
//! ```

pub mod config;
pub mod error;
pub mod redactor;

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub use config::{LogFormat, LoggerConfig};
pub use error::{LoggerError, LoggerResult};
pub use redactor::{PhiRedactor, RedactionConfig};

struct InstalledRedactor {
    config: RedactionConfig,
    redactor: Option<PhiRedactor>,
}

static REDACTOR: OnceLock<InstalledRedactor> = OnceLock::new();

fn global_redactor() -> Option<&'static PhiRedactor> {
    REDACTOR
        .get_or_init(|| {
            let config = RedactionConfig::default();
            InstalledRedactor {
                redactor: PhiRedactor::new(config.clone()).ok(),
                config,
            }
        })
        .redactor
        .as_ref()
}

/// Install the process-wide redactor used by [`redact`] and [`preview`]
///
/// The redactor can be set once. Installing the same configuration again is a
/// no-op; a different one is [`LoggerError::RedactorConflict`]. Any call to
/// [`redact`] or [`preview`] before this installs the default configuration.
pub fn install_redactor(config: RedactionConfig) -> LoggerResult<()> {
    let redactor = PhiRedactor::new(config.clone())?;
    let installed = InstalledRedactor {
        config: config.clone(),
        redactor: Some(redactor),
    };
    match REDACTOR.set(installed) {
        Ok(()) => Ok(()),
        Err(_) if REDACTOR.get().is_some_and(|current| current.config == config) => Ok(()),
        Err(_) => Err(LoggerError::RedactorConflict),
    }
}

/// Redact `text` with the process-wide redactor
///
/// If no redactor could be built the text is withheld entirely.
pub fn redact(text: &str) -> String {
    match global_redactor() {
        Some(redactor) => redactor.redact(text),
        None => format!("[{} chars withheld]", text.chars().count()),
    }
}

/// Redacted, truncated excerpt suitable for a log field
pub fn preview(text: &str, max_chars: usize) -> String {
    match global_redactor() {
        Some(redactor) => redactor.preview(text, max_chars),
        None => format!("[{} chars withheld]", text.chars().count()),
    }
}

/// Install the global subscriber
///
/// Keep the returned guard alive for the life of the process when file
/// logging is enabled, otherwise buffered lines are lost on exit.
pub fn init(config: &LoggerConfig) -> LoggerResult<Option<WorkerGuard>> {
    let redaction = if config.redaction_enabled {
        RedactionConfig::default()
    } else {
        RedactionConfig::disabled()
    };
    install_redactor(redaction)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| LoggerError::InvalidFilter(e.to_string()))?;

    let (file_writer, guard) = match &config.log_directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let pretty = (config.format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(std::io::stderr)
    });
    let json = (config.format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_target(false)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(std::io::stderr)
    });
    let bunyan = (config.format == LogFormat::Bunyan)
        .then(|| BunyanFormattingLayer::new(config.service_name.clone(), std::io::stderr));
    let file = file_writer.map(|writer| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(writer)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(bunyan.is_some().then_some(JsonStorageLayer))
        .with(bunyan)
        .with(pretty)
        .with(json)
        .with(file)
        .try_init()
        .map_err(|e| LoggerError::Init(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_redact_masks_phi() {
        let redacted = redact("Reach me at jane@example.com");
        assert!(!redacted.contains("jane@example.com"));
    }

    #[test]
    fn test_conflicting_redactor_is_reported() {
        redact("warm up the default redactor");

        assert!(install_redactor(RedactionConfig::default()).is_ok());
        assert!(matches!(
            install_redactor(RedactionConfig::disabled()),
            Err(LoggerError::RedactorConflict)
        ));
        assert!(!redact("jane@example.com").contains("jane@example.com"));
    }

    #[test]
    fn test_preview_is_bounded() {
        let excerpt = preview(&"cough ".repeat(100), 20);
        assert_eq!(excerpt.chars().count(), 21);
    }
}
