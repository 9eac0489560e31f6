//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from environment variables.
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        Self::from_settings(None, verbose)
    }

    /// Builds logging configuration from config settings with env overrides.
    ///
    /// Precedence for the filter: `--verbose`, `RUST_LOG`,
    /// `ECHOLESS_LOG_LEVEL`, then the `[logging]` section.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let mut config = Self::default();

        if let Some(settings) = settings {
            if let Some(level) = &settings.level {
                config.filter.clone_from(level);
            }
            if let Some(format) = &settings.format {
                config.format = LogFormat::parse(format);
            }
            config.file.clone_from(&settings.file);
        }

        if let Ok(level) = std::env::var("ECHOLESS_LOG_LEVEL") {
            config.filter = level;
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            config.filter = filter;
        }
        if let Ok(format) = std::env::var("ECHOLESS_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Ok(file) = std::env::var("ECHOLESS_LOG_FILE") {
            config.file = Some(PathBuf::from(file));
        }
        if verbose {
            config.filter = "debug".to_string();
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Pretty);
    }

    #[test]
    fn test_verbose_forces_debug() {
        let settings = LoggingSettings {
            level: Some("error".to_string()),
            format: Some("json".to_string()),
            file: None,
        };
        let config = LoggingConfig::from_settings(Some(&settings), true);
        assert_eq!(config.filter, "debug");
    }
}
