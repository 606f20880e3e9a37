//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "PROMPTCOACH_LOG";

/// Filter used when nothing else is configured.
const DEFAULT_FILTER: &str = "promptcoach=warn";

/// Filter used with `--verbose`.
const VERBOSE_FILTER: &str = "promptcoach=debug";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format string, defaulting to pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Log file; stderr when unset.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Builds the logging configuration.
    ///
    /// Filter precedence: `--verbose`, then `PROMPTCOACH_LOG`, then
    /// `RUST_LOG`, then the config file, then `promptcoach=warn`. An invalid
    /// directive falls back to the default.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        let format = std::env::var("PROMPTCOACH_LOG_FORMAT")
            .ok()
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .map_or_else(LogFormat::default, |f| LogFormat::parse(&f));

        let directive = if verbose {
            VERBOSE_FILTER.to_string()
        } else {
            std::env::var(LOG_ENV)
                .ok()
                .or_else(|| std::env::var("RUST_LOG").ok())
                .or_else(|| settings.and_then(|s| s.filter.clone()))
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FILTER.to_string())
        };

        let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("Ignoring invalid log filter '{directive}': {e}");
            EnvFilter::new(DEFAULT_FILTER)
        });

        let file = std::env::var("PROMPTCOACH_LOG_FILE")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.and_then(|s| s.file.clone()));

        Self {
            format,
            filter,
            file,
        }
    }
}
