//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then a TOML file, then
//! `PROMPTCOACH_*` environment variables.

mod features;

pub use features::FeatureFlags;

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default quiet interval after the last keystroke.
pub const DEFAULT_DEBOUNCE_MS: u64 = 800;
/// Default minimum trimmed prompt length for analysis.
pub const DEFAULT_MIN_PROMPT_LENGTH: usize = 30;
/// Default analyzer time budget.
pub const DEFAULT_ANALYSIS_TIMEOUT_MS: u64 = 15_000;
/// Default display time of a satisfied chip before it retires.
pub const DEFAULT_SATISFIED_DISPLAY_MS: u64 = 1_500;
/// Default Anthropic model.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
/// Default Anthropic API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Main configuration for promptcoach.
#[derive(Debug, Clone)]
pub struct CoachConfig {
    /// Directory holding `progress.json`.
    pub data_dir: PathBuf,
    /// Optional directory of technique files replacing the built-in catalog.
    pub catalog_dir: Option<PathBuf>,
    /// Feature flags.
    pub features: FeatureFlags,
    /// Analysis scheduling.
    pub scheduler: SchedulerConfig,
    /// Chip presentation.
    pub chip: ChipConfig,
    /// LLM configuration.
    pub llm: LlmConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Analysis scheduling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Quiet interval after the last keystroke, in milliseconds.
    pub debounce_ms: u64,
    /// Trimmed prompts shorter than this are never analyzed.
    pub min_prompt_length: usize,
    /// Analyzer time budget, in milliseconds.
    pub analysis_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            min_prompt_length: DEFAULT_MIN_PROMPT_LENGTH,
            analysis_timeout_ms: DEFAULT_ANALYSIS_TIMEOUT_MS,
        }
    }
}

/// Chip presentation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipConfig {
    /// How long a satisfied chip stays visible, in milliseconds.
    /// Zero retires it on the next turn of the event loop.
    pub satisfied_display_ms: u64,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            satisfied_display_ms: DEFAULT_SATISFIED_DISPLAY_MS,
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model name.
    pub model: String,
    /// API key. Falls back to `ANTHROPIC_API_KEY` when unset.
    pub api_key: Option<SecretString>,
    /// Base URL of the Messages API.
    pub base_url: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Logging settings from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Output format: `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `promptcoach=debug`.
    pub filter: Option<String>,
    /// Log file path; stderr when unset.
    pub file: Option<PathBuf>,
}

/// Runtime settings of one prompt session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Debounce interval.
    pub debounce: Duration,
    /// Minimum trimmed prompt length for analysis.
    pub min_prompt_length: usize,
    /// Analyzer time budget.
    pub analysis_timeout: Duration,
    /// Satisfied chip display duration.
    pub satisfied_display: Duration,
    /// Feature flags.
    pub features: FeatureFlags,
}

impl Default for SessionSettings {
    fn default() -> Self {
        CoachConfig::default().session_settings()
    }
}

impl SessionSettings {
    /// Sets the debounce interval.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the minimum prompt length.
    #[must_use]
    pub const fn with_min_prompt_length(mut self, length: usize) -> Self {
        self.min_prompt_length = length;
        self
    }

    /// Sets the analyzer time budget.
    #[must_use]
    pub const fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    /// Sets the satisfied chip display duration.
    #[must_use]
    pub const fn with_satisfied_display(mut self, display: Duration) -> Self {
        self.satisfied_display = display;
        self
    }

    /// Sets the feature flags.
    #[must_use]
    pub const fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Catalog directory.
    pub catalog_dir: Option<String>,
    /// Feature flags.
    pub features: Option<ConfigFileFeatures>,
    /// Scheduler section.
    pub scheduler: Option<ConfigFileScheduler>,
    /// Chip section.
    pub chip: Option<ConfigFileChip>,
    /// LLM configuration.
    pub llm: Option<ConfigFileLlm>,
    /// Logging configuration.
    pub logging: Option<ConfigFileLogging>,
}

/// Features section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileFeatures {
    /// Automatic suggestions.
    pub auto_suggestions: Option<bool>,
    /// Show-me demonstrations.
    pub show_me: Option<bool>,
}

/// Scheduler section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileScheduler {
    /// Debounce interval.
    pub debounce_ms: Option<u64>,
    /// Minimum prompt length.
    pub min_prompt_length: Option<usize>,
    /// Analyzer time budget.
    pub analysis_timeout_ms: Option<u64>,
}

/// Chip section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileChip {
    /// Satisfied display duration.
    pub satisfied_display_ms: Option<u64>,
}

/// LLM section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLlm {
    /// Model name.
    pub model: Option<String>,
    /// API key.
    pub api_key: Option<String>,
    /// Base URL.
    pub base_url: Option<String>,
    /// Request timeout.
    pub timeout_ms: Option<u64>,
    /// Connect timeout.
    pub connect_timeout_ms: Option<u64>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Output format.
    pub format: Option<String>,
    /// Filter directive.
    pub filter: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog_dir: None,
            features: FeatureFlags::default(),
            scheduler: SchedulerConfig::default(),
            chip: ChipConfig::default(),
            llm: LlmConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl CoachConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses configuration from TOML text without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config file.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/promptcoach/` on macOS)
    /// 2. XDG config dir (`~/.config/promptcoach/` for Unix compatibility)
    ///
    /// Returns default configuration (with environment overrides) if no
    /// config file is found or it cannot be loaded.
    #[must_use]
    pub fn load_default() -> Self {
        for path in default_config_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(&path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Converts a `ConfigFile` to `CoachConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        config.catalog_dir = file.catalog_dir.map(PathBuf::from);

        if let Some(features) = file.features {
            if let Some(v) = features.auto_suggestions {
                config.features.auto_suggestions = v;
            }
            if let Some(v) = features.show_me {
                config.features.show_me = v;
            }
        }
        if let Some(scheduler) = file.scheduler {
            if let Some(v) = scheduler.debounce_ms {
                config.scheduler.debounce_ms = v;
            }
            if let Some(v) = scheduler.min_prompt_length {
                config.scheduler.min_prompt_length = v;
            }
            if let Some(v) = scheduler.analysis_timeout_ms {
                config.scheduler.analysis_timeout_ms = v;
            }
        }
        if let Some(chip) = file.chip {
            if let Some(v) = chip.satisfied_display_ms {
                config.chip.satisfied_display_ms = v;
            }
        }
        if let Some(llm) = file.llm {
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            config.llm.api_key = llm
                .api_key
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from);
            if let Some(base_url) = llm.base_url {
                config.llm.base_url = base_url;
            }
            if let Some(v) = llm.timeout_ms {
                config.llm.timeout_ms = v;
            }
            if let Some(v) = llm.connect_timeout_ms {
                config.llm.connect_timeout_ms = v;
            }
        }
        if let Some(logging) = file.logging {
            config.logging = LoggingSettings {
                format: logging.format,
                filter: logging.filter,
                file: logging.file.map(PathBuf::from),
            };
        }

        config
    }

    /// Applies `PROMPTCOACH_*` environment overrides.
    ///
    /// Unparsable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PROMPTCOACH_DATA_DIR") {
            if !v.trim().is_empty() {
                self.data_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("PROMPTCOACH_CATALOG_DIR") {
            if !v.trim().is_empty() {
                self.catalog_dir = Some(PathBuf::from(v));
            }
        }
        if let Ok(v) = std::env::var("PROMPTCOACH_DEBOUNCE_MS") {
            if let Ok(parsed) = v.parse() {
                self.scheduler.debounce_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("PROMPTCOACH_MIN_PROMPT_LENGTH") {
            if let Ok(parsed) = v.parse() {
                self.scheduler.min_prompt_length = parsed;
            }
        }
        if let Ok(v) = std::env::var("PROMPTCOACH_ANALYSIS_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse() {
                self.scheduler.analysis_timeout_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("PROMPTCOACH_SATISFIED_DISPLAY_MS") {
            if let Ok(parsed) = v.parse() {
                self.chip.satisfied_display_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("PROMPTCOACH_AUTO_SUGGESTIONS") {
            self.features.auto_suggestions = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("PROMPTCOACH_SHOW_ME") {
            self.features.show_me = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("PROMPTCOACH_LLM_MODEL") {
            if !v.trim().is_empty() {
                self.llm.model = v;
            }
        }
        if let Ok(v) = std::env::var("PROMPTCOACH_LLM_BASE_URL") {
            if !v.trim().is_empty() {
                self.llm.base_url = v;
            }
        }
        if self.llm.api_key.is_none() {
            if let Ok(v) = std::env::var("ANTHROPIC_API_KEY") {
                if !v.trim().is_empty() {
                    self.llm.api_key = Some(SecretString::from(v));
                }
            }
        }
    }

    /// Returns the runtime settings for a prompt session.
    #[must_use]
    pub const fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            debounce: Duration::from_millis(self.scheduler.debounce_ms),
            min_prompt_length: self.scheduler.min_prompt_length,
            analysis_timeout: Duration::from_millis(self.scheduler.analysis_timeout_ms),
            satisfied_display: Duration::from_millis(self.chip.satisfied_display_ms),
            features: self.features,
        }
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Sets the catalog directory.
    #[must_use]
    pub fn with_catalog_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_dir = Some(path.into());
        self
    }
}

/// Candidate config file locations, most specific first.
#[must_use]
pub fn default_config_paths() -> Vec<PathBuf> {
    let Some(base_dirs) = directories::BaseDirs::new() else {
        return Vec::new();
    };

    let platform_config = base_dirs
        .config_dir()
        .join("promptcoach")
        .join("config.toml");
    let xdg_config = base_dirs
        .home_dir()
        .join(".config")
        .join("promptcoach")
        .join("config.toml");

    if platform_config == xdg_config {
        vec![platform_config]
    } else {
        vec![platform_config, xdg_config]
    }
}

/// Default data directory (`<data_dir>/promptcoach`), or `.promptcoach` when
/// no home directory can be resolved.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".promptcoach"),
        |dirs| dirs.data_dir().join("promptcoach"),
    )
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = CoachConfig::default();
        assert_eq!(config.scheduler.debounce_ms, 800);
        assert_eq!(config.scheduler.min_prompt_length, 30);
        assert_eq!(config.scheduler.analysis_timeout_ms, 15_000);
        assert_eq!(config.chip.satisfied_display_ms, 1_500);
        assert!(config.features.auto_suggestions);
        assert!(config.features.show_me);
    }

    #[test]
    fn test_from_toml_overrides_sections() {
        let config = CoachConfig::from_toml(
            r#"
            data_dir = "/tmp/coach"

            [scheduler]
            debounce_ms = 250
            min_prompt_length = 10

            [chip]
            satisfied_display_ms = 0

            [features]
            show_me = false

            [llm]
            model = "claude-3-5-haiku-latest"
            api_key = "sk-test"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/coach"));
        assert_eq!(config.scheduler.debounce_ms, 250);
        assert_eq!(config.scheduler.min_prompt_length, 10);
        assert_eq!(config.scheduler.analysis_timeout_ms, 15_000);
        assert_eq!(config.chip.satisfied_display_ms, 0);
        assert!(!config.features.show_me);
        assert!(config.features.auto_suggestions);
        assert_eq!(config.llm.model, "claude-3-5-haiku-latest");
        assert_eq!(
            config.llm.api_key.as_ref().map(|k| k.expose_secret()),
            Some("sk-test")
        );
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(CoachConfig::from_toml("debounce = 3").is_err());
    }

    #[test]
    fn test_session_settings_conversion() {
        let settings = CoachConfig::default().session_settings();
        assert_eq!(settings.debounce, Duration::from_millis(800));
        assert_eq!(settings.analysis_timeout, Duration::from_secs(15));
        assert_eq!(settings.satisfied_display, Duration::from_millis(1_500));
    }

    #[test_case("false", false)]
    #[test_case("0", false)]
    #[test_case("OFF", false)]
    #[test_case("true", true)]
    #[test_case("1", true)]
    fn test_parse_flag(value: &str, expected: bool) {
        assert_eq!(parse_flag(value), expected);
    }
}
