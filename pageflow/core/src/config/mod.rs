//! Framework Options
//!
//! [`FrameworkOptions`] is the configuration surface of the framework. It can
//! be built in code, or loaded from a TOML file at
//! `~/.config/pageflow/pageflow.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments, via [`OptionsOverrides`]
//! 2. Environment variables (`PAGEFLOW_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [framework]
//! debug = false
//! log_level = "info"
//! enable_hotkeys = true
//! strict_dispatch = false
//! initial_page = "branch"
//!
//! [history]
//! enabled = true
//! max_size = 50
//!
//! [render]
//! mode = "debounced"
//! delay_ms = 16
//!
//! [keys]
//! exit = ["ctrl+c", "escape"]
//! help = "?"
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::Key;
use crate::page::PageId;
use crate::render::RenderMode;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the options came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Log Level
// =============================================================================

/// Verbosity of framework logging
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything
    Trace,
    /// Diagnostics
    Debug,
    /// Normal operation
    #[default]
    Info,
    /// Recoverable problems
    Warn,
    /// Failures only
    Error,
}

impl LogLevel {
    /// Directive for a `tracing` env filter
    #[must_use]
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

// =============================================================================
// Framework Options
// =============================================================================

/// Default bound on the history log
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Default delay for debounced and throttled rendering
pub const DEFAULT_RENDER_DELAY: Duration = Duration::from_millis(16);

/// Runtime behaviour of a framework instance
#[derive(Clone, Debug, PartialEq)]
pub struct FrameworkOptions {
    /// Emit `debug` events on the bus
    pub debug: bool,
    /// Default log verbosity for binaries
    pub log_level: LogLevel,
    /// Honour `exit_keys` and `help_key`
    pub enable_hotkeys: bool,
    /// Record navigation history
    pub enable_history: bool,
    /// Bound on the history log
    pub max_history_size: usize,
    /// Redraw pacing
    pub render_mode: RenderMode,
    /// Delay used by debounced and throttled rendering
    pub render_delay: Duration,
    /// Keys that end the run
    pub exit_keys: Vec<Key>,
    /// Key that shows the help overlay
    pub help_key: Option<Key>,
    /// Abort `run()` on the first dispatch error
    pub strict_dispatch: bool,
    /// Page to start on; the first registered page when unset
    pub initial_page: Option<PageId>,
    source: ConfigSource,
    config_file_path: Option<PathBuf>,
}

impl Default for FrameworkOptions {
    fn default() -> Self {
        Self {
            debug: false,
            log_level: LogLevel::Info,
            enable_hotkeys: true,
            enable_history: true,
            max_history_size: DEFAULT_MAX_HISTORY,
            render_mode: RenderMode::Immediate,
            render_delay: DEFAULT_RENDER_DELAY,
            exit_keys: vec![Key::ctrl('c')],
            help_key: Some(Key::char('?')),
            strict_dispatch: false,
            initial_page: None,
            source: ConfigSource::Default,
            config_file_path: None,
        }
    }
}

impl FrameworkOptions {
    /// Default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the options were last changed from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// The file the options were loaded from, if any
    #[must_use]
    pub fn config_file_path(&self) -> Option<&PathBuf> {
        self.config_file_path.as_ref()
    }

    /// Whether `key` is one of the exit hotkeys
    #[must_use]
    pub fn is_exit_key(&self, key: &Key) -> bool {
        self.enable_hotkeys && self.exit_keys.iter().any(|k| k.matches(key))
    }

    /// Whether `key` is the help hotkey
    #[must_use]
    pub fn is_help_key(&self, key: &Key) -> bool {
        self.enable_hotkeys && self.help_key.is_some_and(|k| k.matches(key))
    }

    /// Check the options for contradictions
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enable_history && self.max_history_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_history_size must be at least 1 when history is enabled".into(),
            ));
        }
        if self.render_mode != RenderMode::Immediate && self.render_delay.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "{} rendering needs a non-zero render delay",
                self.render_mode
            )));
        }
        if let Some(help) = &self.help_key {
            if self.exit_keys.iter().any(|k| k.matches(help)) {
                return Err(ConfigError::ValidationError(format!(
                    "help key '{help}' is also an exit key"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[framework]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkToml {
    /// Emit debug events
    pub debug: Option<bool>,
    /// Log verbosity
    pub log_level: Option<LogLevel>,
    /// Honour hotkeys
    pub enable_hotkeys: Option<bool>,
    /// Abort on dispatch errors
    pub strict_dispatch: Option<bool>,
    /// Starting page
    pub initial_page: Option<String>,
}

/// `[history]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryToml {
    /// Record history
    pub enabled: Option<bool>,
    /// Bound on the log
    pub max_size: Option<usize>,
}

/// `[render]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderToml {
    /// `immediate`, `debounced` or `throttled`
    pub mode: Option<RenderMode>,
    /// Delay in milliseconds
    pub delay_ms: Option<u64>,
}

/// `[keys]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysToml {
    /// Exit hotkeys, e.g. `["ctrl+c", "escape"]`
    pub exit: Option<Vec<Key>>,
    /// Help hotkey; an empty string disables it
    pub help: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageflowToml {
    /// Framework settings
    pub framework: FrameworkToml,
    /// History settings
    pub history: HistoryToml,
    /// Render settings
    pub render: RenderToml,
    /// Hotkey settings
    pub keys: KeysToml,
}

// =============================================================================
// Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/pageflow/pageflow.toml` or
/// `~/.config/pageflow/pageflow.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pageflow").join("pageflow.toml"))
}

/// Load options from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resulting options are contradictory. A missing config file is not an
/// error.
pub fn load_options() -> Result<FrameworkOptions, ConfigError> {
    load_options_from_path(default_config_path())
}

/// Load options from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_options_from_path(path: Option<PathBuf>) -> Result<FrameworkOptions, ConfigError> {
    let mut options = FrameworkOptions::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: PageflowToml = toml::from_str(&content)?;
            apply_toml_config(&mut options, &toml_config)?;
            options.config_file_path = Some(config_path.clone());
            options.source = ConfigSource::File;

            tracing::info!(path = %config_path.display(), "Loaded configuration from file");
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut options, |name| std::env::var(name).ok());
    options.validate()?;
    Ok(options)
}

/// Apply TOML configuration values to the options
fn apply_toml_config(options: &mut FrameworkOptions, toml: &PageflowToml) -> Result<(), ConfigError> {
    if let Some(debug) = toml.framework.debug {
        options.debug = debug;
    }
    if let Some(level) = toml.framework.log_level {
        options.log_level = level;
    }
    if let Some(enabled) = toml.framework.enable_hotkeys {
        options.enable_hotkeys = enabled;
    }
    if let Some(strict) = toml.framework.strict_dispatch {
        options.strict_dispatch = strict;
    }
    if let Some(page) = &toml.framework.initial_page {
        options.initial_page = Some(PageId::new(page.clone()));
    }

    if let Some(enabled) = toml.history.enabled {
        options.enable_history = enabled;
    }
    if let Some(max) = toml.history.max_size {
        options.max_history_size = max;
    }

    if let Some(mode) = toml.render.mode {
        options.render_mode = mode;
    }
    if let Some(ms) = toml.render.delay_ms {
        options.render_delay = Duration::from_millis(ms);
    }

    if let Some(keys) = &toml.keys.exit {
        options.exit_keys = keys.clone();
    }
    if let Some(help) = &toml.keys.help {
        options.help_key = if help.is_empty() {
            None
        } else {
            Some(
                help.parse()
                    .map_err(|e| ConfigError::ValidationError(format!("keys.help: {e}")))?,
            )
        };
    }
    Ok(())
}

fn parse_bool(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Apply `PAGEFLOW_*` environment overrides; unparseable values are ignored
fn apply_env_config(options: &mut FrameworkOptions, var: impl Fn(&str) -> Option<String>) {
    if let Some(debug) = var("PAGEFLOW_DEBUG") {
        options.debug = parse_bool(&debug);
        options.source = ConfigSource::Env;
    }
    if let Some(level) = var("PAGEFLOW_LOG_LEVEL") {
        if let Ok(level) = level.parse() {
            options.log_level = level;
            options.source = ConfigSource::Env;
        }
    }
    if let Some(history) = var("PAGEFLOW_HISTORY") {
        options.enable_history = parse_bool(&history);
        options.source = ConfigSource::Env;
    }
    if let Some(max) = var("PAGEFLOW_MAX_HISTORY") {
        if let Ok(max) = max.parse::<usize>() {
            options.max_history_size = max;
            options.source = ConfigSource::Env;
        }
    }
    if let Some(mode) = var("PAGEFLOW_RENDER_MODE") {
        if let Ok(mode) = mode.parse() {
            options.render_mode = mode;
            options.source = ConfigSource::Env;
        }
    }
    if let Some(delay) = var("PAGEFLOW_RENDER_DELAY_MS") {
        if let Ok(ms) = delay.parse::<u64>() {
            options.render_delay = Duration::from_millis(ms);
            options.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Command-line overrides, applied after [`load_options`]
#[derive(Clone, Debug, Default)]
pub struct OptionsOverrides {
    /// Debug events override
    pub debug: Option<bool>,
    /// Log level override
    pub log_level: Option<LogLevel>,
    /// Render mode override
    pub render_mode: Option<RenderMode>,
    /// History override
    pub enable_history: Option<bool>,
}

impl OptionsOverrides {
    /// No overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override debug events
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Override the log level
    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Override the render mode
    #[must_use]
    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = Some(mode);
        self
    }

    /// Override history recording
    #[must_use]
    pub fn with_history(mut self, enabled: bool) -> Self {
        self.enable_history = Some(enabled);
        self
    }

    /// Apply the overrides
    pub fn apply(&self, options: &mut FrameworkOptions) {
        if let Some(debug) = self.debug {
            options.debug = debug;
            options.source = ConfigSource::Cli;
        }
        if let Some(level) = self.log_level {
            options.log_level = level;
            options.source = ConfigSource::Cli;
        }
        if let Some(mode) = self.render_mode {
            options.render_mode = mode;
            options.source = ConfigSource::Cli;
        }
        if let Some(enabled) = self.enable_history {
            options.enable_history = enabled;
            options.source = ConfigSource::Cli;
        }
    }
}
