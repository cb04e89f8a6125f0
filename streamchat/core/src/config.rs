//! TOML Configuration File Support
//!
//! Centralized configuration loading for the client, from a TOML file at
//! `~/.config/streamchat/config.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables (`STREAMCHAT_BASE_URL`, `STREAMCHAT_CONTEXT`,
//!    `STREAMCHAT_BUSY_POLICY`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! The file itself is found through `--config`, then `$STREAMCHAT_CONFIG`, then
//! the XDG default. Only a missing *default* file is tolerated.
//!
//! # Example Configuration
//!
//! ```toml
//! base_url = "https://chat.example.com"
//! default_context = "support"
//! busy_policy = "reject"
//! reset_on_profile_save = true
//!
//! [[bots]]
//! key = "support"
//! name = "Support"
//! endpoint = "/api/support-stream"
//! preset_family = "general"
//! default_prompt = "You are a patient support agent."
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::DEFAULT_BASE_URL;
use crate::bots::{BotDefinition, BotRegistry};
use crate::messages::ContextKey;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "STREAMCHAT_CONFIG";
/// Environment variable overriding the service base URL
pub const BASE_URL_ENV: &str = "STREAMCHAT_BASE_URL";
/// Environment variable overriding the startup context
pub const CONTEXT_ENV: &str = "STREAMCHAT_CONTEXT";
/// Environment variable overriding the busy policy
pub const BUSY_POLICY_ENV: &str = "STREAMCHAT_BUSY_POLICY";

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

    /// A context key names no registered bot
    #[error("Unknown bot: {0}")]
    UnknownBot(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Busy Policy
// =============================================================================

/// What a submission does while the context already has a turn in flight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Cancel the running turn, remove its placeholder, start the new one
    #[default]
    Preempt,
    /// Ignore the submission
    Reject,
}

impl FromStr for BusyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preempt" => Ok(Self::Preempt),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::ValidationError(format!(
                "busy_policy must be \"preempt\" or \"reject\", got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for BusyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preempt => write!(f, "preempt"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration was last changed from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
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
// Client Configuration
// =============================================================================

/// Client configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Chat service address (scheme, host, port)
    pub base_url: String,

    /// Context activated at startup (first bot if unset)
    pub default_context: Option<ContextKey>,

    /// Behavior of a submission while a turn is in flight
    pub busy_policy: BusyPolicy,

    /// Whether saving a profile also resets that context's conversation
    pub reset_on_profile_save: bool,

    /// Where durable state is kept (XDG data dir if unset)
    pub state_dir: Option<PathBuf>,

    /// Bot definitions; empty means the built-in registry
    pub bots: Vec<BotDefinition>,

    /// Where the configuration came from
    #[serde(skip)]
    source: ConfigSource,

    /// Path to the config file that was loaded (if any)
    #[serde(skip)]
    config_file_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_context: None,
            busy_policy: BusyPolicy::default(),
            reset_on_profile_save: false,
            state_dir: None,
            bots: Vec::new(),
            source: ConfigSource::Default,
            config_file_path: None,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Path of the file this configuration was read from
    #[must_use]
    pub fn config_file_path(&self) -> Option<&Path> {
        self.config_file_path.as_deref()
    }

    /// The bot registry this configuration describes
    #[must_use]
    pub fn registry(&self) -> BotRegistry {
        BotRegistry::from_definitions(self.bots.clone())
    }

    /// The context to activate at startup
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownBot`] if `default_context` names no bot.
    pub fn startup_context(&self, registry: &BotRegistry) -> Result<ContextKey, ConfigError> {
        match &self.default_context {
            Some(key) if registry.contains(key) => Ok(key.clone()),
            Some(key) => Err(ConfigError::UnknownBot(key.to_string())),
            None => registry
                .first()
                .map(|bot| bot.key.clone())
                .ok_or_else(|| ConfigError::ValidationError("no bots configured".into())),
        }
    }

    /// Directory for durable state
    #[must_use]
    pub fn resolved_state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns an error for an empty base URL or an unknown default context.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("base_url must not be empty".into()));
        }
        self.startup_context(&self.registry()).map(|_| ())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/streamchat/config.toml` or
/// `~/.config/streamchat/config.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("streamchat").join("config.toml"))
}

/// Default durable state directory (`~/.local/share/streamchat`)
#[must_use]
pub fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("streamchat")
}

/// Load configuration from all sources with proper priority
///
/// `explicit` is the `--config` argument. CLI overrides are not handled
/// here; the caller applies [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if an explicitly named file cannot be read, or any config
/// file cannot be parsed. A missing default file is not an error.
pub fn load_config(explicit: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let env_path = std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty()).map(PathBuf::from);
    let mut config = match explicit.or(env_path) {
        Some(path) => read_config_file(&path)?,
        None => load_config_from_path(default_config_path())?,
    };
    apply_env_config(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Load configuration from an optional path, tolerating a missing file
///
/// Environment variables are not applied.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    match path {
        Some(path) if path.exists() => read_config_file(&path),
        Some(path) => {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Ok(ClientConfig::default())
        }
        None => Ok(ClientConfig::default()),
    }
}

fn read_config_file(path: &Path) -> Result<ClientConfig, ConfigError> {
    let toml_content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config: ClientConfig = toml::from_str(&toml_content)?;
    config.source = ConfigSource::File;
    config.config_file_path = Some(path.to_path_buf());

    tracing::info!(path = %path.display(), "Loaded configuration from file");
    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables
///
/// Unparseable values are logged and ignored.
pub fn apply_env_config(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.is_empty()) {
        config.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(context) = lookup(CONTEXT_ENV).filter(|v| !v.is_empty()) {
        config.default_context = Some(ContextKey::new(context));
        config.source = ConfigSource::Env;
    }
    if let Some(policy) = lookup(BUSY_POLICY_ENV) {
        match policy.parse::<BusyPolicy>() {
            Ok(policy) => {
                config.busy_policy = policy;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring {BUSY_POLICY_ENV}"),
        }
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Base URL override
    pub base_url: Option<String>,

    /// Startup context override
    pub context: Option<ContextKey>,

    /// State directory override
    pub state_dir: Option<PathBuf>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set startup context override
    #[must_use]
    pub fn with_context(mut self, context: impl Into<ContextKey>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set state directory override
    #[must_use]
    pub fn with_state_dir(mut self, dir: PathBuf) -> Self {
        self.state_dir = Some(dir);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.base_url.is_some() || self.context.is_some() || self.state_dir.is_some() {
            config.source = ConfigSource::Cli;
        }
        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if let Some(ref context) = self.context {
            config.default_context = Some(context.clone());
        }
        if let Some(ref dir) = self.state_dir {
            config.state_dir = Some(dir.clone());
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
