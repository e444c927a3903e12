//! Configuration management for winscope
//!
//! Configuration comes from two layers:
//!
//! 1. A TOML file (`winscope.toml`) deserialized into [`Config`]. Every section
//!    uses `#[serde(default)]`, so an empty file yields the defaults.
//! 2. Flat property overrides resolved through a [`ConfigResolver`], which asks
//!    each [`PropertySource`] in order and takes the first hit. The environment
//!    is the default source.
//!
//! Recognized properties:
//!
//! | Property | Effect |
//! |----------|--------|
//! | `deltaspike.scope.window.max-count` | `window.max_count` (default 64) |
//! | `org.apache.deltaspike.ProjectStage` | `project_stage` |
//!
//! Malformed values fail fast with [`ConfigError::InvalidValue`].

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::client_window::ClientWindowRenderMode;
use crate::error::ConfigError;
use crate::logging::LogConfig;

/// Property key bounding the number of windows tracked per session.
pub const MAX_WINDOW_COUNT_KEY: &str = "deltaspike.scope.window.max-count";

/// Property key selecting the project stage.
pub const PROJECT_STAGE_KEY: &str = "org.apache.deltaspike.ProjectStage";

/// Default bound on windows tracked per session.
pub const DEFAULT_MAX_WINDOW_COUNT: usize = 64;

// =============================================================================
// Log format
// =============================================================================

/// Output format for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown log format: {s}. Expected pretty or json")),
        }
    }
}

// =============================================================================
// Project stage
// =============================================================================

/// Deployment stage of the application.
///
/// `Development` disables caching of client-side HTML fragments so edits are
/// picked up without a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStage {
    Development,
    UnitTest,
    SystemTest,
    IntegrationTest,
    Staging,
    #[default]
    Production,
}

impl ProjectStage {
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for ProjectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "Development",
            Self::UnitTest => "UnitTest",
            Self::SystemTest => "SystemTest",
            Self::IntegrationTest => "IntegrationTest",
            Self::Staging => "Staging",
            Self::Production => "Production",
        };
        f.write_str(name)
    }
}

impl FromStr for ProjectStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "unittest" => Ok(Self::UnitTest),
            "systemtest" => Ok(Self::SystemTest),
            "integrationtest" => Ok(Self::IntegrationTest),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            _ => Err(format!("unknown project stage: {s}")),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Window scope settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowScopeConfig {
    /// Maximum number of windows tracked per session before LRU eviction
    pub max_count: usize,
}

impl Default for WindowScopeConfig {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_WINDOW_COUNT,
        }
    }
}

/// Client window settings (render mode, handler page, message retention)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientWindowSettings {
    /// Render mode used instead of the detected default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_render_mode: Option<ClientWindowRenderMode>,
    /// Window handler HTML file; the built-in page is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler_html: Option<PathBuf>,
    /// Keep user messages in the window across redirects
    pub always_keep_messages: bool,
}

impl Default for ClientWindowSettings {
    fn default() -> Self {
        Self {
            default_render_mode: None,
            handler_html: None,
            always_keep_messages: true,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project_stage: ProjectStage,
    pub window: WindowScopeConfig,
    pub client_window: ClientWindowSettings,
    pub logging: LogConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed(e.to_string()))
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.max_count == 0 {
            return Err(ConfigError::InvalidValue {
                key: MAX_WINDOW_COUNT_KEY.to_string(),
                value: "0".to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }
        Ok(())
    }

    /// Overlay property values from `resolver` onto this configuration.
    pub fn apply_properties(mut self, resolver: &ConfigResolver) -> Result<Self, ConfigError> {
        if let Some(raw) = resolver.property(MAX_WINDOW_COUNT_KEY) {
            self.window.max_count = parse_max_count(&raw)?;
        }
        if let Some(raw) = resolver.property(PROJECT_STAGE_KEY) {
            self.project_stage =
                raw.parse::<ProjectStage>()
                    .map_err(|reason| ConfigError::InvalidValue {
                        key: PROJECT_STAGE_KEY.to_string(),
                        value: raw.clone(),
                        reason,
                    })?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_max_count(raw: &str) -> Result<usize, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: MAX_WINDOW_COUNT_KEY.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let value: usize = raw
        .trim()
        .parse()
        .map_err(|_| invalid("must be a positive integer"))?;
    if value == 0 {
        return Err(invalid("must be a positive integer"));
    }
    Ok(value)
}

// =============================================================================
// Property sources
// =============================================================================

/// A flat key/value configuration source.
pub trait PropertySource: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Value for `key`, if this source defines it
    fn property(&self, key: &str) -> Option<String>;
}

/// Reads properties from environment variables.
///
/// `deltaspike.scope.window.max-count` maps to
/// `DELTASPIKE_SCOPE_WINDOW_MAX_COUNT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvPropertySource;

impl EnvPropertySource {
    #[must_use]
    pub fn env_var_name(key: &str) -> String {
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl PropertySource for EnvPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn property(&self, key: &str) -> Option<String> {
        std::env::var(Self::env_var_name(key)).ok()
    }
}

/// In-memory properties (command line overrides, tests).
#[derive(Debug, Clone, Default)]
pub struct MapPropertySource {
    name: String,
    values: HashMap<String, String>,
}

impl MapPropertySource {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn property(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Ordered list of property sources; the first source defining a key wins.
#[derive(Default)]
pub struct ConfigResolver {
    sources: Vec<Box<dyn PropertySource>>,
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("ConfigResolver")
            .field("sources", &names)
            .finish()
    }
}

impl ConfigResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver backed by the process environment only.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new().with_source(EnvPropertySource)
    }

    #[must_use]
    pub fn with_source(mut self, source: impl PropertySource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Resolve `key` against the sources in order.
    pub fn property(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|source| {
            let value = source.property(key)?;
            tracing::trace!(key, source = source.name(), "Resolved config property");
            Some(value)
        })
    }

    /// Resolve `key`, falling back to `default`.
    pub fn property_or(&self, key: &str, default: &str) -> String {
        self.property(key).unwrap_or_else(|| default.to_string())
    }
}
