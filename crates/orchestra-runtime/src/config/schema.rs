//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration structure.
///
/// ```toml
/// [logging]
/// level = "debug"
///
/// [discovery]
/// modules = ["app.CoreModule"]
///
/// [[services]]
/// class = "app.PushService"
/// priority = 750
/// retention = "hold"
/// args = { endpoint = "https://push.example" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestratorConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Which discovery sources run at bootstrap.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Manifest entries, one per service.
    #[serde(default)]
    pub services: Vec<ManifestEntry>,

    /// Main context settings.
    #[serde(default)]
    pub main_context: MainContextConfig,
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` without it.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// File rotation for [`LogOutput::File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.  Useful to see which work ran on the main context.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, required for [`LogOutput::File`].
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep.  `None` keeps all.
    #[serde(default)]
    pub max_files: Option<usize>,

    /// Per-target levels, e.g. `orchestra_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::Never,
            max_files: None,
            filters: HashMap::new(),
        }
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Discovery sources run at bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Scan the `&str` identifier section.
    #[serde(default = "default_true")]
    pub section_static: bool,

    /// Scan the NUL-terminated identifier section.
    #[serde(default = "default_true")]
    pub section_cstr: bool,

    /// Only scan images next to the main executable.
    #[serde(default = "default_true")]
    pub restrict_to_app_dir: bool,

    /// Module providers to ask for services, in order.
    #[serde(default)]
    pub modules: Vec<String>,

    /// Turn `[[services]]` entries into definitions.
    #[serde(default = "default_true")]
    pub manifest: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            section_static: true,
            section_cstr: true,
            restrict_to_app_dir: true,
            modules: Vec::new(),
            manifest: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One manifest entry.
///
/// `retention` is kept as a string so that a typo is reported and skipped
/// at discovery time instead of failing the whole configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Catalog name of the service type.
    pub class: String,

    #[serde(default)]
    pub priority: Option<i64>,

    #[serde(default)]
    pub retention: Option<String>,

    /// Catalog name of a factory type.
    #[serde(default)]
    pub factory: Option<String>,

    #[serde(default)]
    pub args: Map<String, Value>,
}

// =============================================================================
// Main context
// =============================================================================

/// Settings for the dedicated construction thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainContextConfig {
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for MainContextConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
        }
    }
}

fn default_thread_name() -> String {
    "orchestra-main".to_string()
}
