//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to load or validate an [`OrchestratorConfig`](super::OrchestratorConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension is unknown or its format feature is disabled.
    #[error("unsupported configuration format: .{0}")]
    UnsupportedFormat(String),

    /// The merged sources do not deserialize into the schema.
    #[error("failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// A value is structurally invalid.
    #[error("invalid configuration: {message}")]
    Invalid { message: String },

    /// A required value is empty.
    #[error("missing configuration value: {field}")]
    MissingField { field: String },

    /// `discovery.modules` lists a module twice.
    #[error("module listed twice: {0}")]
    DuplicateModule(String),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
