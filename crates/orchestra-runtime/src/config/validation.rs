//! Configuration validation.
//!
//! Only structural problems are rejected here.  A manifest entry with an
//! unknown class or a misspelled retention is still a valid configuration;
//! discovery logs it and skips or falls back.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, ManifestEntry, OrchestratorConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &OrchestratorConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;
    validate_modules(&config.discovery.modules)?;
    for (index, entry) in config.services.iter().enumerate() {
        validate_manifest_entry(index, entry)?;
    }
    if config.main_context.thread_name.trim().is_empty() {
        return Err(ConfigError::missing_field("main_context.thread_name"));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output = \"file\"",
        ));
    }
    if logging.max_files == Some(0) {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_modules(modules: &[String]) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for name in modules {
        if name.trim().is_empty() {
            return Err(ConfigError::validation("discovery.modules contains an empty name"));
        }
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::DuplicateModule(name.clone()));
        }
    }
    Ok(())
}

fn validate_manifest_entry(index: usize, entry: &ManifestEntry) -> ConfigResult<()> {
    if entry.class.trim().is_empty() {
        return Err(ConfigError::missing_field(format!("services[{index}].class")));
    }
    if entry.factory.as_deref().is_some_and(|f| f.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "services[{index}].factory must not be empty"
        )));
    }
    Ok(())
}
