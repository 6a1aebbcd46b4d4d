//! Orchestrator configuration.
//!
//! Loaded with figment from files and `ORCHESTRA_*` environment variables,
//! then validated.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config};
pub use schema::{
    DiscoveryConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    MainContextConfig, ManifestEntry, OrchestratorConfig, SpanEventConfig,
};
pub use validation::validate_config;
