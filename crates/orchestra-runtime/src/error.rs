//! Runtime error types.

use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};
pub use crate::main_context::MainContextError;

/// Errors raised while setting an orchestrator up.
///
/// Nothing here can come out of a firing; dispatch failures are logged and
/// reported through [`FireReport`](crate::FireReport).
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The main context thread could not be started.
    #[error("Failed to start main context thread: {0}")]
    MainContextSpawn(#[source] std::io::Error),

    /// `Orchestrator::set_global` was called after the global was created.
    #[error("Global orchestrator already initialized")]
    AlreadyInitialized,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
