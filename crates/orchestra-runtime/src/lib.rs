//! Orchestra Runtime - dispatch engine of the Orchestra service orchestrator.
//!
//! This crate provides:
//! - The [`Orchestrator`]: definition merging, the per-event cache, instance
//!   lifecycle and synchronous event dispatch
//! - The [`MainContext`] on which every service is constructed
//! - Discovery sources ([`loaders`]): identifier sections, modules, the
//!   configuration manifest and static lists
//! - Configuration ([`config`]) and logging setup ([`logging`])
//!
//! # Bootstrapping
//!
//! ```ignore
//! use orchestra_runtime::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     orchestra_runtime::logging::init_from_config(&config.logging);
//!
//!     let orchestrator = Orchestrator::from_config(config)?;
//!     orchestrator.resolve();
//!     orchestrator.fire_event(events::DID_FINISH_LAUNCHING);
//!     Ok(())
//! }
//! ```
//!
//! `resolve` is optional: the first firing bootstraps on demand.
//!
//! # Hosts that own their main thread
//!
//! ```ignore
//! let (main, main_loop) = MainContext::bind_current();
//! let orchestrator = Orchestrator::builder().main_context(main).build()?;
//!
//! // Other threads may now fire events; constructions are queued here.
//! loop {
//!     main_loop.run_pending();
//!     // ... the host's own work ...
//! }
//! ```

pub mod config;
pub mod error;
pub mod loaders;
pub mod logging;
pub mod main_context;
pub mod orchestrator;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, OrchestratorConfig, load_config};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use main_context::{MainContext, MainContextError, MainLoop};
pub use orchestrator::{EntryInfo, EntryOutcome, FireReport, Orchestrator, OrchestratorBuilder};

pub use orchestra_core;

/// Prelude for hosts.
pub mod prelude {
    pub use super::{
        EntryInfo, FireReport, MainContext, MainLoop, Orchestrator, OrchestratorBuilder,
        OrchestratorConfig, load_config,
    };
    pub use orchestra_core::prelude::*;
}
