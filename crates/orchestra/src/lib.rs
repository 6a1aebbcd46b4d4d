//! # Orchestra
//!
//! A process-local service orchestrator: services declare which lifecycle
//! events they handle, the orchestrator discovers them, orders them by
//! priority and runs each firing as a synchronous responsibility chain.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────┐     ┌───────────────┐     ┌────────────────────────┐
//! │   Loaders    │────▶│ Merger │────▶│  Event cache  │────▶│ fire(event): entry 1   │──▶ stop?
//! │ section/conf │     │        │     │ (per event,   │     │              entry 2   │──▶ stop?
//! └──────────────┘     └────────┘     │  by priority) │     │              ...       │
//!                                     └───────────────┘     └────────────────────────┘
//!                                                                      │
//!                                              instances built on the main context
//! ```
//!
//! - **Services**: types implementing [`core::Service`], registered with
//!   `#[service]` or passed to the orchestrator directly
//! - **Loaders**: discovery sources (identifier sections, modules, the
//!   configuration manifest)
//! - **Orchestrator**: merges definitions, keeps resident instances and
//!   dispatches events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use orchestra::prelude::*;
//!
//! #[service]
//! #[derive(Default)]
//! struct Analytics;
//!
//! impl Service for Analytics {
//!     fn retention() -> RetentionPolicy {
//!         RetentionPolicy::Hold
//!     }
//!
//!     fn register(registry: &mut Registry<Self>) {
//!         registry.on(events::DID_FINISH_LAUNCHING, |_svc: &Self, _ctx: &Context| {
//!             tracing::info!("analytics ready");
//!         });
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let orchestrator = Orchestrator::global()?;
//!     orchestrator.fire_event(events::DID_FINISH_LAUNCHING);
//!     Ok(())
//! }
//! ```
//!
//! The attributes expand to paths under `::orchestra_core`; crates that only
//! depend on this facade pass `crate = ::orchestra::core`.
//!
//! ## Features
//!
//! - `toml-config`: `orchestra.toml` configuration files (default)
//! - `yaml-config`: `orchestra.yaml` configuration files
//! - `json-log`: JSON log output

pub use orchestra_core as core;
pub use orchestra_runtime as runtime;

pub use orchestra_macros::{factory, module, service};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use orchestra::prelude::*;
/// ```
pub mod prelude {
    // Registration attributes
    pub use orchestra_macros::{factory, module, service};

    // Runtime entry points
    pub use orchestra_runtime::prelude::*;
}
