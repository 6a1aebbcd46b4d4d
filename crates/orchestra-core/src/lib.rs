//! # Orchestra Core
//!
//! Shared building blocks of the Orchestra service orchestrator.
//!
//! This crate defines everything that services, factories and discovery
//! sources are written against, and nothing that owns runtime state:
//!
//! - **Events and results**: [`Event`], [`Priority`], [`RetentionPolicy`],
//!   [`Outcome`], [`ReturnValue`], [`IntoOutcome`]
//! - **Per-firing context**: [`Context`], [`Args`], [`Parameters`],
//!   [`UserInfo`]
//! - **Contracts**: [`Service`], [`ServiceFactory`], [`ModuleProvider`],
//!   [`ServiceLoader`] and their erased handles ([`ServiceType`],
//!   [`FactoryType`], [`ModuleType`], [`SharedService`])
//! - **Discovery data**: [`ServiceDefinition`], the link-time
//!   [`catalog`], and the [`section`] scanner that recovers identifiers
//!   embedded in binary images
//!
//! The dispatch engine lives in `orchestra-runtime`.
//!
//! ```text
//!   #[service] ──▶ catalog entry ─────────────┐
//!        │                                    ▼
//!        └──────▶ section record ──▶ SectionScanner ──▶ ServiceDefinition ──▶ Orchestrator
//! ```

pub mod catalog;
pub mod context;
pub mod definition;
pub mod error;
pub mod event;
pub mod events;
pub mod outcome;
pub mod section;
pub mod service;
pub mod types;

pub use context::{AnyArc, Args, Context, Parameters, UserInfo};
pub use definition::{FactoryRef, ServiceDefinition, ServiceLoader, ServiceRef, StaticLoader};
pub use error::{BoxError, ConstructError, HandlerError, ScanError, ScanResult};
pub use event::{ContextKey, Event, ParameterKey};
pub use outcome::{IntoOutcome, Outcome, ReturnValue};
pub use section::{
    CStrRecord, ScanOptions, ScanReport, SectionKind, SectionRecord, SectionScanner,
    StaticStrRecord,
};
pub use service::{
    ErasedHandler, FactoryType, Interest, ModuleProvider, ModuleType, Registry, Service,
    ServiceFactory, ServiceType, SharedService,
};
pub use types::{Priority, RetentionPolicy};

// Used by the registration attributes.
#[doc(hidden)]
pub use linkme;

/// Prelude for service authors.
pub mod prelude {
    pub use super::events;
    pub use super::{
        Args, BoxError, Context, ContextKey, Event, IntoOutcome, ModuleProvider, Outcome,
        ParameterKey, Parameters, Priority, Registry, RetentionPolicy, ReturnValue, Service,
        ServiceDefinition, ServiceFactory, SharedService, UserInfo,
    };
}
