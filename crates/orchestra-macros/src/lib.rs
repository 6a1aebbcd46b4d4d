//! Registration attributes for the Orchestra service orchestrator.
//!
//! Each attribute leaves the annotated type untouched and appends link-time
//! registrations:
//!
//! - `#[service]` — a catalog entry mapping `crate.TypeName` to the type, and
//!   a record in the identifier section read by the section scanner.
//! - `#[factory]` — a catalog entry for a `ServiceFactory`.
//! - `#[module]` — a catalog entry for a `ModuleProvider`.
//!
//! ```rust,ignore
//! use orchestra::prelude::*;
//!
//! #[service]
//! #[derive(Default)]
//! struct CrashReporter;
//!
//! impl Service for CrashReporter {
//!     fn priority() -> Priority {
//!         Priority::BOOT
//!     }
//!
//!     fn register(registry: &mut Registry<Self>) {
//!         registry.on(events::DID_FINISH_LAUNCHING, |_svc: &Self, _ctx: &Context| {});
//!     }
//! }
//! ```
//!
//! # Arguments
//!
//! | Argument | Applies to | Effect |
//! |----------|------------|--------|
//! | `name = "..."` | all | Catalog name instead of `crate.TypeName` |
//! | `crate = path` | all | Path to `orchestra_core` (default `::orchestra_core`) |
//! | `cstr` | `#[service]` | Write a NUL-terminated record instead of a `&str` record |
//! | `manual` | `#[service]` | Catalog entry only, no section record |

mod registration;

use proc_macro::TokenStream;
use syn::{Item, parse_macro_input};

use registration::{Args, Kind, expand};

fn attribute(kind: Kind, attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = Args::new(kind);
    let parser = syn::meta::parser(|meta| args.parse(meta));
    parse_macro_input!(attr with parser);
    let item = parse_macro_input!(item as Item);

    match expand(args, item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Registers a service type for discovery.
///
/// The type must implement `Service + Default`.
#[proc_macro_attribute]
pub fn service(attr: TokenStream, item: TokenStream) -> TokenStream {
    attribute(Kind::Service, attr, item)
}

/// Registers a factory type so definitions can name it.
///
/// The type must implement `ServiceFactory + Default`.
#[proc_macro_attribute]
pub fn factory(attr: TokenStream, item: TokenStream) -> TokenStream {
    attribute(Kind::Factory, attr, item)
}

/// Registers a module provider so configuration can list it.
///
/// The type must implement `ModuleProvider + Default`.
#[proc_macro_attribute]
pub fn module(attr: TokenStream, item: TokenStream) -> TokenStream {
    attribute(Kind::Module, attr, item)
}
