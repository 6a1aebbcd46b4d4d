//! Link-time type catalog.
//!
//! Maps the dotted names found in binary sections, manifests and module lists
//! (`"app.CrashReporter"`) to concrete types.  Entries are contributed by the
//! `#[service]`, `#[factory]` and `#[module]` attributes through `linkme`
//! distributed slices, so the catalog is complete before `main` runs and no
//! runtime registration call is needed.
//!
//! If two entries share a name the first one wins and a warning is emitted.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::OnceLock;

use linkme::distributed_slice;
use tracing::{trace, warn};

use crate::service::{FactoryType, ModuleType, ServiceType};

/// Catalog entry for a service type.
pub struct ServiceTypeEntry {
    /// Dotted catalog name.
    pub name: &'static str,
    /// Builds the type handle.
    pub resolve: fn() -> ServiceType,
}

/// Catalog entry for a factory type.
pub struct FactoryTypeEntry {
    /// Dotted catalog name.
    pub name: &'static str,
    /// Builds the type handle.
    pub resolve: fn() -> FactoryType,
}

/// Catalog entry for a module provider.
pub struct ModuleEntry {
    /// Dotted catalog name.
    pub name: &'static str,
    /// Builds the type handle.
    pub resolve: fn() -> ModuleType,
}

// =============================================================================
// Registries (linkme distributed slices)
// =============================================================================

/// Every service type declared with `#[service]`.
#[distributed_slice]
pub static SERVICE_TYPES: [ServiceTypeEntry];

/// Every factory type declared with `#[factory]`.
#[distributed_slice]
pub static FACTORY_TYPES: [FactoryTypeEntry];

/// Every module provider declared with `#[module]`.
#[distributed_slice]
pub static MODULE_TYPES: [ModuleEntry];

trait Named {
    fn name(&self) -> &'static str;
}

impl Named for ServiceTypeEntry {
    fn name(&self) -> &'static str {
        self.name
    }
}

impl Named for FactoryTypeEntry {
    fn name(&self) -> &'static str {
        self.name
    }
}

impl Named for ModuleEntry {
    fn name(&self) -> &'static str {
        self.name
    }
}

fn build_index<T: Named>(entries: &'static [T], kind: &str) -> HashMap<&'static str, &'static T> {
    let mut index = HashMap::with_capacity(entries.len());
    for entry in entries {
        match index.entry(entry.name()) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(_) => {
                warn!(
                    name = entry.name(),
                    kind, "Duplicate catalog name registered, using first"
                );
            }
        }
    }
    trace!(kind, count = index.len(), "Catalog index built");
    index
}

/// Looks up a service type by catalog name.
pub fn service_type(name: &str) -> Option<ServiceType> {
    static INDEX: OnceLock<HashMap<&'static str, &'static ServiceTypeEntry>> = OnceLock::new();
    INDEX
        .get_or_init(|| build_index(&SERVICE_TYPES, "service"))
        .get(name)
        .map(|entry| (entry.resolve)())
}

/// Looks up a factory type by catalog name.
pub fn factory_type(name: &str) -> Option<FactoryType> {
    static INDEX: OnceLock<HashMap<&'static str, &'static FactoryTypeEntry>> = OnceLock::new();
    INDEX
        .get_or_init(|| build_index(&FACTORY_TYPES, "factory"))
        .get(name)
        .map(|entry| (entry.resolve)())
}

/// Looks up a module provider by catalog name.
pub fn module(name: &str) -> Option<ModuleType> {
    static INDEX: OnceLock<HashMap<&'static str, &'static ModuleEntry>> = OnceLock::new();
    INDEX
        .get_or_init(|| build_index(&MODULE_TYPES, "module"))
        .get(name)
        .map(|entry| (entry.resolve)())
}

/// Names of every registered service type, in slice order.
pub fn service_names() -> impl Iterator<Item = &'static str> {
    SERVICE_TYPES.iter().map(|entry| entry.name)
}
