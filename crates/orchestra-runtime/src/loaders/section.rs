use std::collections::BTreeSet;

use orchestra_core::{
    CStrRecord, ScanOptions, SectionKind, SectionScanner, ServiceDefinition, ServiceLoader,
    StaticStrRecord, catalog,
};
use tracing::{debug, warn};

/// Discovers services from the identifier sections of the loaded images.
///
/// Each identifier is looked up in the type catalog; names with no
/// registered type are logged and dropped.
#[derive(Debug, Clone)]
pub struct SectionLoader {
    name: String,
    kind: SectionKind,
    scanner: SectionScanner,
}

impl SectionLoader {
    pub fn new(kind: SectionKind, options: ScanOptions) -> Self {
        Self {
            name: format!("section:{}", kind.section_name()),
            kind,
            scanner: SectionScanner::new(options),
        }
    }

    /// Reads `&str` records.
    pub fn static_str(options: ScanOptions) -> Self {
        Self::new(SectionKind::StaticStr, options)
    }

    /// Reads NUL-terminated records.
    pub fn cstr(options: ScanOptions) -> Self {
        Self::new(SectionKind::CStr, options)
    }

    fn identifiers(&self) -> BTreeSet<String> {
        match self.kind {
            SectionKind::StaticStr => self.scanner.identifiers::<StaticStrRecord>(),
            SectionKind::CStr => self.scanner.identifiers::<CStrRecord>(),
        }
    }
}

impl ServiceLoader for SectionLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Vec<ServiceDefinition> {
        let mut definitions = Vec::new();
        for identifier in self.identifiers() {
            match catalog::service_type(&identifier) {
                Some(ty) => {
                    debug!(identifier = %identifier, ty = ty.type_name(), "Resolved section identifier");
                    definitions.push(ServiceDefinition::from_type(ty));
                }
                None => warn!(
                    identifier = %identifier,
                    section = self.kind.section_name(),
                    "No service type registered under section identifier, dropping"
                ),
            }
        }
        definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::{Context, Registry, Service, ServiceRef};
    use orchestra_macros::service;

    #[service]
    #[derive(Default)]
    struct SectionProbe;

    impl Service for SectionProbe {
        fn register(registry: &mut Registry<Self>) {
            registry.on("probe", |_: &Self, _: &Context| {});
        }
    }

    #[service(cstr)]
    #[derive(Default)]
    struct CSectionProbe;

    impl Service for CSectionProbe {
        fn register(registry: &mut Registry<Self>) {
            registry.on("probe", |_: &Self, _: &Context| {});
        }
    }

    const ORPHAN_NAME: &str = "orchestra_runtime.NoSuchService";

    // A record with no catalog entry behind it.
    #[orchestra_core::linkme::distributed_slice(orchestra_core::section::ORCHESTRA_SVC)]
    #[linkme(crate = orchestra_core::linkme)]
    static ORPHAN: StaticStrRecord = StaticStrRecord::new(ORPHAN_NAME);

    fn resolved_names(loader: &SectionLoader) -> Vec<&'static str> {
        loader
            .load()
            .into_iter()
            .filter_map(|def| match def.service {
                ServiceRef::Type(ty) => Some(ty.type_name()),
                ServiceRef::Named(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_static_section_resolves_through_catalog() {
        let loader = SectionLoader::static_str(ScanOptions::default());
        assert_eq!(loader.name(), "section:linkme_ORCHESTRA_SVC");

        let names = resolved_names(&loader);
        assert!(
            names.iter().any(|n| n.ends_with("SectionProbe") && !n.ends_with("CSectionProbe")),
            "{names:?}"
        );
        assert!(!names.iter().any(|n| n.ends_with("CSectionProbe")));
        assert!(loader.identifiers().contains(ORPHAN_NAME));
        assert!(!names.iter().any(|n| n.contains("NoSuchService")));
    }

    #[test]
    fn test_cstr_section() {
        let loader = SectionLoader::cstr(ScanOptions::default());
        let names = resolved_names(&loader);
        assert!(names.iter().any(|n| n.ends_with("CSectionProbe")), "{names:?}");
    }

    #[test]
    fn test_repeated_load_is_stable() {
        let loader = SectionLoader::static_str(ScanOptions::default());
        assert_eq!(resolved_names(&loader), resolved_names(&loader));
    }
}
