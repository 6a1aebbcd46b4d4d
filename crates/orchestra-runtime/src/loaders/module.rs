use orchestra_core::{ServiceDefinition, ServiceLoader, catalog};
use tracing::{debug, warn};

/// Asks each configured module for its services, in list order.
#[derive(Debug, Clone, Default)]
pub struct ModuleLoader {
    modules: Vec<String>,
}

impl ModuleLoader {
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }
}

impl ServiceLoader for ModuleLoader {
    fn name(&self) -> &str {
        "modules"
    }

    fn load(&self) -> Vec<ServiceDefinition> {
        let mut definitions = Vec::new();
        for name in &self.modules {
            let Some(module) = catalog::module(name) else {
                warn!(module = %name, "Unknown module, skipping");
                continue;
            };
            let provided = module.provide_services();
            debug!(module = %name, services = provided.len(), "Module provided services");
            definitions.extend(provided);
        }
        definitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::{Context, ModuleProvider, Priority, Registry, Service};
    use orchestra_macros::module;

    #[derive(Default)]
    struct Analytics;

    impl Service for Analytics {
        fn register(registry: &mut Registry<Self>) {
            registry.on("appReady", |_: &Self, _: &Context| {});
        }
    }

    #[module(name = "test.AnalyticsModule")]
    #[derive(Default)]
    struct AnalyticsModule;

    impl ModuleProvider for AnalyticsModule {
        fn provide_services(&self) -> Vec<ServiceDefinition> {
            vec![
                ServiceDefinition::of::<Analytics>().priority(Priority::LOW),
                ServiceDefinition::named("test.Remote"),
            ]
        }
    }

    #[test]
    fn test_modules_are_resolved_in_order() {
        let loader = ModuleLoader::new(["test.AnalyticsModule", "test.Missing"]);
        let defs = loader.load();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].priority, Some(Priority::LOW));
        assert_eq!(defs[1].label(), "test.Remote");
    }

    #[test]
    fn test_empty_module_list() {
        assert!(ModuleLoader::default().load().is_empty());
    }
}
