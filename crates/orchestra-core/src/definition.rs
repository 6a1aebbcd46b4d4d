//! Service definitions and discovery sources.
//!
//! A [`ServiceDefinition`] says *which* service type to merge and with what
//! overrides.  Definitions come from [`ServiceLoader`]s (section scanner,
//! modules, manifest) or are built directly by the host.  The type can be
//! named by string; the orchestrator resolves names through the
//! [catalog](crate::catalog) when it merges them.

use std::fmt;

use serde_json::Value;

use crate::context::Args;
use crate::service::{FactoryType, Service, ServiceFactory, ServiceType};
use crate::types::{Priority, RetentionPolicy};

/// The service type a definition refers to.
#[derive(Debug, Clone)]
pub enum ServiceRef {
    /// A concrete type.
    Type(ServiceType),
    /// A catalog name such as `"app.CrashReporter"`.
    Named(String),
}

/// The factory a definition builds its instance with.
#[derive(Debug, Clone)]
pub enum FactoryRef {
    /// A concrete factory type.
    Type(FactoryType),
    /// A catalog name.
    Named(String),
}

/// Immutable descriptor of one service to merge.
///
/// ```rust
/// use orchestra_core::{ServiceDefinition, Priority, RetentionPolicy};
///
/// let def = ServiceDefinition::named("app.PushService")
///     .priority(Priority::HIGH)
///     .retention(RetentionPolicy::Hold)
///     .arg("endpoint", "https://push.example");
/// assert_eq!(def.args.get_as::<String>("endpoint").as_deref(), Some("https://push.example"));
/// ```
#[derive(Clone)]
pub struct ServiceDefinition {
    /// Service type.
    pub service: ServiceRef,
    /// Optional factory; without one the type is built with `Default`.
    pub factory: Option<FactoryRef>,
    /// Priority override.
    pub priority: Option<Priority>,
    /// Retention override.
    pub retention: Option<RetentionPolicy>,
    /// Static arguments passed to the factory and to every handler context.
    pub args: Args,
}

impl ServiceDefinition {
    /// Definition for a concrete type.
    pub fn of<T: Service + Default>() -> Self {
        Self::from_type(ServiceType::of::<T>())
    }

    /// Definition for an already built type handle.
    pub fn from_type(ty: ServiceType) -> Self {
        Self::with_ref(ServiceRef::Type(ty))
    }

    /// Definition for a type known only by catalog name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::with_ref(ServiceRef::Named(name.into()))
    }

    fn with_ref(service: ServiceRef) -> Self {
        Self {
            service,
            factory: None,
            priority: None,
            retention: None,
            args: Args::default(),
        }
    }

    /// Overrides the type's default priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Overrides the type's default retention.
    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Replaces the static arguments.
    pub fn args(mut self, args: impl Into<Args>) -> Self {
        self.args = args.into();
        self
    }

    /// Adds one static argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key, value);
        self
    }

    /// Builds instances through `F`.
    pub fn factory<F: ServiceFactory + Default>(mut self) -> Self {
        self.factory = Some(FactoryRef::Type(FactoryType::of::<F>()));
        self
    }

    /// Builds instances through a factory known by catalog name.
    pub fn factory_named(mut self, name: impl Into<String>) -> Self {
        self.factory = Some(FactoryRef::Named(name.into()));
        self
    }

    /// A short label for logs: the type name or the unresolved catalog name.
    pub fn label(&self) -> &str {
        match &self.service {
            ServiceRef::Type(ty) => ty.type_name(),
            ServiceRef::Named(name) => name,
        }
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("service", &self.service)
            .field("factory", &self.factory)
            .field("priority", &self.priority)
            .field("retention", &self.retention)
            .field("args", self.args.as_map())
            .finish()
    }
}

// =============================================================================
// ServiceLoader — discovery source contract
// =============================================================================

/// A discovery source.
///
/// `load` may be called more than once (bootstrap, then incremental
/// registration) and must be safely repeatable; the merger deduplicates by
/// type, so returning the same definitions again is harmless.
pub trait ServiceLoader: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Produces definitions.  Failures are logged by the loader and yield
    /// fewer definitions, never an error.
    fn load(&self) -> Vec<ServiceDefinition>;
}

/// A loader over a fixed list of definitions.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    name: String,
    definitions: Vec<ServiceDefinition>,
}

impl StaticLoader {
    /// Creates a loader returning `definitions` on every call.
    pub fn new(name: impl Into<String>, definitions: Vec<ServiceDefinition>) -> Self {
        Self {
            name: name.into(),
            definitions,
        }
    }
}

impl ServiceLoader for StaticLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Vec<ServiceDefinition> {
        self.definitions.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::service::{Registry, SharedService};
    use serde_json::json;

    #[derive(Default)]
    struct Push;

    impl Service for Push {
        fn register(registry: &mut Registry<Self>) {
            registry.on("appReady", |_: &Self, _: &Context| {});
        }
    }

    #[derive(Default)]
    struct PushFactory;

    impl ServiceFactory for PushFactory {
        fn make(
            &self,
            _ctx: &Context,
            _args: &Args,
        ) -> Result<SharedService, crate::error::BoxError> {
            Ok(SharedService::new(Push))
        }
    }

    #[test]
    fn test_builder_sets_overrides() {
        let def = ServiceDefinition::of::<Push>()
            .priority(Priority::LOW)
            .retention(RetentionPolicy::Hold)
            .arg("topic", json!(["news"]))
            .factory::<PushFactory>();

        assert!(matches!(def.service, ServiceRef::Type(_)));
        assert!(matches!(def.factory, Some(FactoryRef::Type(_))));
        assert_eq!(def.priority, Some(Priority::LOW));
        assert_eq!(def.retention, Some(RetentionPolicy::Hold));
        assert_eq!(def.args.get("topic"), Some(&json!(["news"])));
        assert!(def.label().ends_with("Push"));
    }

    #[test]
    fn test_debug_lists_all_fields() {
        let def = ServiceDefinition::named("app.Push").factory_named("app.PushFactory");
        let text = format!("{def:?}");
        for field in ["service", "factory", "priority", "retention", "args"] {
            assert!(text.contains(field), "{text}");
        }
        assert!(text.contains("app.PushFactory"));
    }

    #[test]
    fn test_static_loader_is_repeatable() {
        let loader = StaticLoader::new("fixed", vec![ServiceDefinition::of::<Push>()]);
        assert_eq!(loader.name(), "fixed");
        assert_eq!(loader.load().len(), 1);
        assert_eq!(loader.load().len(), 1);
    }
}
