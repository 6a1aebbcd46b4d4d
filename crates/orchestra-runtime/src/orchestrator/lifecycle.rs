//! Instance lifecycle: construction on the main context and the resident
//! table.
//!
//! None of these functions may be called with the state lock held.  They take
//! it themselves for the resident lookup and the write-back, and release it
//! before handing work to the main context.

use std::sync::Arc;

use orchestra_core::{ConstructError, Context, SharedService, events};
use tracing::{debug, trace, warn};

use super::Orchestrator;
use super::merge::ResolvedDefinition;
use crate::main_context::MainContextError;

impl Orchestrator {
    /// Returns an instance for one entry.
    ///
    /// Held services come from the resident table when present.  Otherwise a
    /// new instance is built and, for held services, written back; if another
    /// thread stored one first, that one is returned and ours is dropped.
    pub(super) fn obtain(
        &self,
        definition: &Arc<ResolvedDefinition>,
        ctx: &Context,
    ) -> Result<SharedService, ConstructError> {
        if definition.is_held() {
            let resident = self.state.lock().residents.get(definition.id()).cloned();
            if let Some(resident) = resident {
                return Ok(resident);
            }
        }

        let instance = self.construct(definition, ctx)?;
        if !definition.is_held() {
            return Ok(instance);
        }

        let mut state = self.state.lock();
        let stored = state
            .residents
            .entry(definition.id())
            .or_insert_with(|| instance.clone())
            .clone();
        drop(state);

        if stored.ptr_eq(&instance) {
            debug!(service = definition.id(), "Resident instance stored");
        } else {
            trace!(service = definition.id(), "Lost construction race, using stored instance");
        }
        Ok(stored)
    }

    /// Builds an instance on the main context and runs `did_resolve` there.
    fn construct(
        &self,
        definition: &Arc<ResolvedDefinition>,
        ctx: &Context,
    ) -> Result<SharedService, ConstructError> {
        let service = definition.id();
        let job_definition = Arc::clone(definition);
        let job_ctx = ctx.clone();

        self.main
            .run_sync(move || build(&job_definition, &job_ctx))
            .map_err(|e| match e {
                MainContextError::Panicked(message) => ConstructError::Panicked {
                    service: service.to_string(),
                    message,
                },
                other => ConstructError::MainContext(other.to_string()),
            })?
    }

    /// Builds every eager definition.  Failures are logged and left for the
    /// first firing to retry.
    pub(super) fn instantiate_eager(&self, eager: Vec<Arc<ResolvedDefinition>>) {
        for definition in eager {
            let ctx = Context::new(events::EAGER_LOAD).with_args(definition.args.clone());
            match self.obtain(&definition, &ctx) {
                Ok(_) => debug!(service = definition.id(), "Eager service ready"),
                Err(e) => warn!(service = definition.id(), error = %e, "Eager construction failed"),
            }
        }
    }
}

/// Runs on the main context.
fn build(
    definition: &ResolvedDefinition,
    ctx: &Context,
) -> Result<SharedService, ConstructError> {
    let instance = match &definition.factory {
        None => definition.service.construct(),
        Some(factory) => {
            let made = factory.make(ctx, &definition.args).map_err(|source| {
                ConstructError::Factory {
                    factory: factory.type_name(),
                    service: definition.id().to_string(),
                    source,
                }
            })?;
            if made.type_id() != definition.service.type_id() {
                return Err(ConstructError::WrongType {
                    factory: factory.type_name(),
                    expected: definition.service.type_name(),
                    actual: made.type_name(),
                });
            }
            made
        }
    };
    instance.as_service().did_resolve();
    Ok(instance)
}

#[cfg(test)]
mod tests {
    use super::super::testing::orchestrator;
    use super::*;
    use orchestra_core::{
        Args, BoxError, Outcome, Registry, RetentionPolicy, ReturnValue, Service,
        ServiceDefinition, ServiceFactory,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::{self, ThreadId};

    // ─── Held, eager ─────────────────────────────────────────────────────────

    static CONFIG_BUILT: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct ConfigStore;

    impl Service for ConfigStore {
        fn id() -> &'static str {
            "test.ConfigStore"
        }

        fn retention() -> RetentionPolicy {
            RetentionPolicy::Hold
        }

        fn is_lazy() -> bool {
            false
        }

        fn register(registry: &mut Registry<Self>) {
            registry.on("read", |_: &Self, _: &Context| {});
        }

        fn did_resolve(&self) {
            CONFIG_BUILT.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_eager_service_is_visible_before_any_firing() {
        let orchestrator = orchestrator();
        orchestrator.register_service::<ConfigStore>();

        let resident = orchestrator.service("test.ConfigStore").expect("eager instance");
        assert!(resident.is::<ConfigStore>());
        assert_eq!(CONFIG_BUILT.load(Ordering::SeqCst), 1);

        orchestrator.fire_event("read");
        orchestrator.fire_event("read");
        assert_eq!(CONFIG_BUILT.load(Ordering::SeqCst), 1);
        assert!(orchestrator.service("test.ConfigStore").unwrap().ptr_eq(&resident));
    }

    // ─── Construction thread ─────────────────────────────────────────────────

    #[derive(Default)]
    struct ThreadProbe {
        built_on: Option<ThreadId>,
    }

    impl ThreadProbe {
        fn new() -> Self {
            Self {
                built_on: Some(thread::current().id()),
            }
        }
    }

    #[derive(Default)]
    struct ThreadProbeFactory;

    impl ServiceFactory for ThreadProbeFactory {
        fn make(&self, _ctx: &Context, _args: &Args) -> Result<SharedService, BoxError> {
            Ok(SharedService::new(ThreadProbe::new()))
        }
    }

    impl Service for ThreadProbe {
        fn register(registry: &mut Registry<Self>) {
            registry.on("where", |svc: &Self, _: &Context| {
                Outcome::stop(ReturnValue::any(svc.built_on))
            });
        }
    }

    #[test]
    fn test_construction_runs_on_main_context() {
        let orchestrator = orchestrator();
        orchestrator.register([ServiceDefinition::of::<ThreadProbe>().factory::<ThreadProbeFactory>()]);

        let main_id = orchestrator
            .main_context()
            .run_sync(|| thread::current().id())
            .unwrap();
        let built_on = orchestrator
            .fire_as::<Option<ThreadId>>("where", None, Default::default())
            .flatten();
        assert_eq!(built_on, Some(main_id));
        assert_ne!(built_on, Some(thread::current().id()));
    }

    // ─── Factories ───────────────────────────────────────────────────────────

    #[derive(Default)]
    struct Greeter {
        greeting: String,
    }

    impl Service for Greeter {
        fn register(registry: &mut Registry<Self>) {
            registry.on("greet", |svc: &Self, _: &Context| {
                Outcome::stop(ReturnValue::any(svc.greeting.clone()))
            });
        }
    }

    #[derive(Default)]
    struct GreeterFactory;

    impl ServiceFactory for GreeterFactory {
        fn make(&self, _ctx: &Context, args: &Args) -> Result<SharedService, BoxError> {
            let greeting = args
                .get_as::<String>("greeting")
                .ok_or("missing `greeting` argument")?;
            Ok(SharedService::new(Greeter { greeting }))
        }
    }

    #[derive(Default)]
    struct WrongFactory;

    impl ServiceFactory for WrongFactory {
        fn make(&self, _ctx: &Context, _args: &Args) -> Result<SharedService, BoxError> {
            Ok(SharedService::new(ThreadProbe::default()))
        }
    }

    #[test]
    fn test_factory_receives_static_args() {
        let orchestrator = orchestrator();
        orchestrator.register([ServiceDefinition::of::<Greeter>()
            .factory::<GreeterFactory>()
            .arg("greeting", "hello")]);

        let value = orchestrator.fire_as::<String>("greet", None, Default::default());
        assert_eq!(value.as_deref(), Some("hello"));
    }

    #[test]
    fn test_failing_factory_skips_entry() {
        let orchestrator = orchestrator();
        orchestrator.register([ServiceDefinition::of::<Greeter>().factory::<GreeterFactory>()]);

        let report = orchestrator.fire_with_report("greet", None, Default::default());
        assert!(report.value.is_void());
        assert_eq!(report.entries.len(), 1);
        assert!(report.entries[0].skipped);
        assert!(
            report.entries[0]
                .message
                .as_deref()
                .is_some_and(|m| m.contains("missing `greeting`"))
        );
    }

    #[test]
    fn test_factory_producing_wrong_type_is_rejected() {
        let orchestrator = orchestrator();
        orchestrator.register([ServiceDefinition::of::<Greeter>().factory::<WrongFactory>()]);

        let report = orchestrator.fire_with_report("greet", None, Default::default());
        assert!(report.entries[0].skipped);
        assert!(report.value.is_void());
    }

    // ─── Panicking constructor ───────────────────────────────────────────────

    struct Fragile;

    impl Default for Fragile {
        fn default() -> Self {
            panic!("cannot build")
        }
    }

    impl Service for Fragile {
        fn register(registry: &mut Registry<Self>) {
            registry.on("fragile", |_: &Self, _: &Context| Outcome::stop(true));
        }
    }

    #[test]
    fn test_panicking_constructor_is_contained() {
        let orchestrator = orchestrator();
        orchestrator.register_service::<Fragile>();

        let report = orchestrator.fire_with_report("fragile", None, Default::default());
        assert!(report.value.is_void());
        assert!(report.entries[0].skipped);

        // The main context survives the panic.
        assert_eq!(orchestrator.main_context().run_sync(|| 1).unwrap(), 1);
    }
}
