//! Service, factory and module contracts.
//!
//! A **service** is a zero-argument constructible type that declares, through
//! its static [`Service::register`] routine, which events it handles.  The
//! orchestrator never calls user types directly; it works with the erased
//! handles defined here:
//!
//! - [`ServiceType`] — everything the merger needs about a concrete service
//!   type (identity, defaults, constructor, registration routine).
//! - [`SharedService`] — one live instance, viewable both as a
//!   `dyn Service` and as `dyn Any` for downcasting.
//! - [`FactoryType`] / [`ModuleType`] — the same idea for factories and
//!   module providers.
//!
//! # Example
//!
//! ```rust
//! use orchestra_core::{Context, Outcome, Priority, Registry, RetentionPolicy, Service, events};
//!
//! #[derive(Default)]
//! struct CrashReporter;
//!
//! impl Service for CrashReporter {
//!     fn priority() -> Priority {
//!         Priority::BOOT
//!     }
//!
//!     fn retention() -> RetentionPolicy {
//!         RetentionPolicy::Hold
//!     }
//!
//!     fn register(registry: &mut Registry<Self>) {
//!         registry.on(events::DID_FINISH_LAUNCHING, |_svc: &Self, _ctx: &Context| {
//!             Outcome::next()
//!         });
//!     }
//! }
//! ```

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::{Args, Context};
use crate::error::{BoxError, HandlerError};
use crate::event::Event;
use crate::outcome::{IntoOutcome, Outcome};
use crate::types::{Priority, RetentionPolicy};

// =============================================================================
// Service Trait
// =============================================================================

/// A unit of work that registers interest in lifecycle events.
///
/// The static items describe the type's defaults; a [`ServiceDefinition`]
/// may override priority and retention.
///
/// [`ServiceDefinition`]: crate::definition::ServiceDefinition
pub trait Service: Any + Send + Sync {
    /// Key of the resident table.  Defaults to the type name.
    fn id() -> &'static str
    where
        Self: Sized,
    {
        type_name::<Self>()
    }

    /// Default priority.
    fn priority() -> Priority
    where
        Self: Sized,
    {
        Priority::MEDIUM
    }

    /// Default retention.
    fn retention() -> RetentionPolicy
    where
        Self: Sized,
    {
        RetentionPolicy::Destroy
    }

    /// When `false` and the effective retention is [`RetentionPolicy::Hold`],
    /// the instance is built at bootstrap instead of on first use.
    fn is_lazy() -> bool
    where
        Self: Sized,
    {
        true
    }

    /// Declares the events this type handles.
    fn register(registry: &mut Registry<Self>)
    where
        Self: Sized;

    /// Called once right after construction, on the main context.
    fn did_resolve(&self) {}
}

// =============================================================================
// Registry — collects (event, handler) interests
// =============================================================================

/// Type-erased handler bound to one service type.
pub type ErasedHandler =
    Arc<dyn Fn(&SharedService, &Context) -> Result<Outcome, HandlerError> + Send + Sync>;

/// One declared `(event, handler)` pair.
#[derive(Clone)]
pub struct Interest {
    /// Event the handler listens to.
    pub event: Event,
    /// The erased handler.
    pub handler: ErasedHandler,
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interest")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// Registration target handed to [`Service::register`].
pub struct Registry<T> {
    interests: Vec<Interest>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Service> Registry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            interests: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Binds `handler` to `event`.
    ///
    /// The handler may return anything implementing [`IntoOutcome`].  Several
    /// handlers of one type may listen to the same event; they run in
    /// declaration order.
    pub fn on<F, R>(&mut self, event: impl Into<Event>, handler: F) -> &mut Self
    where
        F: Fn(&T, &Context) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        let erased: ErasedHandler = Arc::new(move |instance: &SharedService, ctx: &Context| {
            let service =
                instance
                    .downcast_ref::<T>()
                    .ok_or_else(|| HandlerError::TypeMismatch {
                        expected: type_name::<T>(),
                        actual: instance.type_name(),
                    })?;
            handler(service, ctx)
                .into_outcome()
                .map_err(HandlerError::Failed)
        });
        self.interests.push(Interest {
            event: event.into(),
            handler: erased,
        });
        self
    }

    /// Number of declared interests.
    pub fn len(&self) -> usize {
        self.interests.len()
    }

    /// Returns `true` if nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.interests.is_empty()
    }

    /// Consumes the registry.
    pub fn into_interests(self) -> Vec<Interest> {
        self.interests
    }
}

impl<T: Service> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SharedService — one live instance
// =============================================================================

/// A live service instance shared between the resident table and firings.
///
/// Both views point at the same allocation, so [`ptr_eq`](Self::ptr_eq) is an
/// identity check.
#[derive(Clone)]
pub struct SharedService {
    service: Arc<dyn Service>,
    any: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl SharedService {
    /// Wraps a freshly built instance.
    pub fn new<T: Service>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an existing `Arc`.
    pub fn from_arc<T: Service>(value: Arc<T>) -> Self {
        Self {
            service: value.clone(),
            any: value,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Returns a typed `Arc` to the instance.
    pub fn downcast<T: Service>(&self) -> Option<Arc<T>> {
        self.any.clone().downcast::<T>().ok()
    }

    /// Borrows the instance as `T`.
    pub fn downcast_ref<T: Service>(&self) -> Option<&T> {
        self.any.downcast_ref::<T>()
    }

    /// Returns `true` if the instance is a `T`.
    pub fn is<T: Service>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// The instance as a trait object.
    pub fn as_service(&self) -> &dyn Service {
        self.service.as_ref()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &SharedService) -> bool {
        Arc::ptr_eq(&self.any, &other.any)
    }

    /// `TypeId` of the concrete type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the concrete type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for SharedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedService")
            .field("type", &self.type_name)
            .field("ptr", &Arc::as_ptr(&self.any))
            .finish()
    }
}

// =============================================================================
// ServiceType — runtime handle of a concrete service type
// =============================================================================

/// Runtime description of a concrete service type.
#[derive(Clone, Copy)]
pub struct ServiceType {
    type_id: TypeId,
    type_name: &'static str,
    id: &'static str,
    priority: Priority,
    retention: RetentionPolicy,
    lazy: bool,
    construct: fn() -> SharedService,
    register: fn() -> Vec<Interest>,
}

impl ServiceType {
    /// Builds the handle for `T`.
    pub fn of<T: Service + Default>() -> Self {
        fn construct<T: Service + Default>() -> SharedService {
            SharedService::new(T::default())
        }

        fn register<T: Service>() -> Vec<Interest> {
            let mut registry = Registry::<T>::new();
            T::register(&mut registry);
            registry.into_interests()
        }

        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            id: T::id(),
            priority: T::priority(),
            retention: T::retention(),
            lazy: T::is_lazy(),
            construct: construct::<T>,
            register: register::<T>,
        }
    }

    /// Identity used for deduplication.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Service id (resident table key).
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// Default priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Default retention.
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Laziness flag.
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Builds an instance with no arguments.  Does not call `did_resolve`.
    pub fn construct(&self) -> SharedService {
        (self.construct)()
    }

    /// Runs the type's registration routine.
    pub fn interests(&self) -> Vec<Interest> {
        (self.register)()
    }
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceType {}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceType")
            .field("type_name", &self.type_name)
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("retention", &self.retention)
            .field("lazy", &self.lazy)
            .finish()
    }
}

// =============================================================================
// Factories
// =============================================================================

/// Builds service instances on behalf of a definition.
///
/// The factory itself is constructed with no arguments for every instance it
/// is asked to build.
pub trait ServiceFactory: Send + Sync + 'static {
    /// Builds one instance.
    fn make(&self, ctx: &Context, args: &Args) -> Result<SharedService, BoxError>;
}

/// Runtime handle of a concrete factory type.
#[derive(Clone, Copy)]
pub struct FactoryType {
    type_name: &'static str,
    construct: fn() -> Box<dyn ServiceFactory>,
}

impl FactoryType {
    /// Builds the handle for `F`.
    pub fn of<F: ServiceFactory + Default>() -> Self {
        fn construct<F: ServiceFactory + Default>() -> Box<dyn ServiceFactory> {
            Box::new(F::default())
        }

        Self {
            type_name: type_name::<F>(),
            construct: construct::<F>,
        }
    }

    /// Rust type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Instantiates the factory and asks it for one instance.
    pub fn make(&self, ctx: &Context, args: &Args) -> Result<SharedService, BoxError> {
        (self.construct)().make(ctx, args)
    }
}

impl fmt::Debug for FactoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FactoryType").field(&self.type_name).finish()
    }
}

// =============================================================================
// Modules
// =============================================================================

/// A module entry point that lists its own services.
///
/// Modules are named in configuration and looked up in the catalog.
pub trait ModuleProvider: Send + Sync + 'static {
    /// Returns the module's service definitions.
    fn provide_services(&self) -> Vec<crate::definition::ServiceDefinition>;
}

/// Runtime handle of a concrete module type.
#[derive(Clone, Copy)]
pub struct ModuleType {
    type_name: &'static str,
    construct: fn() -> Box<dyn ModuleProvider>,
}

impl ModuleType {
    /// Builds the handle for `M`.
    pub fn of<M: ModuleProvider + Default>() -> Self {
        fn construct<M: ModuleProvider + Default>() -> Box<dyn ModuleProvider> {
            Box::new(M::default())
        }

        Self {
            type_name: type_name::<M>(),
            construct: construct::<M>,
        }
    }

    /// Rust type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Instantiates the module and collects its definitions.
    pub fn provide_services(&self) -> Vec<crate::definition::ServiceDefinition> {
        (self.construct)().provide_services()
    }
}

impl fmt::Debug for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleType").field(&self.type_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ReturnValue;

    #[derive(Default)]
    struct Greeter {
        greeting: &'static str,
    }

    impl Service for Greeter {
        fn id() -> &'static str {
            "test.Greeter"
        }

        fn retention() -> RetentionPolicy {
            RetentionPolicy::Hold
        }

        fn register(registry: &mut Registry<Self>) {
            registry
                .on("hello", |svc: &Self, _ctx: &Context| {
                    Outcome::stop(ReturnValue::any(svc.greeting))
                })
                .on("bye", |_svc: &Self, _ctx: &Context| {});
        }
    }

    #[derive(Default)]
    struct Other;

    impl Service for Other {
        fn register(_registry: &mut Registry<Self>) {}
    }

    #[test]
    fn test_service_type_captures_defaults() {
        let ty = ServiceType::of::<Greeter>();
        assert_eq!(ty.id(), "test.Greeter");
        assert_eq!(ty.priority(), Priority::MEDIUM);
        assert_eq!(ty.retention(), RetentionPolicy::Hold);
        assert!(ty.is_lazy());
        assert_eq!(ty.interests().len(), 2);
        assert_eq!(ty, ServiceType::of::<Greeter>());
        assert_ne!(ty, ServiceType::of::<Other>());

        let other = ServiceType::of::<Other>();
        assert!(other.id().ends_with("Other"));
        assert!(other.interests().is_empty());
    }

    #[test]
    fn test_erased_handler_runs_on_matching_instance() {
        let ty = ServiceType::of::<Greeter>();
        let interests = ty.interests();
        let instance = SharedService::new(Greeter { greeting: "hi" });
        let ctx = Context::new(Event::from_static("hello"));

        let outcome = (interests[0].handler)(&instance, &ctx).unwrap();
        match outcome {
            Outcome::Stop { value, .. } => assert_eq!(value.value::<&str>(), Some("hi")),
            other => panic!("expected stop, got {other:?}"),
        }
    }

    #[test]
    fn test_erased_handler_rejects_wrong_instance() {
        let interests = ServiceType::of::<Greeter>().interests();
        let wrong = SharedService::new(Other);
        let ctx = Context::new(Event::from_static("hello"));

        let err = (interests[0].handler)(&wrong, &ctx).unwrap_err();
        assert!(matches!(err, HandlerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_shared_service_identity() {
        let a = SharedService::new(Greeter::default());
        let b = a.clone();
        let c = SharedService::new(Greeter::default());
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert!(a.is::<Greeter>());
        assert!(a.downcast::<Other>().is_none());
        assert!(a.downcast::<Greeter>().is_some());
    }
}
