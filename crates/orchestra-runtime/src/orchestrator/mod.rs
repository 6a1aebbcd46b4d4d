//! The orchestrator: merge, lifecycle and dispatch.
//!
//! # Locking
//!
//! All shared state (merged types, resident instances, event cache) sits
//! behind one `parking_lot::Mutex`.  It is held for lookups, inserts and
//! sorts only.  Service construction, registration routines, loaders and
//! handlers are user code and always run with the lock released, because
//! any of them may call back into the orchestrator.
//!
//! Bootstrap is serialized separately by a reentrant guard, so a loader that
//! fires an event on the bootstrapping thread sees the partially built cache
//! instead of deadlocking.
//!
//! ```text
//!   resolve() / first fire()
//!        │
//!        ▼
//!   loaders ──▶ resolve_refs ──▶ prepare ──▶ State::apply ──▶ eager construction
//!                (no lock)       (no lock)     (lock)          (main context)
//!
//!   fire(event)
//!        │
//!        ▼
//!   snapshot entries + residents (lock) ──▶ for each entry: obtain ──▶ handler
//! ```

mod dispatch;
mod lifecycle;
mod merge;

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use orchestra_core::{
    Event, Priority, RetentionPolicy, Service, ServiceDefinition, ServiceLoader, SharedService,
};
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, error, info, info_span, warn};

use crate::config::{OrchestratorConfig, load_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::loaders;
use crate::main_context::{MainContext, panic_message};

pub use dispatch::{EntryOutcome, FireReport};
use merge::{ResolvedDefinition, State};

/// Diagnostic view of one cached entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Service id.
    pub service: &'static str,
    /// Rust type name.
    pub type_name: &'static str,
    /// Effective priority.
    pub priority: Priority,
    /// Effective retention.
    pub retention: RetentionPolicy,
    /// Built at bootstrap.
    pub eager: bool,
}

/// Process-local service orchestrator.
///
/// ```rust,ignore
/// use orchestra_runtime::prelude::*;
///
/// let orchestrator = Orchestrator::builder().build()?;
/// orchestrator.resolve();
/// let handled = orchestrator.fire_as::<bool>(events::OPEN_URL, None, params);
/// ```
pub struct Orchestrator {
    state: Mutex<State>,
    /// `true` while this thread is running the loaders.
    bootstrap: ReentrantMutex<Cell<bool>>,
    bootstrapped: AtomicBool,
    loaders: Vec<Arc<dyn ServiceLoader>>,
    main: MainContext,
}

impl Orchestrator {
    /// Starts building an orchestrator.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Builds an orchestrator with the loaders enabled by `config`.
    pub fn from_config(config: OrchestratorConfig) -> RuntimeResult<Self> {
        Self::builder().config(config).build()
    }

    /// The main context that constructs services.
    pub fn main_context(&self) -> &MainContext {
        &self.main
    }

    /// Returns `true` once discovery has run.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Merges definitions and builds the eager ones.
    ///
    /// Types that are already merged are skipped, so registering the same
    /// definitions again is harmless.  Does not trigger bootstrap.
    pub fn register(&self, definitions: impl IntoIterator<Item = ServiceDefinition>) {
        let eager = self.merge(definitions.into_iter().collect());
        self.instantiate_eager(eager);
    }

    /// Registers `T` with its own defaults.
    pub fn register_service<T: Service + Default>(&self) {
        self.register([ServiceDefinition::of::<T>()]);
    }

    /// Runs the configured loaders once.
    ///
    /// Returns `true` if this call performed the bootstrap.
    pub fn resolve(&self) -> bool {
        self.bootstrap(&self.loaders)
    }

    /// Runs `loaders` instead of the configured ones, once.
    pub fn resolve_with(&self, loaders: &[Arc<dyn ServiceLoader>]) -> bool {
        self.bootstrap(loaders)
    }

    fn bootstrap(&self, loaders: &[Arc<dyn ServiceLoader>]) -> bool {
        if self.is_bootstrapped() {
            return false;
        }
        let guard = self.bootstrap.lock();
        if self.is_bootstrapped() || guard.get() {
            // Finished on another thread, or re-entered from a loader.
            return false;
        }
        guard.set(true);

        let span = info_span!("bootstrap", loaders = loaders.len());
        let _enter = span.enter();
        let started = Instant::now();

        let mut definitions = Vec::new();
        for loader in loaders {
            match catch_unwind(AssertUnwindSafe(|| loader.load())) {
                Ok(found) => {
                    debug!(loader = loader.name(), definitions = found.len(), "Loader finished");
                    definitions.extend(found);
                }
                Err(payload) => error!(
                    loader = loader.name(),
                    panic = %panic_message(payload.as_ref()),
                    "Loader panicked, skipping"
                ),
            }
        }
        let discovered = definitions.len();
        let eager = self.merge(definitions);

        self.bootstrapped.store(true, Ordering::Release);
        guard.set(false);
        drop(guard);

        // Construction may fire events from the main context; the guard must
        // be free by then.
        let eager_count = eager.len();
        self.instantiate_eager(eager);
        info!(
            definitions = discovered,
            eager = eager_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Bootstrap complete"
        );
        true
    }

    /// Merges a batch.  Takes the state lock twice, never across user code.
    fn merge(&self, definitions: Vec<ServiceDefinition>) -> Vec<Arc<ResolvedDefinition>> {
        if definitions.is_empty() {
            return Vec::new();
        }
        let candidates: Vec<_> = definitions
            .into_iter()
            .filter_map(merge::resolve_refs)
            .collect();

        let pending: Vec<_> = {
            let state = self.state.lock();
            let mut seen = HashSet::new();
            candidates
                .into_iter()
                .filter(|c| !state.is_merged(c.type_id()) && seen.insert(c.type_id()))
                .collect()
        };

        let prepared: Vec<_> = pending.into_iter().filter_map(merge::prepare).collect();
        self.state.lock().apply(prepared)
    }

    // ─── Lookup ──────────────────────────────────────────────────────────────

    /// The resident instance for `id`, if one has been built.
    ///
    /// Never constructs anything.
    pub fn service(&self, id: &str) -> Option<SharedService> {
        self.state.lock().residents.get(id).cloned()
    }

    /// The resident instance of `T`, if one has been built.
    pub fn service_of<T: Service>(&self) -> Option<Arc<T>> {
        self.service(T::id()).and_then(|s| s.downcast::<T>())
    }

    /// The cached entries for `event`, in dispatch order.
    pub fn entries_for(&self, event: impl Into<Event>) -> Vec<EntryInfo> {
        let event = event.into();
        let list = self.state.lock().cache.get(&event).cloned();
        list.map(|list| {
            list.iter()
                .map(|entry| {
                    let def = &entry.definition;
                    EntryInfo {
                        service: def.id(),
                        type_name: def.service.type_name(),
                        priority: def.priority,
                        retention: def.retention,
                        eager: def.eager,
                    }
                })
                .collect()
        })
        .unwrap_or_default()
    }

    // ─── Global instance ─────────────────────────────────────────────────────

    /// The process-wide orchestrator.
    ///
    /// Built from [`load_config`] on first use; a configuration error falls
    /// back to the defaults with a warning.
    pub fn global() -> RuntimeResult<&'static Orchestrator> {
        if let Some(existing) = GLOBAL.get() {
            return Ok(existing);
        }
        let config = load_config().unwrap_or_else(|e| {
            warn!(error = %e, "Configuration unavailable, using defaults");
            OrchestratorConfig::default()
        });
        let candidate = Orchestrator::from_config(config)?;
        Ok(GLOBAL.get_or_init(|| candidate))
    }

    /// Installs `orchestrator` as the process-wide instance.
    pub fn set_global(orchestrator: Orchestrator) -> RuntimeResult<&'static Orchestrator> {
        let mut installed = false;
        let global = GLOBAL.get_or_init(|| {
            installed = true;
            orchestrator
        });
        if installed {
            Ok(global)
        } else {
            Err(RuntimeError::AlreadyInitialized)
        }
    }
}

static GLOBAL: OnceLock<Orchestrator> = OnceLock::new();

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("bootstrapped", &self.is_bootstrapped())
            .field(
                "loaders",
                &self.loaders.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .field("main", &self.main)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// OrchestratorBuilder
// =============================================================================

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    loaders: Vec<Arc<dyn ServiceLoader>>,
    default_loaders: bool,
    main: Option<MainContext>,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            loaders: Vec::new(),
            default_loaders: true,
            main: None,
        }
    }

    /// Uses `config` for the default loaders and the main context name.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a loader after the configured ones.
    pub fn loader(mut self, loader: impl ServiceLoader + 'static) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }

    /// Adds a shared loader after the configured ones.
    pub fn shared_loader(mut self, loader: Arc<dyn ServiceLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Skips the loaders derived from configuration.
    pub fn without_default_loaders(mut self) -> Self {
        self.default_loaders = false;
        self
    }

    /// Constructs services on `main` instead of a dedicated thread.
    pub fn main_context(mut self, main: MainContext) -> Self {
        self.main = Some(main);
        self
    }

    pub fn build(self) -> RuntimeResult<Orchestrator> {
        let mut loaders = if self.default_loaders {
            loaders::from_config(&self.config)
        } else {
            Vec::new()
        };
        loaders.extend(self.loaders);

        let main = match self.main {
            Some(main) => main,
            None => MainContext::spawn(self.config.main_context.thread_name.clone())
                .map_err(RuntimeError::MainContextSpawn)?,
        };

        debug!(
            loaders = ?loaders.iter().map(|l| l.name()).collect::<Vec<_>>(),
            main = main.name(),
            "Orchestrator built"
        );
        Ok(Orchestrator {
            state: Mutex::new(State::default()),
            bootstrap: ReentrantMutex::new(Cell::new(false)),
            bootstrapped: AtomicBool::new(false),
            loaders,
            main,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// An orchestrator with no loaders and its own main thread.
    pub fn orchestrator() -> Orchestrator {
        Orchestrator::builder()
            .without_default_loaders()
            .build()
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::orchestrator;
    use super::*;
    use orchestra_core::{Context, Registry, StaticLoader};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Banner;

    impl Service for Banner {
        fn id() -> &'static str {
            "test.Banner"
        }

        fn retention() -> RetentionPolicy {
            RetentionPolicy::Hold
        }

        fn register(registry: &mut Registry<Self>) {
            registry.on("show", |_: &Self, _: &Context| true);
        }
    }

    struct CountingLoader {
        calls: AtomicUsize,
    }

    impl ServiceLoader for CountingLoader {
        fn name(&self) -> &str {
            "counting"
        }

        fn load(&self) -> Vec<ServiceDefinition> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            vec![ServiceDefinition::of::<Banner>()]
        }
    }

    struct PanickingLoader;

    impl ServiceLoader for PanickingLoader {
        fn load(&self) -> Vec<ServiceDefinition> {
            panic!("manifest unreadable")
        }
    }

    #[test]
    fn test_resolve_runs_loaders_once() {
        let counting = Arc::new(CountingLoader {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::builder()
            .without_default_loaders()
            .shared_loader(counting.clone())
            .build()
            .unwrap();

        assert!(!orchestrator.is_bootstrapped());
        assert!(orchestrator.resolve());
        assert!(!orchestrator.resolve());
        orchestrator.fire_event("show");
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
        assert!(orchestrator.is_bootstrapped());
        assert_eq!(orchestrator.entries_for("show").len(), 1);
    }

    #[test]
    fn test_panicking_loader_does_not_abort_bootstrap() {
        let orchestrator = Orchestrator::builder()
            .without_default_loaders()
            .loader(PanickingLoader)
            .loader(StaticLoader::new("fixed", vec![ServiceDefinition::of::<Banner>()]))
            .build()
            .unwrap();

        assert!(orchestrator.resolve());
        assert_eq!(orchestrator.entries_for("show")[0].service, "test.Banner");
    }

    #[test]
    fn test_register_without_bootstrap() {
        let orchestrator = orchestrator();
        orchestrator.register_service::<Banner>();
        orchestrator.register_service::<Banner>();
        assert!(!orchestrator.is_bootstrapped());

        let entries = orchestrator.entries_for("show");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].retention, RetentionPolicy::Hold);
        assert!(!entries[0].eager);
        assert!(orchestrator.entries_for("hide").is_empty());
    }

    #[test]
    fn test_service_lookup_never_constructs() {
        let orchestrator = orchestrator();
        orchestrator.register_service::<Banner>();
        assert!(orchestrator.service("test.Banner").is_none());

        orchestrator.fire_event("show");
        let resident = orchestrator.service_of::<Banner>().unwrap();
        let again = orchestrator.service("test.Banner").unwrap();
        assert!(Arc::ptr_eq(&resident, &again.downcast::<Banner>().unwrap()));
    }

    #[test]
    fn test_resolve_with_explicit_loaders() {
        let orchestrator = orchestrator();
        let loaders: Vec<Arc<dyn ServiceLoader>> = vec![Arc::new(StaticLoader::new(
            "explicit",
            vec![ServiceDefinition::of::<Banner>()],
        ))];
        assert!(orchestrator.resolve_with(&loaders));
        assert!(!orchestrator.resolve_with(&loaders));
        assert_eq!(orchestrator.entries_for("show").len(), 1);
    }

    #[test]
    fn test_builder_uses_config_thread_name() {
        let mut config = OrchestratorConfig::default();
        config.main_context.thread_name = "orchestra-test-ui".into();
        config.discovery.section_static = false;
        config.discovery.section_cstr = false;
        let orchestrator = Orchestrator::from_config(config).unwrap();
        assert_eq!(orchestrator.main_context().name(), "orchestra-test-ui");
        assert!(format!("{orchestrator:?}").contains("bootstrapped"));
    }
}
