//! Definition merger and the per-event cache.
//!
//! A batch of definitions goes through four steps:
//!
//! 1. [`resolve_refs`] turns catalog names into type handles (no lock).
//! 2. The orchestrator drops types that are already merged (lock).
//! 3. [`prepare`] runs each type's registration routine (no lock).
//! 4. [`State::apply`] dedups again, extends and re-sorts the affected
//!    event lists and returns the definitions to build eagerly (lock).
//!
//! Registration routines are user code, so they run outside the lock.  Two
//! threads merging the same type at once may both call its routine; only the
//! first result is kept.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use orchestra_core::{
    Args, ErasedHandler, Event, FactoryRef, FactoryType, Interest, Priority, RetentionPolicy,
    ServiceDefinition, ServiceRef, ServiceType, SharedService, catalog,
};
use tracing::{debug, trace, warn};

use crate::main_context::panic_message;

/// A definition with every name resolved and every override applied.
#[derive(Debug)]
pub(crate) struct ResolvedDefinition {
    pub service: ServiceType,
    pub factory: Option<FactoryType>,
    pub priority: Priority,
    pub retention: RetentionPolicy,
    pub args: Args,
    pub eager: bool,
}

impl ResolvedDefinition {
    pub fn id(&self) -> &'static str {
        self.service.id()
    }

    pub fn is_held(&self) -> bool {
        self.retention == RetentionPolicy::Hold
    }
}

/// One `(service, event, handler)` row of the cache.  Never mutated.
pub(crate) struct ResolvedEntry {
    pub definition: Arc<ResolvedDefinition>,
    pub event: Event,
    pub handler: ErasedHandler,
}

impl ResolvedEntry {
    pub fn priority(&self) -> Priority {
        self.definition.priority
    }
}

/// Immutable view of one event's entries, cheap to clone.
pub(crate) type EntryList = Arc<[Arc<ResolvedEntry>]>;

/// A definition whose names resolved.
pub(crate) struct Candidate {
    service: ServiceType,
    factory: Option<FactoryType>,
    definition: ServiceDefinition,
}

impl Candidate {
    pub fn type_id(&self) -> TypeId {
        self.service.type_id()
    }
}

/// A candidate together with its declared interests.
pub(crate) struct Prepared {
    definition: Arc<ResolvedDefinition>,
    interests: Vec<Interest>,
}

/// Resolves catalog names.  Unknown names are dropped with a warning.
pub(crate) fn resolve_refs(definition: ServiceDefinition) -> Option<Candidate> {
    let service = match &definition.service {
        ServiceRef::Type(ty) => *ty,
        ServiceRef::Named(name) => match catalog::service_type(name) {
            Some(ty) => ty,
            None => {
                warn!(service = %name, "Unknown service type, dropping definition");
                return None;
            }
        },
    };

    let factory = match &definition.factory {
        None => None,
        Some(FactoryRef::Type(factory)) => Some(*factory),
        Some(FactoryRef::Named(name)) => match catalog::factory_type(name) {
            Some(factory) => Some(factory),
            None => {
                warn!(
                    service = service.id(),
                    factory = %name,
                    "Unknown factory type, dropping definition"
                );
                return None;
            }
        },
    };

    Some(Candidate {
        service,
        factory,
        definition,
    })
}

/// Applies overrides and runs the registration routine.
///
/// Types that declare no interests are dropped since nothing would ever
/// dispatch to them.
pub(crate) fn prepare(candidate: Candidate) -> Option<Prepared> {
    let Candidate {
        service,
        factory,
        definition,
    } = candidate;

    let priority = definition.priority.unwrap_or(service.priority());
    let retention = definition.retention.unwrap_or(service.retention());
    let eager = match (service.is_lazy(), retention) {
        (true, _) => false,
        (false, RetentionPolicy::Hold) => true,
        (false, RetentionPolicy::Destroy) => {
            warn!(
                service = service.id(),
                "Non-lazy service with destroy retention cannot be kept, treating as lazy"
            );
            false
        }
    };

    let interests = match catch_unwind(AssertUnwindSafe(|| service.interests())) {
        Ok(interests) => interests,
        Err(payload) => {
            warn!(
                service = service.id(),
                panic = %panic_message(payload.as_ref()),
                "Registration routine panicked, dropping definition"
            );
            return None;
        }
    };
    if interests.is_empty() {
        warn!(service = service.id(), "Service registers no events, dropping definition");
        return None;
    }

    Some(Prepared {
        definition: Arc::new(ResolvedDefinition {
            service,
            factory,
            priority,
            retention,
            args: definition.args,
            eager,
        }),
        interests,
    })
}

/// Everything behind the orchestrator's state lock.
#[derive(Default)]
pub(crate) struct State {
    merged: HashSet<TypeId>,
    pub residents: HashMap<&'static str, SharedService>,
    pub cache: HashMap<Event, EntryList>,
}

impl State {
    pub fn is_merged(&self, type_id: TypeId) -> bool {
        self.merged.contains(&type_id)
    }

    /// Merges prepared definitions.  Returns the ones to build eagerly.
    ///
    /// Each affected event list is rebuilt, extended and stable-sorted by
    /// descending priority, then swapped in whole, so a list already handed
    /// out to a firing never changes under it.
    pub fn apply(&mut self, batch: Vec<Prepared>) -> Vec<Arc<ResolvedDefinition>> {
        let mut eager = Vec::new();
        let mut staged: HashMap<Event, Vec<Arc<ResolvedEntry>>> = HashMap::new();
        let mut merged = 0;

        for Prepared {
            definition,
            interests,
        } in batch
        {
            if !self.merged.insert(definition.service.type_id()) {
                trace!(service = definition.id(), "Already merged, skipping");
                continue;
            }
            merged += 1;
            if definition.eager {
                eager.push(Arc::clone(&definition));
            }
            for Interest { event, handler } in interests {
                staged
                    .entry(event.clone())
                    .or_default()
                    .push(Arc::new(ResolvedEntry {
                        definition: Arc::clone(&definition),
                        event,
                        handler,
                    }));
            }
        }

        for (event, added) in staged {
            let mut list: Vec<Arc<ResolvedEntry>> = self
                .cache
                .get(&event)
                .map(|existing| existing.to_vec())
                .unwrap_or_default();
            list.extend(added);
            list.sort_by(|a, b| b.priority().cmp(&a.priority()));
            trace!(event = %event, entries = list.len(), "Event list rebuilt");
            self.cache.insert(event, list.into());
        }

        if merged > 0 {
            debug!(merged, eager = eager.len(), events = self.cache.len(), "Definitions merged");
        }
        eager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestra_core::{Context, Registry, Service};

    #[derive(Default)]
    struct Early;

    impl Service for Early {
        fn priority() -> Priority {
            Priority::HIGH
        }

        fn register(registry: &mut Registry<Self>) {
            registry.on("x", |_: &Self, _: &Context| {}).on("y", |_: &Self, _: &Context| {});
        }
    }

    #[derive(Default)]
    struct Late;

    impl Service for Late {
        fn priority() -> Priority {
            Priority::LOW
        }

        fn register(registry: &mut Registry<Self>) {
            registry.on("x", |_: &Self, _: &Context| {});
        }
    }

    #[derive(Default)]
    struct Silent;

    impl Service for Silent {
        fn register(_registry: &mut Registry<Self>) {}
    }

    #[derive(Default)]
    struct Contradiction;

    impl Service for Contradiction {
        fn is_lazy() -> bool {
            false
        }

        fn register(registry: &mut Registry<Self>) {
            registry.on("x", |_: &Self, _: &Context| {});
        }
    }

    fn prepared(defs: Vec<ServiceDefinition>) -> Vec<Prepared> {
        defs.into_iter()
            .filter_map(resolve_refs)
            .filter_map(prepare)
            .collect()
    }

    fn ids(state: &State, event: &str) -> Vec<&'static str> {
        state
            .cache
            .get(&Event::new(event.to_string()))
            .map(|list| list.iter().map(|e| e.definition.service.type_name()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_lists_sorted_by_descending_priority() {
        let mut state = State::default();
        state.apply(prepared(vec![
            ServiceDefinition::of::<Late>(),
            ServiceDefinition::of::<Early>(),
        ]));

        let x = ids(&state, "x");
        assert_eq!(x.len(), 2);
        assert!(x[0].ends_with("Early") && x[1].ends_with("Late"), "{x:?}");
        assert_eq!(ids(&state, "y").len(), 1);
    }

    #[test]
    fn test_override_moves_entry_and_later_batches_resort() {
        let mut state = State::default();
        state.apply(prepared(vec![ServiceDefinition::of::<Early>()]));
        state.apply(prepared(vec![
            ServiceDefinition::of::<Late>().priority(Priority::CRITICAL),
        ]));

        let x = ids(&state, "x");
        assert!(x[0].ends_with("Late"), "{x:?}");
    }

    #[test]
    fn test_equal_priorities_keep_registration_order() {
        let mut state = State::default();
        state.apply(prepared(vec![
            ServiceDefinition::of::<Late>().priority(Priority::MEDIUM),
        ]));
        state.apply(prepared(vec![
            ServiceDefinition::of::<Early>().priority(Priority::MEDIUM),
        ]));
        let x = ids(&state, "x");
        assert!(x[0].ends_with("Late") && x[1].ends_with("Early"), "{x:?}");
    }

    #[test]
    fn test_type_merged_once() {
        let mut state = State::default();
        state.apply(prepared(vec![
            ServiceDefinition::of::<Early>(),
            ServiceDefinition::of::<Early>().priority(Priority::LOW),
        ]));
        state.apply(prepared(vec![ServiceDefinition::of::<Early>()]));

        let x = state.cache.get(&Event::from_static("x")).unwrap();
        assert_eq!(x.len(), 1);
        assert_eq!(x[0].priority(), Priority::HIGH);
        assert!(state.is_merged(TypeId::of::<Early>()));
    }

    #[test]
    fn test_silent_and_unknown_definitions_are_dropped() {
        assert!(prepared(vec![ServiceDefinition::of::<Silent>()]).is_empty());
        assert!(resolve_refs(ServiceDefinition::named("nowhere.Nothing")).is_none());
        assert!(
            resolve_refs(ServiceDefinition::of::<Early>().factory_named("nowhere.Factory"))
                .is_none()
        );
    }

    #[test]
    fn test_eagerness() {
        let mut state = State::default();
        let eager = state.apply(prepared(vec![
            ServiceDefinition::of::<Contradiction>(),
            ServiceDefinition::of::<Early>().retention(RetentionPolicy::Hold),
        ]));
        // Destroy retention downgrades a non-lazy type to lazy.
        assert!(eager.is_empty());

        let mut state = State::default();
        let eager = state.apply(prepared(vec![
            ServiceDefinition::of::<Contradiction>().retention(RetentionPolicy::Hold),
        ]));
        assert_eq!(eager.len(), 1);
        assert!(eager[0].is_held());
    }

    #[test]
    fn test_published_lists_are_not_mutated() {
        let mut state = State::default();
        state.apply(prepared(vec![ServiceDefinition::of::<Early>()]));
        let snapshot = Arc::clone(state.cache.get(&Event::from_static("x")).unwrap());

        state.apply(prepared(vec![ServiceDefinition::of::<Late>()]));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(state.cache.get(&Event::from_static("x")).unwrap().len(), 2);
    }
}
