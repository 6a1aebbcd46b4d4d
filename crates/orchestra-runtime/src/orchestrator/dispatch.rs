//! Event dispatch: one synchronous responsibility chain per firing.

use std::any::TypeId;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use orchestra_core::{
    AnyArc, Context, Event, HandlerError, Outcome, Parameters, Priority, ReturnValue,
    SharedService, UserInfo,
};
use tracing::{Level, debug, info, span, trace, warn};

use super::Orchestrator;
use super::merge::ResolvedEntry;
use crate::main_context::panic_message;

/// What happened to one entry during a firing.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    pub service: &'static str,
    pub priority: Priority,
    pub success: bool,
    pub message: Option<String>,
    /// This entry returned `stop`.
    pub stopped: bool,
    /// No instance could be obtained, so the handler never ran.
    pub skipped: bool,
    pub elapsed: Duration,
}

/// Result of a firing together with its per-entry record.
#[derive(Debug, Clone)]
pub struct FireReport {
    pub event: Event,
    pub value: ReturnValue,
    /// Entries that were reached, in dispatch order.
    pub entries: Vec<EntryOutcome>,
    /// Service whose handler stopped the chain.
    pub stopped_by: Option<&'static str>,
    pub elapsed: Duration,
}

impl FireReport {
    fn empty(event: Event) -> Self {
        Self {
            event,
            value: ReturnValue::Void,
            entries: Vec::new(),
            stopped_by: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Returns `true` if a handler stopped the chain.
    pub fn is_stopped(&self) -> bool {
        self.stopped_by.is_some()
    }

    /// Entries whose handler ran and reported failure, or that were skipped.
    pub fn failures(&self) -> impl Iterator<Item = &EntryOutcome> {
        self.entries.iter().filter(|e| !e.success)
    }

    /// Services whose handler actually ran, in order.
    pub fn invoked(&self) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|e| !e.skipped)
            .map(|e| e.service)
            .collect()
    }
}

impl Orchestrator {
    /// Fires `event` and returns its result.
    ///
    /// Runs the chain synchronously on the calling thread.  Handler and
    /// construction failures are logged and never reach the caller; a chain
    /// that runs to exhaustion yields [`ReturnValue::Void`].
    pub fn fire(
        &self,
        event: impl Into<Event>,
        source: Option<AnyArc>,
        parameters: Parameters,
    ) -> ReturnValue {
        self.fire_with_report(event, source, parameters).value
    }

    /// Fires `event` with no source and no parameters.
    pub fn fire_event(&self, event: impl Into<Event>) -> ReturnValue {
        self.fire(event, None, Parameters::default())
    }

    /// Fires `event` and extracts the result as `T`.
    ///
    /// `None` when the chain ran to exhaustion or stopped with a value of
    /// another type.
    pub fn fire_as<T: Clone + 'static>(
        &self,
        event: impl Into<Event>,
        source: Option<AnyArc>,
        parameters: Parameters,
    ) -> Option<T> {
        self.fire(event, source, parameters).value::<T>()
    }

    /// Fires `event` and returns the full per-entry record.
    pub fn fire_with_report(
        &self,
        event: impl Into<Event>,
        source: Option<AnyArc>,
        parameters: Parameters,
    ) -> FireReport {
        let event = event.into();
        self.bootstrap(&self.loaders);

        // Snapshot the entries and the residents they need under a brief lock.
        let (entries, mut instances) = {
            let state = self.state.lock();
            let Some(entries) = state.cache.get(&event).cloned() else {
                trace!(event = %event, "No entries for event");
                return FireReport::empty(event);
            };
            let instances: HashMap<TypeId, SharedService> = entries
                .iter()
                .filter(|entry| entry.definition.is_held())
                .filter_map(|entry| {
                    let def = &entry.definition;
                    state
                        .residents
                        .get(def.id())
                        .map(|resident| (def.service.type_id(), resident.clone()))
                })
                .collect();
            (entries, instances)
        };

        let span = span!(Level::DEBUG, "fire", event = %event, entries = entries.len());
        let _enter = span.enter();
        let started = Instant::now();

        let user_info = UserInfo::default();
        let mut report = FireReport::empty(event);

        for entry in entries.iter() {
            let ctx = Context::new(entry.event.clone())
                .with_source(source.clone())
                .with_args(entry.definition.args.clone())
                .with_parameters(parameters.clone())
                .with_user_info(user_info.clone());

            let run = self.run_entry(entry, &ctx, &mut instances);
            let service = run.record.service;
            report.entries.push(run.record);
            if let Some(value) = run.value {
                report.value = value;
                report.stopped_by = Some(service);
                break;
            }
        }

        report.elapsed = started.elapsed();
        trace!(
            ran = report.entries.len(),
            stopped = report.is_stopped(),
            elapsed_us = report.elapsed.as_micros() as u64,
            "Firing finished"
        );
        report
    }

    fn run_entry(
        &self,
        entry: &ResolvedEntry,
        ctx: &Context,
        instances: &mut HashMap<TypeId, SharedService>,
    ) -> EntryRun {
        let def = &entry.definition;
        let span = span!(
            Level::DEBUG,
            "handler",
            service = def.id(),
            priority = %def.priority
        );
        let _enter = span.enter();
        let started = Instant::now();

        // Held instances are shared across the firing; destroy ones are built per entry.
        let type_id = def.service.type_id();
        let cached = def.is_held().then(|| instances.get(&type_id).cloned()).flatten();
        let instance = match cached {
            Some(instance) => instance,
            None => match self.obtain(def, ctx) {
                Ok(instance) => {
                    if def.is_held() {
                        instances.insert(type_id, instance.clone());
                    }
                    instance
                }
                Err(e) => {
                    warn!(error = %e, "No instance, skipping entry");
                    return EntryRun::skipped(entry, e.to_string(), started.elapsed());
                }
            },
        };

        let outcome = match catch_unwind(AssertUnwindSafe(|| (entry.handler)(&instance, ctx))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Outcome::failed(e.to_string()),
            Err(payload) => {
                Outcome::failed(HandlerError::Panicked(panic_message(payload.as_ref())).to_string())
            }
        };
        let elapsed = started.elapsed();
        let elapsed_us = elapsed.as_micros() as u64;

        let (value, success, message) = match outcome {
            Outcome::Stop {
                value,
                success,
                message,
            } => {
                info!(elapsed_us, value = %value, "Handler stopped the chain");
                (Some(value), success, message)
            }
            Outcome::Continue { success, message } => {
                if success {
                    debug!(elapsed_us, "Handler finished");
                } else {
                    warn!(
                        elapsed_us,
                        message = message.as_deref().unwrap_or(""),
                        "Handler failed"
                    );
                }
                (None, success, message)
            }
        };

        let stopped = value.is_some();
        EntryRun {
            value,
            record: EntryOutcome {
                service: def.id(),
                priority: def.priority,
                success,
                message,
                stopped,
                skipped: false,
                elapsed,
            },
        }
    }
}

struct EntryRun {
    /// Set when the handler stopped the chain.
    value: Option<ReturnValue>,
    record: EntryOutcome,
}

impl EntryRun {
    fn skipped(entry: &ResolvedEntry, message: String, elapsed: Duration) -> Self {
        let def = &entry.definition;
        Self {
            value: None,
            record: EntryOutcome {
                service: def.id(),
                priority: def.priority,
                success: false,
                message: Some(message),
                stopped: false,
                skipped: true,
                elapsed,
            },
        }
    }
}
