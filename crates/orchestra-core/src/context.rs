//! Per-firing context handed to every handler.
//!
//! One firing builds one [`Context`] per entry.  Each carries:
//!
//! - the event being fired and the optional source object,
//! - the entry's static [`Args`] (from its definition),
//! - the dynamic [`Parameters`] supplied by the trigger,
//! - the [`UserInfo`] map, which is the **same** map for every entry of the
//!   firing.  Handlers earlier in the chain use it to pass data to later ones.
//!
//! Everything except `UserInfo` is immutable.  Cloning a context is cheap.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::event::{ContextKey, Event, ParameterKey};

/// Type-erased shared value (sources and parameters).
pub type AnyArc = Arc<dyn Any + Send + Sync>;

// =============================================================================
// Args — static arguments from the definition
// =============================================================================

/// Static arguments attached to a service definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Arc<Map<String, Value>>);

impl Args {
    /// Creates an empty argument map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserializes one value, `None` if absent or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserializes the whole map into a typed config struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object((*self.0).clone()))
    }

    /// Inserts a value, copying the map if it is shared.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into());
    }

    /// Returns `true` if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Args {
    fn from(map: Map<String, Value>) -> Self {
        Self(Arc::new(map))
    }
}

// =============================================================================
// Parameters — dynamic trigger parameters
// =============================================================================

/// Dynamic parameters supplied by the code that fires an event.
///
/// ```rust
/// use orchestra_core::{Parameters, events};
///
/// let params = Parameters::new().with(events::URL, String::from("app://home"));
/// assert_eq!(params.get::<String>(&events::URL).as_deref(), Some("app://home"));
/// assert!(params.get::<u32>(&events::URL).is_none());
/// ```
#[derive(Clone, Default)]
pub struct Parameters(Arc<HashMap<ParameterKey, AnyArc>>);

impl Parameters {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter.
    pub fn with<T: Any + Send + Sync>(mut self, key: impl Into<ParameterKey>, value: T) -> Self {
        Arc::make_mut(&mut self.0).insert(key.into(), Arc::new(value));
        self
    }

    /// Returns a clone of a parameter, `None` if absent or of another type.
    pub fn get<T: Clone + 'static>(&self, key: &ParameterKey) -> Option<T> {
        self.0.get(key).and_then(|v| v.downcast_ref::<T>()).cloned()
    }

    /// Returns the raw shared value.
    pub fn get_raw(&self, key: &ParameterKey) -> Option<&AnyArc> {
        self.0.get(key)
    }

    /// Returns `true` if the key is present.
    pub fn contains(&self, key: &ParameterKey) -> bool {
        self.0.contains_key(key)
    }

    /// Returns `true` if no parameters were supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

// =============================================================================
// UserInfo — shared mutable slot, one per firing
// =============================================================================

/// Lock-protected map shared by every handler of one firing.
///
/// Values are stored type-erased.  Alongside the exact typed [`get`](Self::get)
/// there are coercing getters for the common scalar shapes, so a handler that
/// wrote `1_i32` and one that reads a `bool` still agree.
#[derive(Clone, Default)]
pub struct UserInfo(Arc<Mutex<HashMap<ContextKey, Box<dyn Any + Send + Sync>>>>);

impl UserInfo {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous one.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<ContextKey>, value: T) {
        self.0.lock().insert(key.into(), Box::new(value));
    }

    /// Returns a clone of the value if it has exactly type `T`.
    pub fn get<T: Clone + 'static>(&self, key: &ContextKey) -> Option<T> {
        self.0
            .lock()
            .get(key)
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes a value, returning it if it has type `T`.
    pub fn remove<T: 'static>(&self, key: &ContextKey) -> Option<T> {
        self.0
            .lock()
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    /// Returns `true` if the key is present.
    pub fn contains(&self, key: &ContextKey) -> bool {
        self.0.lock().contains_key(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Reads a boolean: a `bool`, a non-zero integer, or one of
    /// `"true"`, `"yes"`, `"1"` (case-insensitive).
    pub fn get_bool(&self, key: &ContextKey) -> Option<bool> {
        self.inspect(key, |v| {
            if let Some(b) = v.downcast_ref::<bool>() {
                return Some(*b);
            }
            if let Some(n) = integer(v) {
                return Some(n != 0);
            }
            if let Some(s) = string(v) {
                let s = s.to_ascii_lowercase();
                return Some(matches!(s.as_str(), "true" | "yes" | "1"));
            }
            match v.downcast_ref::<Value>()? {
                Value::Bool(b) => Some(*b),
                Value::Number(n) => n.as_i64().map(|n| n != 0),
                Value::String(s) => Some(matches!(
                    s.to_ascii_lowercase().as_str(),
                    "true" | "yes" | "1"
                )),
                _ => None,
            }
        })
    }

    /// Reads an integer: any integer type, a float (truncated), or a string
    /// that parses.
    pub fn get_int(&self, key: &ContextKey) -> Option<i64> {
        self.inspect(key, |v| {
            if let Some(n) = integer(v) {
                return Some(n);
            }
            if let Some(f) = float(v) {
                return Some(f as i64);
            }
            if let Some(s) = string(v) {
                return s.trim().parse().ok();
            }
            match v.downcast_ref::<Value>()? {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        })
    }

    /// Reads a float: any float or integer type, or a string that parses.
    pub fn get_double(&self, key: &ContextKey) -> Option<f64> {
        self.inspect(key, |v| {
            if let Some(f) = float(v) {
                return Some(f);
            }
            if let Some(n) = integer(v) {
                return Some(n as f64);
            }
            if let Some(s) = string(v) {
                return s.trim().parse().ok();
            }
            match v.downcast_ref::<Value>()? {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            }
        })
    }

    /// Reads a string (`String`, `&'static str` or a JSON string).
    pub fn get_string(&self, key: &ContextKey) -> Option<String> {
        self.inspect(key, |v| {
            string(v).map(str::to_owned).or_else(|| {
                v.downcast_ref::<Value>()
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
        })
    }

    fn inspect<R>(&self, key: &ContextKey, f: impl FnOnce(&dyn Any) -> Option<R>) -> Option<R> {
        let map = self.0.lock();
        let value = map.get(key)?;
        f(value.as_ref())
    }
}

impl fmt::Debug for UserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.lock().keys()).finish()
    }
}

fn integer(v: &dyn Any) -> Option<i64> {
    macro_rules! try_int {
        ($($t:ty),*) => {
            $(if let Some(n) = v.downcast_ref::<$t>() {
                return i64::try_from(*n).ok();
            })*
        };
    }
    try_int!(i64, i32, i16, i8, isize, u64, u32, u16, u8, usize);
    None
}

fn float(v: &dyn Any) -> Option<f64> {
    if let Some(f) = v.downcast_ref::<f64>() {
        return Some(*f);
    }
    v.downcast_ref::<f32>().map(|f| f64::from(*f))
}

fn string(v: &dyn Any) -> Option<&str> {
    if let Some(s) = v.downcast_ref::<String>() {
        return Some(s);
    }
    v.downcast_ref::<&'static str>().copied()
}

// =============================================================================
// Context
// =============================================================================

/// Context handed to a handler.  Cheap to clone.
#[derive(Clone)]
pub struct Context {
    event: Event,
    source: Option<AnyArc>,
    args: Args,
    parameters: Parameters,
    user_info: UserInfo,
}

impl Context {
    /// Creates a context for `event` with no source, args or parameters and a
    /// fresh user info map.
    pub fn new(event: Event) -> Self {
        Self {
            event,
            source: None,
            args: Args::default(),
            parameters: Parameters::default(),
            user_info: UserInfo::default(),
        }
    }

    /// Sets the source object.
    pub fn with_source(mut self, source: Option<AnyArc>) -> Self {
        self.source = source;
        self
    }

    /// Sets the static args.
    pub fn with_args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    /// Sets the dynamic parameters.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Shares an existing user info map.
    pub fn with_user_info(mut self, user_info: UserInfo) -> Self {
        self.user_info = user_info;
        self
    }

    /// The event being fired.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// The raw source object.
    pub fn source(&self) -> Option<&AnyArc> {
        self.source.as_ref()
    }

    /// The source object downcast to `T`.
    pub fn source_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.source.clone().and_then(|s| s.downcast::<T>().ok())
    }

    /// Static args of the entry being run.
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Dynamic parameters of the firing.
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// The map shared by every handler of this firing.
    pub fn user_info(&self) -> &UserInfo {
        &self.user_info
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("event", &self.event)
            .field("has_source", &self.source.is_some())
            .field("args", &self.args)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}
