//! Handler results and firing return values.
//!
//! A handler reports one of two things back to the dispatch loop:
//!
//! - [`Outcome::Continue`] — proceed to the next entry, recording whether this
//!   one succeeded.
//! - [`Outcome::Stop`] — abort the rest of the chain and make `value` the
//!   result of the whole firing.
//!
//! Handlers may return anything implementing [`IntoOutcome`], so the common
//! cases stay short:
//!
//! ```rust
//! use orchestra_core::{IntoOutcome, Outcome};
//!
//! assert!(!().into_outcome().unwrap().is_stop());
//! assert!(!false.into_outcome().unwrap().success());
//! assert!(Outcome::stop(true).is_stop());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;

// =============================================================================
// ReturnValue
// =============================================================================

/// Result value of a firing.
///
/// `Void` is the neutral result of a chain that ran to exhaustion.
#[derive(Clone, Default)]
pub enum ReturnValue {
    /// No value.
    #[default]
    Void,
    /// A boolean answer, the most common stop payload.
    Bool(bool),
    /// Any other value.
    Any(Arc<dyn Any + Send + Sync>),
}

impl ReturnValue {
    /// Wraps an arbitrary value.
    pub fn any<T: Any + Send + Sync>(value: T) -> Self {
        Self::Any(Arc::new(value))
    }

    /// Returns `true` for [`ReturnValue::Void`].
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Returns the boolean payload, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extracts the value as `T`.
    ///
    /// This is a checked cast: a `Void` value or a payload of any other type
    /// yields `None`.  A `Bool` payload is visible as `bool`.
    pub fn value<T: Clone + 'static>(&self) -> Option<T> {
        match self {
            Self::Void => None,
            Self::Bool(b) => (b as &dyn Any).downcast_ref::<T>().cloned(),
            Self::Any(v) => v.downcast_ref::<T>().cloned(),
        }
    }
}

impl From<bool> for ReturnValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<()> for ReturnValue {
    fn from(_: ()) -> Self {
        Self::Void
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("Void"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Any(_) => f.write_str("Any(..)"),
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// What a handler tells the dispatch loop.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Proceed to the next entry.
    Continue {
        /// Whether this handler did its work.
        success: bool,
        /// Optional diagnostic message.
        message: Option<String>,
    },
    /// Abort the remaining chain and yield `value` as the firing's result.
    Stop {
        /// Result of the firing.
        value: ReturnValue,
        /// Whether this handler did its work.
        success: bool,
        /// Optional diagnostic message.
        message: Option<String>,
    },
}

impl Outcome {
    /// Continue with success.
    pub fn next() -> Self {
        Self::Continue {
            success: true,
            message: None,
        }
    }

    /// Continue, recording a failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Continue {
            success: false,
            message: Some(message.into()),
        }
    }

    /// Stop the chain with a successful result.
    pub fn stop(value: impl Into<ReturnValue>) -> Self {
        Self::Stop {
            value: value.into(),
            success: true,
            message: None,
        }
    }

    /// Stop the chain, spelling out every field.
    pub fn stop_with(
        value: impl Into<ReturnValue>,
        success: bool,
        message: impl Into<String>,
    ) -> Self {
        Self::Stop {
            value: value.into(),
            success,
            message: Some(message.into()),
        }
    }

    /// Replaces the message.
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            Self::Continue { message, .. } | Self::Stop { message, .. } => {
                *message = Some(text.into());
            }
        }
        self
    }

    /// Returns `true` if this outcome stops the chain.
    pub fn is_stop(&self) -> bool {
        matches!(self, Self::Stop { .. })
    }

    /// Returns the success flag.
    pub fn success(&self) -> bool {
        match self {
            Self::Continue { success, .. } | Self::Stop { success, .. } => *success,
        }
    }

    /// Returns the message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Continue { message, .. } | Self::Stop { message, .. } => message.as_deref(),
        }
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::next()
    }
}

// =============================================================================
// IntoOutcome
// =============================================================================

/// Conversion of handler return values into an [`Outcome`].
///
/// An `Err` is a handler failure: the dispatch loop records it and moves on.
pub trait IntoOutcome {
    /// Converts `self`.
    fn into_outcome(self) -> Result<Outcome, BoxError>;
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        Ok(self)
    }
}

/// `()` continues with success.
impl IntoOutcome for () {
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        Ok(Outcome::next())
    }
}

/// `bool` continues with that success flag.
impl IntoOutcome for bool {
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        Ok(Outcome::Continue {
            success: self,
            message: None,
        })
    }
}

/// `None` continues with success.
impl<T: IntoOutcome> IntoOutcome for Option<T> {
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        match self {
            Some(inner) => inner.into_outcome(),
            None => Ok(Outcome::next()),
        }
    }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Result<Outcome, BoxError> {
        match self {
            Ok(inner) => inner.into_outcome(),
            Err(e) => Err(e.into()),
        }
    }
}

impl fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Any(_) => f.write_str("any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_is_a_checked_cast() {
        let v = ReturnValue::any(42_u32);
        assert_eq!(v.value::<u32>(), Some(42));
        assert_eq!(v.value::<i64>(), None);
        assert_eq!(v.value::<String>(), None);

        let b = ReturnValue::from(true);
        assert_eq!(b.value::<bool>(), Some(true));
        assert_eq!(b.value::<u8>(), None);
        assert_eq!(b.as_bool(), Some(true));

        assert!(ReturnValue::Void.value::<bool>().is_none());
        assert!(ReturnValue::default().is_void());
    }

    #[test]
    fn test_outcome_constructors() {
        let next = Outcome::next();
        assert!(next.success() && !next.is_stop() && next.message().is_none());

        let failed = Outcome::failed("no network");
        assert!(!failed.success());
        assert_eq!(failed.message(), Some("no network"));

        let stop = Outcome::stop(true);
        assert!(stop.is_stop() && stop.success());

        let stop = Outcome::stop_with((), false, "declined").with_message("vetoed");
        assert!(!stop.success());
        assert_eq!(stop.message(), Some("vetoed"));
    }

    #[test]
    fn test_into_outcome_conversions() {
        assert!(().into_outcome().unwrap().success());
        assert!(!false.into_outcome().unwrap().success());
        assert!(None::<Outcome>.into_outcome().unwrap().success());

        let ok: Result<Outcome, std::io::Error> = Ok(Outcome::stop(1_i32 == 1));
        assert!(ok.into_outcome().unwrap().is_stop());

        let err: Result<(), &str> = Err("disk full");
        assert_eq!(err.into_outcome().unwrap_err().to_string(), "disk full");
    }

    #[test]
    fn test_return_value_display() {
        assert_eq!(ReturnValue::Void.to_string(), "void");
        assert_eq!(ReturnValue::Bool(false).to_string(), "false");
        assert_eq!(ReturnValue::any("x").to_string(), "any");
    }
}
