//! Event identifiers and string-keyed context keys.
//!
//! An [`Event`] names a lifecycle moment ("launch completed", "entered
//! background", ...).  Events are opaque: two events are the same event when
//! their strings are equal, nothing else is compared.
//!
//! [`ParameterKey`] and [`ContextKey`] share the same shape and are used to key
//! the dynamic trigger parameters and the per-firing shared user info.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Cow<'static, str>);

        impl $name {
            /// Creates a key from any owned or borrowed string.
            pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
                Self(name.into())
            }

            /// Creates a key from a static string in a `const` context.
            pub const fn from_static(name: &'static str) -> Self {
                Self(Cow::Borrowed(name))
            }

            /// Returns the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&'static str> for $name {
            fn from(name: &'static str) -> Self {
                Self::from_static(name)
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(Cow::Owned(name))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_key! {
    /// A named lifecycle moment that triggers dispatch.
    ///
    /// ```rust
    /// use orchestra_core::Event;
    ///
    /// const SYNC_FINISHED: Event = Event::from_static("syncFinished");
    /// assert_eq!(SYNC_FINISHED, Event::new(String::from("syncFinished")));
    /// ```
    Event
}

string_key! {
    /// Key of a dynamic parameter supplied by the code that fires an event.
    ParameterKey
}

string_key! {
    /// Key into the [`UserInfo`](crate::context::UserInfo) map shared by every
    /// handler of one firing.
    ContextKey
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_event_equality_is_by_string() {
        let a = Event::from_static("didFinishLaunching");
        let b = Event::new(String::from("didFinishLaunching"));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_event_serde_is_transparent() {
        let event: Event = serde_json::from_str("\"appReady\"").unwrap();
        assert_eq!(event.as_str(), "appReady");
        assert_eq!(serde_json::to_string(&event).unwrap(), "\"appReady\"");
    }
}
