//! Priority and retention policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Execution priority of a service for an event.  Higher runs first.
///
/// The named bands leave room between them for fine-grained ordering, e.g.
/// `Priority::new(Priority::HIGH.get() + 10)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(i64);

impl Priority {
    /// Background work that can run last.
    pub const LOW: Self = Self(250);
    /// The default band.
    pub const MEDIUM: Self = Self(500);
    /// Work that should run before most services.
    pub const HIGH: Self = Self(750);
    /// Work that must run before everything except boot services.
    pub const CRITICAL: Self = Self(1000);
    /// Reserved for logging or crash reporting style services that must come
    /// first.  Keep it to one or two services with no dependencies between
    /// them.
    pub const BOOT: Self = Self(i64::MAX);

    /// Creates a priority from a raw value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::LOW => f.write_str("low"),
            Self::MEDIUM => f.write_str("medium"),
            Self::HIGH => f.write_str("high"),
            Self::CRITICAL => f.write_str("critical"),
            Self::BOOT => f.write_str("boot"),
            Self(v) => write!(f, "{v}"),
        }
    }
}

/// What happens to a service instance after the firing that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Dropped once the firing that created it returns.
    #[default]
    Destroy,
    /// Kept in the resident table, keyed by service id, until process exit.
    Hold,
}

impl RetentionPolicy {
    /// Returns the policy name as used in manifests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Destroy => "destroy",
            Self::Hold => "hold",
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "destroy" => Ok(Self::Destroy),
            "hold" => Ok(Self::Hold),
            other => Err(format!("unknown retention policy '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_bands_are_ordered() {
        assert!(Priority::BOOT > Priority::CRITICAL);
        assert!(Priority::CRITICAL > Priority::HIGH);
        assert!(Priority::HIGH > Priority::MEDIUM);
        assert!(Priority::MEDIUM > Priority::LOW);
        assert_eq!(Priority::default(), Priority::MEDIUM);
    }

    #[test]
    fn test_retention_parse() {
        assert_eq!("Hold".parse::<RetentionPolicy>(), Ok(RetentionPolicy::Hold));
        assert_eq!(
            "destroy".parse::<RetentionPolicy>(),
            Ok(RetentionPolicy::Destroy)
        );
        assert!("keep".parse::<RetentionPolicy>().is_err());
    }
}
