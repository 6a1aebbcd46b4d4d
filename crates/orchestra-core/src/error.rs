//! Error types shared across the orchestrator crates.
//!
//! Nothing here ever reaches a caller of `fire`: handler and construction
//! failures are recorded and logged, scan failures are local to one image.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error accepted from user code (handlers, factories, modules).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Handler Errors
// =============================================================================

/// Failure raised while invoking one bound handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The instance handed to the handler is not the type it was bound to.
    #[error("handler for '{expected}' received an instance of '{actual}'")]
    TypeMismatch {
        /// Type the handler was registered on.
        expected: &'static str,
        /// Type of the instance actually supplied.
        actual: &'static str,
    },

    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

// =============================================================================
// Construction Errors
// =============================================================================

/// Failure to produce a service instance for one entry.
#[derive(Debug, Error)]
pub enum ConstructError {
    /// The factory returned an error.
    #[error("factory '{factory}' failed to build '{service}': {source}")]
    Factory {
        /// Factory type name.
        factory: &'static str,
        /// Service id being built.
        service: String,
        /// Underlying error.
        #[source]
        source: BoxError,
    },

    /// The factory built an instance of a different type than the definition
    /// names.
    #[error("factory '{factory}' produced '{actual}', expected '{expected}'")]
    WrongType {
        /// Factory type name.
        factory: &'static str,
        /// Expected service type name.
        expected: &'static str,
        /// Produced type name.
        actual: &'static str,
    },

    /// Construction could not be scheduled on the main context.
    #[error("main context unavailable: {0}")]
    MainContext(String),

    /// Construction panicked.
    #[error("construction of '{service}' panicked: {message}")]
    Panicked {
        /// Service id being built.
        service: String,
        /// Panic payload, when it was a string.
        message: String,
    },
}

// =============================================================================
// Scan Errors
// =============================================================================

/// Per-image failure of the section scanner.  Logged and skipped.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The image lies outside the application directory.
    #[error("image {path:?} is outside the application directory")]
    OutsideAppDir {
        /// Image path.
        path: PathBuf,
    },

    /// The mapped header does not start with the ELF magic.
    #[error("image {path:?} has no ELF magic")]
    BadMagic {
        /// Image path.
        path: PathBuf,
    },

    /// The image is not a native 64-bit object for this host.
    #[error("image {path:?} is not a native 64-bit object")]
    NotNative {
        /// Image path.
        path: PathBuf,
    },

    /// The image file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        /// Image path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A header field points outside the file.
    #[error("image {path:?} is truncated: {what}")]
    Truncated {
        /// Image path.
        path: PathBuf,
        /// The structure that did not fit.
        what: &'static str,
    },

    /// The section is absent from the image.
    #[error("section '{section}' not present in {path:?}")]
    SectionMissing {
        /// Image path.
        path: PathBuf,
        /// Section name.
        section: &'static str,
    },

    /// The section exists but is empty.
    #[error("section '{section}' in {path:?} is empty")]
    SectionEmpty {
        /// Image path.
        path: PathBuf,
        /// Section name.
        section: &'static str,
    },

    /// The section is not mapped into memory.
    #[error("section '{section}' in {path:?} is not loaded")]
    SectionNotLoaded {
        /// Image path.
        path: PathBuf,
        /// Section name.
        section: &'static str,
    },

    /// The section's runtime address is not aligned for its record type.
    #[error("section '{section}' in {path:?} is misaligned")]
    Misaligned {
        /// Image path.
        path: PathBuf,
        /// Section name.
        section: &'static str,
    },

    /// The file on disk no longer matches the mapped image.
    #[error("image {path:?} changed on disk since it was loaded")]
    Stale {
        /// Image path.
        path: PathBuf,
    },
}

impl ScanError {
    /// Returns `true` for the failures every non-participating image produces.
    ///
    /// These are logged at `debug` rather than `warn`.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::OutsideAppDir { .. } | Self::SectionMissing { .. } | Self::SectionEmpty { .. }
        )
    }
}

/// Result type for scanner operations.
pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_scan_errors() {
        let path = PathBuf::from("/usr/lib/libc.so.6");
        assert!(ScanError::OutsideAppDir { path: path.clone() }.is_expected());
        assert!(
            ScanError::SectionMissing {
                path: path.clone(),
                section: "linkme_ORCHESTRA_SVC",
            }
            .is_expected()
        );
        assert!(!ScanError::BadMagic { path }.is_expected());
    }

    #[test]
    fn test_handler_error_display() {
        let err = HandlerError::TypeMismatch {
            expected: "app::Crash",
            actual: "app::Push",
        };
        assert_eq!(
            err.to_string(),
            "handler for 'app::Crash' received an instance of 'app::Push'"
        );
    }
}
