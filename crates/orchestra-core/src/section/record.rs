//! Record layouts stored in the identifier sections.
//!
//! Two layouts exist, one per code-generation path:
//!
//! - [`StaticStrRecord`] — pointer and length of a `&'static str`.
//! - [`CStrRecord`] — pointer to a NUL-terminated string.
//!
//! Both are `#[repr(C)]` so their stride is stable across compilers and the
//! scanner can walk sections written by any image.

use std::ffi::{CStr, c_char};

use tracing::debug;

/// Upper bound on an identifier read from a foreign image.
///
/// Anything longer is treated as a corrupt record.
pub const MAX_IDENTIFIER_LEN: usize = 4096;

/// Which section a record type lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    /// `&'static str` records.
    StaticStr,
    /// NUL-terminated string records.
    CStr,
}

impl SectionKind {
    /// Name of the ELF section holding records of this kind.
    pub const fn section_name(self) -> &'static str {
        match self {
            Self::StaticStr => "linkme_ORCHESTRA_SVC",
            Self::CStr => "linkme_ORCHESTRA_CSVC",
        }
    }
}

/// A fixed-layout record that decodes to one identifier.
pub trait SectionRecord: Copy + Sync + 'static {
    /// Section the records live in.
    const KIND: SectionKind;

    /// The records linked into the current image.
    fn linked() -> &'static [Self];

    /// Decodes the identifier.
    ///
    /// Returns `None` for null pointers, oversized records and invalid UTF-8.
    ///
    /// # Safety
    ///
    /// The pointers inside the record must point into memory that is mapped
    /// and live for the duration of the call.  Records read from a loaded
    /// image satisfy this because the image stays loaded while it is scanned.
    unsafe fn decode(&self) -> Option<String>;
}

// =============================================================================
// StaticStrRecord
// =============================================================================

/// Length and pointer of a static string.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StaticStrRecord {
    ptr: *const u8,
    len: usize,
}

// SAFETY: the pointer refers to immutable static data.
unsafe impl Sync for StaticStrRecord {}
unsafe impl Send for StaticStrRecord {}

impl StaticStrRecord {
    /// Creates a record for `name`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            ptr: name.as_ptr(),
            len: name.len(),
        }
    }
}

impl SectionRecord for StaticStrRecord {
    const KIND: SectionKind = SectionKind::StaticStr;

    fn linked() -> &'static [Self] {
        &super::ORCHESTRA_SVC
    }

    unsafe fn decode(&self) -> Option<String> {
        if self.ptr.is_null() || self.len > MAX_IDENTIFIER_LEN {
            debug!(len = self.len, "Skipping malformed static string record");
            return None;
        }
        // SAFETY: non-null, bounded, and valid per the caller's contract.
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        match std::str::from_utf8(bytes) {
            Ok(s) => Some(s.to_owned()),
            Err(e) => {
                debug!(error = %e, "Skipping record with invalid UTF-8");
                None
            }
        }
    }
}

// =============================================================================
// CStrRecord
// =============================================================================

/// Pointer to a NUL-terminated string.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CStrRecord {
    ptr: *const c_char,
}

// SAFETY: the pointer refers to immutable static data.
unsafe impl Sync for CStrRecord {}
unsafe impl Send for CStrRecord {}

impl CStrRecord {
    /// Creates a record for `name`.
    pub const fn new(name: &'static CStr) -> Self {
        Self { ptr: name.as_ptr() }
    }

    /// Creates a record from bytes ending in a single NUL.
    ///
    /// Evaluated in a `const` item this fails the build on malformed input.
    pub const fn from_bytes_with_nul(bytes: &'static [u8]) -> Self {
        match CStr::from_bytes_with_nul(bytes) {
            Ok(name) => Self::new(name),
            Err(_) => panic!("identifier must end with exactly one NUL byte"),
        }
    }
}

impl SectionRecord for CStrRecord {
    const KIND: SectionKind = SectionKind::CStr;

    fn linked() -> &'static [Self] {
        &super::ORCHESTRA_CSVC
    }

    unsafe fn decode(&self) -> Option<String> {
        if self.ptr.is_null() {
            return None;
        }
        // SAFETY: non-null and NUL-terminated per the caller's contract.
        let name = unsafe { CStr::from_ptr(self.ptr) };
        let bytes = name.to_bytes();
        if bytes.len() > MAX_IDENTIFIER_LEN {
            debug!(len = bytes.len(), "Skipping oversized C string record");
            return None;
        }
        match name.to_str() {
            Ok(s) => Some(s.to_owned()),
            Err(e) => {
                debug!(error = %e, "Skipping record with invalid UTF-8");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_str_record_decodes() {
        let record = StaticStrRecord::new("app.CrashReporter");
        assert_eq!(
            unsafe { record.decode() }.as_deref(),
            Some("app.CrashReporter")
        );
    }

    #[test]
    fn test_cstr_record_decodes() {
        const RECORD: CStrRecord = CStrRecord::from_bytes_with_nul(b"app.Push\0");
        assert_eq!(unsafe { RECORD.decode() }.as_deref(), Some("app.Push"));
        assert_eq!(
            unsafe { CStrRecord::new(c"").decode() }.as_deref(),
            Some("")
        );
    }

    #[test]
    fn test_invalid_records_are_dropped() {
        static BAD: [u8; 2] = [0xff, 0xfe];
        let record = StaticStrRecord {
            ptr: BAD.as_ptr(),
            len: BAD.len(),
        };
        assert!(unsafe { record.decode() }.is_none());

        let null = StaticStrRecord {
            ptr: std::ptr::null(),
            len: 3,
        };
        assert!(unsafe { null.decode() }.is_none());

        let null = CStrRecord {
            ptr: std::ptr::null(),
        };
        assert!(unsafe { null.decode() }.is_none());
    }

    #[test]
    fn test_section_names() {
        assert_eq!(
            StaticStrRecord::KIND.section_name(),
            "linkme_ORCHESTRA_SVC"
        );
        assert_eq!(CStrRecord::KIND.section_name(), "linkme_ORCHESTRA_CSVC");
    }
}
