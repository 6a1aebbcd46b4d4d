//! Section-resident service identifiers.
//!
//! The registration attributes place one record per service into a named
//! data section of the image being built.  At bootstrap the
//! [`SectionScanner`] walks every loaded image of the process, finds that
//! section, and decodes the records back into identifier strings.  The
//! caller resolves each identifier through the [catalog](crate::catalog).
//!
//! # Layout
//!
//! A section is a contiguous array of one record type.  Records are read at
//! `stride = size rounded up to alignment`, so `count = len / stride`.  A
//! trailing partial record is ignored.
//!
//! ```text
//!  linkme_ORCHESTRA_SVC
//! ┌──────────────┬──────────────┬──────────────┐
//! │ ptr │ len    │ ptr │ len    │ ptr │ len    │  StaticStrRecord × 3
//! └──────────────┴──────────────┴──────────────┘
//! ```

pub mod elf;
mod record;
mod scanner;

use std::alloc::Layout;

use linkme::distributed_slice;

pub use record::{CStrRecord, MAX_IDENTIFIER_LEN, SectionKind, SectionRecord, StaticStrRecord};
pub use scanner::{ScanOptions, ScanReport, SectionScanner};

// =============================================================================
// Sections (linkme distributed slices)
// =============================================================================

/// Static string records, one per `#[service]` type.
#[distributed_slice]
pub static ORCHESTRA_SVC: [StaticStrRecord];

/// NUL-terminated records, one per `#[service(cstr)]` type.
#[distributed_slice]
pub static ORCHESTRA_CSVC: [CStrRecord];

/// Distance between consecutive records of type `T`.
pub fn record_stride<T>() -> usize {
    Layout::new::<T>().pad_to_align().size()
}

/// Number of whole records in `len` bytes.
pub fn record_count(len: usize, stride: usize) -> usize {
    len.checked_div(stride).unwrap_or(0)
}

/// Decodes the records in `[start, start + len)`.
///
/// Empty identifiers and undecodable records are dropped.
///
/// # Safety
///
/// The range must be mapped, readable, and hold records of type `T` written
/// by the registration attributes (or zeroed padding).
pub unsafe fn decode_records<T: SectionRecord>(start: *const u8, len: usize) -> Vec<String> {
    let stride = record_stride::<T>();
    let count = record_count(len, stride);
    let mut identifiers = Vec::with_capacity(count);
    for index in 0..count {
        // SAFETY: `index * stride + size_of::<T>() <= len` by construction of
        // `count`, and the caller guarantees the range is readable.
        let record = unsafe { start.add(index * stride).cast::<T>().read_unaligned() };
        // SAFETY: records come from a loaded image (caller contract).
        if let Some(id) = unsafe { record.decode() }
            && !id.is_empty()
        {
            identifiers.push(id);
        }
    }
    identifiers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    struct Padded {
        _ptr: *const u8,
        _tag: u8,
    }

    #[test]
    fn test_stride_includes_padding() {
        assert_eq!(record_stride::<StaticStrRecord>(), 2 * size_of::<usize>());
        assert_eq!(record_stride::<CStrRecord>(), size_of::<usize>());
        assert_eq!(record_stride::<Padded>(), 2 * size_of::<usize>());
    }

    #[test]
    fn test_record_count_ignores_trailing_bytes() {
        assert_eq!(record_count(48, 16), 3);
        assert_eq!(record_count(50, 16), 3);
        assert_eq!(record_count(15, 16), 0);
        assert_eq!(record_count(32, 0), 0);
    }

    #[test]
    fn test_decode_records_drops_empty_and_partial() {
        let records = [
            StaticStrRecord::new("app.Logger"),
            StaticStrRecord::new(""),
            StaticStrRecord::new("app.Push"),
        ];
        let len = size_of_val(&records);

        let ids = unsafe { decode_records::<StaticStrRecord>(records.as_ptr().cast(), len) };
        assert_eq!(ids, ["app.Logger", "app.Push"]);

        // One byte short of the last record: it is not read.
        let ids = unsafe { decode_records::<StaticStrRecord>(records.as_ptr().cast(), len - 1) };
        assert_eq!(ids, ["app.Logger"]);
    }

    #[test]
    fn test_decode_zeroed_records() {
        let zeroed = [0usize; 4];
        let ids = unsafe {
            decode_records::<StaticStrRecord>(zeroed.as_ptr().cast(), size_of_val(&zeroed))
        };
        assert!(ids.is_empty());
    }
}
