//! Walks the loaded images of the process and collects section records.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, debug_span, info, warn};

use super::record::SectionRecord;
#[cfg(any(
    not(any(target_os = "linux", target_os = "android", target_os = "freebsd")),
    not(target_pointer_width = "64")
))]
use super::decode_records;
use crate::error::ScanError;

/// Scanner options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Skip images outside the directory of the main executable.
    ///
    /// The main executable itself is always scanned.
    pub restrict_to_app_dir: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            restrict_to_app_dir: true,
        }
    }
}

/// Result of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Deduplicated identifiers, in sorted order.
    pub identifiers: BTreeSet<String>,
    /// Images enumerated.
    pub images_visited: usize,
    /// Images skipped because of a [`ScanError`].
    pub images_skipped: usize,
    /// Images in which the section was found and read.
    pub sections_found: usize,
}

impl ScanReport {
    /// Folds the outcome of reading one image into the report.
    ///
    /// A failed image is counted and logged, never propagated.
    pub(crate) fn absorb(&mut self, image: &Path, read: Result<Vec<String>, ScanError>) {
        self.images_visited += 1;
        match read {
            Ok(ids) => {
                self.sections_found += 1;
                debug!(path = ?image, count = ids.len(), "Read section records");
                self.identifiers.extend(ids);
            }
            Err(e) => {
                self.images_skipped += 1;
                if e.is_expected() {
                    debug!(error = %e, "Skipping image");
                } else {
                    warn!(error = %e, "Skipping unreadable image");
                }
            }
        }
    }
}

/// Reads identifier records from every loaded image.
#[derive(Debug, Clone)]
pub struct SectionScanner {
    options: ScanOptions,
    main_exe: Option<PathBuf>,
    app_dir: Option<PathBuf>,
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl SectionScanner {
    /// Creates a scanner rooted at the current executable.
    pub fn new(options: ScanOptions) -> Self {
        let main_exe = std::env::current_exe().ok().map(|p| canonical(&p));
        let app_dir = main_exe
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        Self {
            options,
            main_exe,
            app_dir,
        }
    }

    /// The directory images must live in when `restrict_to_app_dir` is set.
    pub fn app_dir(&self) -> Option<&Path> {
        self.app_dir.as_deref()
    }

    /// Returns `true` if an image at `path` belongs to the application.
    pub fn in_app_dir(&self, path: &Path) -> bool {
        if !self.options.restrict_to_app_dir {
            return true;
        }
        match &self.app_dir {
            Some(dir) => canonical(path).starts_with(dir),
            None => false,
        }
    }

    /// Scans every loaded image for records of type `T`.
    ///
    /// Never fails: images that cannot be read are logged and skipped.
    pub fn scan<T: SectionRecord>(&self) -> ScanReport {
        let section = T::KIND.section_name();
        let _span = debug_span!("section_scan", section).entered();

        let report = self.scan_images::<T>();
        info!(
            section,
            identifiers = report.identifiers.len(),
            images = report.images_visited,
            skipped = report.images_skipped,
            found = report.sections_found,
            "Section scan complete"
        );
        report
    }

    /// Shorthand for `scan::<T>().identifiers`.
    pub fn identifiers<T: SectionRecord>(&self) -> BTreeSet<String> {
        self.scan::<T>().identifiers
    }

    #[cfg(all(
        any(target_os = "linux", target_os = "android", target_os = "freebsd"),
        target_pointer_width = "64"
    ))]
    fn scan_images<T: SectionRecord>(&self) -> ScanReport {
        let mut report = ScanReport::default();
        for image in images::loaded_images(self.main_exe.as_deref()) {
            let read = self.scan_image::<T>(&image);
            report.absorb(&image.path, read);
        }
        report
    }

    #[cfg(not(all(
        any(target_os = "linux", target_os = "android", target_os = "freebsd"),
        target_pointer_width = "64"
    )))]
    fn scan_images<T: SectionRecord>(&self) -> ScanReport {
        debug!("Image enumeration unsupported on this target, reading linked records only");
        let records = T::linked();
        // SAFETY: the slice is this image's own static data.
        let ids = unsafe {
            decode_records::<T>(records.as_ptr().cast(), std::mem::size_of_val(records))
        };
        ScanReport {
            identifiers: ids.into_iter().collect(),
            images_visited: 1,
            images_skipped: 0,
            sections_found: usize::from(!records.is_empty()),
        }
    }

    #[cfg(all(
        any(target_os = "linux", target_os = "android", target_os = "freebsd"),
        target_pointer_width = "64"
    ))]
    fn scan_image<T: SectionRecord>(&self, image: &images::LoadedImage) -> Result<Vec<String>, ScanError> {
        use super::elf::{self, EHDR_SIZE};
        use super::{decode_records, record_stride};

        let path = image.path.clone();
        let section = T::KIND.section_name();

        if !image.is_main && !self.in_app_dir(&path) {
            return Err(ScanError::OutsideAppDir { path });
        }

        // Check the mapped header before trusting anything read from disk.
        let mapped = image
            .mapped_header()
            .ok_or_else(|| ScanError::Truncated {
                path: path.clone(),
                what: "mapped header",
            })?;
        elf::check_ident(mapped).map_err(|e| images::elf_error(&path, e))?;

        let file = std::fs::File::open(&path).map_err(|source| ScanError::Io {
            path: path.clone(),
            source,
        })?;
        let on_disk = elf::ImageSource::read_at(&file, 0, EHDR_SIZE)
            .map_err(|e| images::elf_error(&path, e))?;
        if on_disk.as_ref() != mapped {
            return Err(ScanError::Stale { path });
        }

        let header = elf::find_section(&file, section)
            .map_err(|e| images::elf_error(&path, e))?
            .ok_or_else(|| ScanError::SectionMissing {
                path: path.clone(),
                section,
            })?;
        if header.size == 0 {
            return Err(ScanError::SectionEmpty { path, section });
        }
        if !header.is_alloc() || !image.contains(header.addr, header.size) {
            return Err(ScanError::SectionNotLoaded { path, section });
        }

        let start = image.base.wrapping_add(header.addr as usize);
        if start % std::mem::align_of::<T>() != 0 {
            return Err(ScanError::Misaligned { path, section });
        }
        let len = header.size as usize;
        debug!(
            path = ?image.path,
            len,
            stride = record_stride::<T>(),
            "Found identifier section"
        );

        // SAFETY: the range lies inside a PT_LOAD segment of an image that
        // stays loaded for the duration of the scan, and the section holds
        // records of type `T` written by the registration attributes.
        Ok(unsafe { decode_records::<T>(start as *const u8, len) })
    }
}

impl Default for SectionScanner {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}

#[cfg(all(
    any(target_os = "linux", target_os = "android", target_os = "freebsd"),
    target_pointer_width = "64"
))]
mod images {
    //! Image enumeration through `dl_iterate_phdr`.

    use std::ffi::CStr;
    use std::path::{Path, PathBuf};

    use super::super::elf::{EHDR_SIZE, ElfError};
    use crate::error::ScanError;

    #[derive(Debug, Clone, Copy)]
    pub(super) struct Segment {
        vaddr: u64,
        memsz: u64,
        offset: u64,
        filesz: u64,
    }

    #[derive(Debug)]
    pub(super) struct LoadedImage {
        pub path: PathBuf,
        pub is_main: bool,
        pub base: usize,
        segments: Vec<Segment>,
    }

    impl LoadedImage {
        /// The ELF header as mapped by the loader.
        pub fn mapped_header(&self) -> Option<&[u8]> {
            let segment = self
                .segments
                .iter()
                .find(|s| s.offset == 0 && s.filesz >= EHDR_SIZE as u64)?;
            let addr = self.base.wrapping_add(segment.vaddr as usize);
            // SAFETY: the first file-backed bytes of a PT_LOAD segment at
            // offset 0 are the ELF header, mapped for the image's lifetime.
            Some(unsafe { std::slice::from_raw_parts(addr as *const u8, EHDR_SIZE) })
        }

        /// Returns `true` if `[addr, addr + size)` lies in one loaded segment.
        pub fn contains(&self, addr: u64, size: u64) -> bool {
            let Some(end) = addr.checked_add(size) else {
                return false;
            };
            self.segments.iter().any(|s| {
                s.vaddr <= addr && s.vaddr.checked_add(s.memsz).is_some_and(|seg_end| end <= seg_end)
            })
        }
    }

    pub(super) fn elf_error(path: &Path, err: ElfError) -> ScanError {
        let path = path.to_path_buf();
        match err {
            ElfError::BadMagic => ScanError::BadMagic { path },
            ElfError::NotNative { .. } => ScanError::NotNative { path },
            ElfError::Truncated(what) => ScanError::Truncated { path, what },
            ElfError::Io(source) => ScanError::Io { path, source },
        }
    }

    struct Collector {
        main_exe: Option<PathBuf>,
        images: Vec<LoadedImage>,
    }

    unsafe extern "C" fn collect(
        info: *mut libc::dl_phdr_info,
        _size: libc::size_t,
        data: *mut libc::c_void,
    ) -> libc::c_int {
        // SAFETY: `data` is the `Collector` passed to `dl_iterate_phdr` below
        // and `info` is valid for the duration of the callback.
        let (collector, info) = unsafe { (&mut *data.cast::<Collector>(), &*info) };

        let name = if info.dlpi_name.is_null() {
            &[][..]
        } else {
            // SAFETY: the loader hands out NUL-terminated names.
            unsafe { CStr::from_ptr(info.dlpi_name) }.to_bytes()
        };

        let is_main = collector.images.is_empty() && name.is_empty();
        let path = if is_main {
            match &collector.main_exe {
                Some(exe) => exe.clone(),
                None => return 0,
            }
        } else {
            let Ok(name) = std::str::from_utf8(name) else {
                return 0;
            };
            let path = PathBuf::from(name);
            // Unnamed or relative entries (the vDSO) have no file to read.
            if !path.is_absolute() {
                return 0;
            }
            path
        };

        let phdrs = if info.dlpi_phdr.is_null() {
            &[][..]
        } else {
            // SAFETY: the loader guarantees `dlpi_phnum` entries.
            unsafe { std::slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum)) }
        };
        let segments = phdrs
            .iter()
            .filter(|p| p.p_type == libc::PT_LOAD)
            .map(|p| Segment {
                vaddr: p.p_vaddr,
                memsz: p.p_memsz,
                offset: p.p_offset,
                filesz: p.p_filesz,
            })
            .collect();

        collector.images.push(LoadedImage {
            path,
            is_main,
            base: info.dlpi_addr as usize,
            segments,
        });
        0
    }

    /// Lists every image currently loaded into the process.
    pub(super) fn loaded_images(main_exe: Option<&Path>) -> Vec<LoadedImage> {
        let mut collector = Collector {
            main_exe: main_exe.map(Path::to_path_buf),
            images: Vec::new(),
        };
        // SAFETY: `collect` only touches `collector` through `data`, which
        // outlives the call.
        unsafe {
            libc::dl_iterate_phdr(
                Some(collect),
                (&mut collector as *mut Collector).cast::<libc::c_void>(),
            );
        }
        collector.images
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_main_image_comes_first() {
            let exe = std::env::current_exe().unwrap();
            let images = loaded_images(Some(&exe));
            assert!(!images.is_empty());
            assert!(images[0].is_main);
            assert_eq!(images[0].path, exe);
            assert!(images.iter().skip(1).all(|i| !i.is_main));
            assert!(images[0].mapped_header().is_some());
        }

        #[test]
        fn test_segment_containment() {
            let image = LoadedImage {
                path: PathBuf::from("/app/libfoo.so"),
                is_main: false,
                base: 0,
                segments: vec![Segment {
                    vaddr: 0x1000,
                    memsz: 0x2000,
                    offset: 0,
                    filesz: 0x2000,
                }],
            };
            assert!(image.contains(0x1000, 0x10));
            assert!(image.contains(0x2ff0, 0x10));
            assert!(!image.contains(0x2ff0, 0x11));
            assert!(!image.contains(0x800, 0x10));
            assert!(!image.contains(u64::MAX, 2));
        }
    }
}

#[cfg(test)]
mod tests {
    use linkme::distributed_slice;

    use super::*;
    use crate::section::{CStrRecord, ORCHESTRA_CSVC, ORCHESTRA_SVC, StaticStrRecord};

    #[distributed_slice(ORCHESTRA_SVC)]
    static SCAN_PROBE: StaticStrRecord = StaticStrRecord::new("orchestra_core.ScanProbe");

    #[distributed_slice(ORCHESTRA_SVC)]
    static SCAN_PROBE_AGAIN: StaticStrRecord = StaticStrRecord::new("orchestra_core.ScanProbe");

    #[distributed_slice(ORCHESTRA_SVC)]
    static SCAN_EMPTY: StaticStrRecord = StaticStrRecord::new("");

    #[distributed_slice(ORCHESTRA_CSVC)]
    static SCAN_CPROBE: CStrRecord = CStrRecord::new(c"orchestra_core.CScanProbe");

    #[test]
    fn test_scan_reads_own_section() {
        let report = SectionScanner::default().scan::<StaticStrRecord>();
        assert!(report.sections_found >= 1);
        assert!(report.identifiers.contains("orchestra_core.ScanProbe"));
        assert!(!report.identifiers.contains(""));
        assert!(report.images_visited >= report.sections_found);
    }

    #[test]
    fn test_scan_reads_cstr_section() {
        let ids = SectionScanner::default().identifiers::<CStrRecord>();
        assert!(ids.contains("orchestra_core.CScanProbe"));
        assert!(!ids.contains("orchestra_core.ScanProbe"));
    }

    #[test]
    fn test_unrestricted_scan_still_finds_main_image() {
        let scanner = SectionScanner::new(ScanOptions {
            restrict_to_app_dir: false,
        });
        assert!(scanner.in_app_dir(Path::new("/usr/lib/libc.so.6")));
        assert!(
            scanner
                .identifiers::<StaticStrRecord>()
                .contains("orchestra_core.ScanProbe")
        );
    }

    #[test]
    fn test_identifiers_dedup_across_images() {
        let mut report = ScanReport::default();
        report.absorb(
            Path::new("/app/bin"),
            Ok(vec!["app.Shared".into(), "app.Main".into()]),
        );
        report.absorb(
            Path::new("/app/libplugin.so"),
            Ok(vec!["app.Shared".into(), "app.Plugin".into()]),
        );
        report.absorb(
            Path::new("/usr/lib/libc.so.6"),
            Err(ScanError::OutsideAppDir {
                path: "/usr/lib/libc.so.6".into(),
            }),
        );

        assert_eq!(
            report.identifiers.iter().map(String::as_str).collect::<Vec<_>>(),
            ["app.Main", "app.Plugin", "app.Shared"]
        );
        assert_eq!(report.images_visited, 3);
        assert_eq!(report.sections_found, 2);
        assert_eq!(report.images_skipped, 1);
    }

    #[test]
    fn test_app_dir_filter() {
        let scanner = SectionScanner::default();
        let dir = scanner.app_dir().unwrap().to_path_buf();
        assert!(scanner.in_app_dir(&dir.join("libplugin.so")));
        assert!(!scanner.in_app_dir(Path::new("/definitely/not/here/libc.so")));
    }
}
