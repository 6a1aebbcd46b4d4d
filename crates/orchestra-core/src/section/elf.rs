//! Minimal ELF64 reader.
//!
//! Only what the scanner needs: the file header, the section header table
//! and the section name string table.  All multi-byte fields are read in host
//! byte order, which [`parse_header`] verifies first.

use std::borrow::Cow;
use std::io;

use thiserror::Error;

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const EHDR_SIZE: usize = 64;
pub const SHDR_SIZE: usize = 64;

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;

const SHN_UNDEF: u16 = 0;
const SHN_XINDEX: u16 = 0xffff;

pub const SHF_ALLOC: u64 = 0x2;

const HOST_DATA: u8 = if cfg!(target_endian = "little") {
    ELFDATA2LSB
} else {
    ELFDATA2MSB
};

#[derive(Debug, Error)]
pub enum ElfError {
    #[error("missing ELF magic")]
    BadMagic,

    #[error("not a native 64-bit object (class {class}, data {data})")]
    NotNative { class: u8, data: u8 },

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Random-access byte source: a file on disk or a byte slice in tests.
pub trait ImageSource {
    fn read_at(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>, ElfError>;
}

impl ImageSource for [u8] {
    fn read_at(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>, ElfError> {
        let start = usize::try_from(offset).map_err(|_| ElfError::Truncated("offset"))?;
        let end = start
            .checked_add(len)
            .ok_or(ElfError::Truncated("range"))?;
        self.get(start..end)
            .map(Cow::Borrowed)
            .ok_or(ElfError::Truncated("range"))
    }
}

#[cfg(unix)]
impl ImageSource for std::fs::File {
    fn read_at(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>, ElfError> {
        use std::os::unix::fs::FileExt;

        // Lengths come from the image itself; check them before allocating.
        let end = offset
            .checked_add(len as u64)
            .ok_or(ElfError::Truncated("range"))?;
        if end > self.metadata()?.len() {
            return Err(ElfError::Truncated("file"));
        }
        let mut buf = vec![0; len];
        self.read_exact_at(&mut buf, offset).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                ElfError::Truncated("file")
            } else {
                ElfError::Io(e)
            }
        })?;
        Ok(Cow::Owned(buf))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfHeader {
    pub phoff: u64,
    pub shoff: u64,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: u32,
    pub kind: u32,
    pub flags: u64,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
}

impl SectionHeader {
    pub fn is_alloc(&self) -> bool {
        self.flags & SHF_ALLOC != 0
    }
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_ne_bytes(raw)
}

fn u64_at(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_ne_bytes(raw)
}

/// Checks identification bytes without reading any other field.
pub fn check_ident(bytes: &[u8]) -> Result<(), ElfError> {
    if bytes.len() < 16 {
        return Err(ElfError::Truncated("e_ident"));
    }
    if bytes[..4] != ELF_MAGIC {
        return Err(ElfError::BadMagic);
    }
    let (class, data) = (bytes[EI_CLASS], bytes[EI_DATA]);
    if class != ELFCLASS64 || data != HOST_DATA {
        return Err(ElfError::NotNative { class, data });
    }
    Ok(())
}

/// Parses the ELF64 file header.
pub fn parse_header(bytes: &[u8]) -> Result<ElfHeader, ElfError> {
    check_ident(bytes)?;
    if bytes.len() < EHDR_SIZE {
        return Err(ElfError::Truncated("file header"));
    }
    Ok(ElfHeader {
        phoff: u64_at(bytes, 32),
        shoff: u64_at(bytes, 40),
        phentsize: u16_at(bytes, 54),
        phnum: u16_at(bytes, 56),
        shentsize: u16_at(bytes, 58),
        shnum: u16_at(bytes, 60),
        shstrndx: u16_at(bytes, 62),
    })
}

pub fn parse_section_header(bytes: &[u8]) -> Result<SectionHeader, ElfError> {
    if bytes.len() < SHDR_SIZE {
        return Err(ElfError::Truncated("section header"));
    }
    Ok(SectionHeader {
        name: u32_at(bytes, 0),
        kind: u32_at(bytes, 4),
        flags: u64_at(bytes, 8),
        addr: u64_at(bytes, 16),
        offset: u64_at(bytes, 24),
        size: u64_at(bytes, 32),
        link: u32_at(bytes, 40),
    })
}

/// Reads every section header.
///
/// Handles the extended numbering used by objects with more than 0xff00
/// sections, where the real count and string table index live in section 0.
pub fn read_section_headers<S: ImageSource + ?Sized>(
    src: &S,
    header: &ElfHeader,
) -> Result<(Vec<SectionHeader>, usize), ElfError> {
    if header.shoff == 0 {
        return Ok((Vec::new(), 0));
    }
    let entsize = usize::from(header.shentsize);
    if entsize < SHDR_SIZE {
        return Err(ElfError::Truncated("e_shentsize"));
    }

    let first = parse_section_header(&src.read_at(header.shoff, SHDR_SIZE)?)?;
    let count = match header.shnum {
        0 => usize::try_from(first.size).map_err(|_| ElfError::Truncated("e_shnum"))?,
        n => usize::from(n),
    };
    let strndx = match header.shstrndx {
        SHN_XINDEX => first.link as usize,
        n => usize::from(n),
    };

    let len = count
        .checked_mul(entsize)
        .ok_or(ElfError::Truncated("section header table"))?;
    let table = src.read_at(header.shoff, len)?;
    let headers = table
        .chunks_exact(entsize)
        .map(parse_section_header)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((headers, strndx))
}

/// Returns the NUL-terminated name at `offset` of a string table.
pub fn section_name(strtab: &[u8], offset: u32) -> Option<&str> {
    let rest = strtab.get(offset as usize..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&rest[..end]).ok()
}

/// Finds the section called `name`.
///
/// `Ok(None)` means the image is well-formed but has no such section.
pub fn find_section<S: ImageSource + ?Sized>(
    src: &S,
    name: &str,
) -> Result<Option<SectionHeader>, ElfError> {
    let header = parse_header(&src.read_at(0, EHDR_SIZE)?)?;
    let (sections, strndx) = read_section_headers(src, &header)?;
    if sections.is_empty() || strndx == usize::from(SHN_UNDEF) {
        return Ok(None);
    }
    let strtab_header = sections
        .get(strndx)
        .ok_or(ElfError::Truncated("e_shstrndx"))?;
    let strtab_len =
        usize::try_from(strtab_header.size).map_err(|_| ElfError::Truncated("shstrtab"))?;
    let strtab = src.read_at(strtab_header.offset, strtab_len)?;

    Ok(sections
        .iter()
        .find(|sh| section_name(&strtab, sh.name) == Some(name))
        .copied())
}


#[cfg(test)]
mod tests {
    use super::testing::{Section, build_image};
    use super::*;

    fn sample() -> Vec<u8> {
        build_image(&[
            Section {
                name: ".text",
                flags: SHF_ALLOC,
                addr: 0x1000,
                data: vec![0x90; 16],
            },
            Section {
                name: "linkme_ORCHESTRA_SVC",
                flags: SHF_ALLOC | 0x1,
                addr: 0x4000,
                data: vec![0; 48],
            },
        ])
    }

    #[test]
    fn test_parse_header_rejects_foreign_objects() {
        let mut image = sample();
        assert!(parse_header(&image).is_ok());

        image[EI_CLASS] = 1;
        assert!(matches!(
            parse_header(&image),
            Err(ElfError::NotNative { class: 1, .. })
        ));

        image[0] = b'M';
        assert!(matches!(parse_header(&image), Err(ElfError::BadMagic)));
        assert!(matches!(
            parse_header(&ELF_MAGIC),
            Err(ElfError::Truncated(_))
        ));
    }

    #[test]
    fn test_find_section_by_name() {
        let image = sample();
        let section = find_section(image.as_slice(), "linkme_ORCHESTRA_SVC")
            .unwrap()
            .unwrap();
        assert_eq!(section.addr, 0x4000);
        assert_eq!(section.size, 48);
        assert!(section.is_alloc());

        let text = find_section(image.as_slice(), ".text").unwrap().unwrap();
        assert_eq!(text.size, 16);

        assert!(
            find_section(image.as_slice(), "linkme_ORCHESTRA_CSVC")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_truncated_section_table_is_an_error() {
        let image = sample();
        let cut = &image[..image.len() - 10];
        assert!(matches!(
            find_section(cut, "linkme_ORCHESTRA_SVC"),
            Err(ElfError::Truncated(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_oversized_string_table_in_file_is_rejected() {
        use std::io::Write;

        let mut image = sample();
        let header = parse_header(&image).unwrap();
        // The string table header is the last entry of the table.
        let at = header.shoff as usize + usize::from(header.shstrndx) * SHDR_SIZE;
        image[at + 32..at + 40].copy_from_slice(&(1u64 << 46).to_ne_bytes());

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&image).unwrap();
        assert!(matches!(
            find_section(&file, "linkme_ORCHESTRA_SVC"),
            Err(ElfError::Truncated(_))
        ));

        let mut intact = tempfile::tempfile().unwrap();
        intact.write_all(&sample()).unwrap();
        let section = find_section(&intact, "linkme_ORCHESTRA_SVC")
            .unwrap()
            .unwrap();
        assert_eq!(section.addr, 0x4000);
    }

    #[test]
    fn test_section_name_lookup() {
        let strtab = b"\0.text\0.data\0";
        assert_eq!(section_name(strtab, 1), Some(".text"));
        assert_eq!(section_name(strtab, 7), Some(".data"));
        assert_eq!(section_name(strtab, 0), Some(""));
        assert_eq!(section_name(strtab, 40), None);
    }
}
