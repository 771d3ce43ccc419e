use std::fmt;

use crate::error::{Result, SnapshotError};

/// Length of the header every version starts with.
pub const BASE_HEADER_LEN: usize = 30;
/// Offset just past the extended-header length word.
pub const EXTENDED_HEADER_START: usize = 32;
pub const EXTENDED_LEN_V2: u16 = 23;
pub const EXTENDED_LEN_V3: u16 = 54;
pub const EXTENDED_LEN_V3_PLUS: u16 = 55;
/// Longest header the decoder ever buffers.
pub const MAX_HEADER_LEN: usize = EXTENDED_HEADER_START + EXTENDED_LEN_V3_PLUS as usize;

pub const PAGE_HEADER_LEN: usize = 3;
pub const PAGE_LEN: usize = 0x4000;
/// Page length word marking a page stored without compression.
pub const UNCOMPRESSED_PAGE: u16 = 0xffff;

/// First byte of RAM; the ROM occupies everything below.
pub const RAM_START: u16 = 0x4000;
pub const RAM_48K_LEN: usize = 0xc000;
pub const BANK_COUNT: u8 = 8;

/// Escape byte of the run-length scheme.
pub const RLE_MARKER: u8 = 0xed;
/// Terminator appended to a compressed version 1 body.
pub const V1_END_MARKER: [u8; 4] = [0x00, 0xed, 0xed, 0x00];

/// Bit in the misc flags byte that marks a SamRom image (version 1 only).
pub const FLAG_SAMROM: u8 = 0x10;
/// Bit in the misc flags byte that marks a compressed version 1 body.
pub const FLAG_COMPRESSED: u8 = 0x20;
/// Bit in the hardware-modify byte that turns a 48K machine into a 16K one.
pub const FLAG_MODIFY_HARDWARE: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatVersion {
    V1,
    V2,
    V3,
}

impl FormatVersion {
    pub fn from_extended_len(len: u16) -> Result<Self> {
        match len {
            EXTENDED_LEN_V2 => Ok(Self::V2),
            EXTENDED_LEN_V3 | EXTENDED_LEN_V3_PLUS => Ok(Self::V3),
            other => Err(SnapshotError::UnsupportedVersion(other)),
        }
    }

    /// Extended-header length this crate writes for the version; `None` for version 1.
    pub fn extended_len(self) -> Option<u16> {
        match self {
            Self::V1 => None,
            Self::V2 => Some(EXTENDED_LEN_V2),
            Self::V3 => Some(EXTENDED_LEN_V3),
        }
    }

    pub fn is_paged(self) -> bool {
        self != Self::V1
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            Self::V1 => 1,
            Self::V2 => 2,
            Self::V3 => 3,
        };
        write!(f, "v{n}")
    }
}

/// The two memory layouts the loader can reproduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareClass {
    Spectrum48k,
    Spectrum128k,
}

impl HardwareClass {
    /// Classify the header's hardware byte. The numbering differs between versions 2 and 3.
    pub fn from_hardware_type(version: FormatVersion, hw_type: u8) -> Result<Self> {
        let class = match (version, hw_type) {
            (FormatVersion::V1, _) => Some(Self::Spectrum48k),
            (FormatVersion::V2, 0 | 1) => Some(Self::Spectrum48k),
            (FormatVersion::V2, 3 | 4) => Some(Self::Spectrum128k),
            (FormatVersion::V3, 0 | 1 | 3) => Some(Self::Spectrum48k),
            (FormatVersion::V3, 4 | 5 | 6 | 7 | 12 | 13) => Some(Self::Spectrum128k),
            _ => None,
        };
        class.ok_or(SnapshotError::UnsupportedHardware { version, hw_type })
    }

    /// Hardware byte written for this class by the image builder.
    pub fn hardware_type(self, version: FormatVersion) -> u8 {
        match (self, version) {
            (Self::Spectrum48k, _) => 0,
            (Self::Spectrum128k, FormatVersion::V3) => 4,
            (Self::Spectrum128k, _) => 3,
        }
    }

    pub fn page_count(self) -> usize {
        match self {
            Self::Spectrum48k => 3,
            Self::Spectrum128k => BANK_COUNT as usize,
        }
    }

    /// Total RAM bytes a complete image writes.
    pub fn ram_len(self) -> usize {
        self.page_count() * PAGE_LEN
    }

    pub fn has_ay(self) -> bool {
        self == Self::Spectrum128k
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Spectrum48k => "48K",
            Self::Spectrum128k => "128K",
        }
    }
}

/// Where a stored page is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlacement {
    /// Bank to page in at 0xC000 before writing, if any.
    pub bank: Option<u8>,
    pub base: u16,
}

/// Map a page id from a version 2/3 page header to its load address.
pub fn page_placement(class: HardwareClass, page_id: u8) -> Result<PagePlacement> {
    let fixed = |base| Ok(PagePlacement { bank: None, base });
    match (class, page_id) {
        (_, 8) => fixed(0x4000),
        (HardwareClass::Spectrum48k, 4) => fixed(0x8000),
        (HardwareClass::Spectrum48k, 5) => fixed(0xc000),
        (HardwareClass::Spectrum128k, 3..=10) => Ok(PagePlacement {
            bank: Some(page_id - 3),
            base: 0xc000,
        }),
        _ => Err(SnapshotError::InvalidPage(page_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_length_selects_version() {
        assert_eq!(FormatVersion::from_extended_len(23).unwrap(), FormatVersion::V2);
        assert_eq!(FormatVersion::from_extended_len(54).unwrap(), FormatVersion::V3);
        assert_eq!(FormatVersion::from_extended_len(55).unwrap(), FormatVersion::V3);
        assert!(matches!(
            FormatVersion::from_extended_len(24),
            Err(SnapshotError::UnsupportedVersion(24))
        ));
    }

    #[test]
    fn hardware_numbering_depends_on_version() {
        use FormatVersion::*;
        use HardwareClass::*;
        assert_eq!(HardwareClass::from_hardware_type(V2, 3).unwrap(), Spectrum128k);
        assert_eq!(HardwareClass::from_hardware_type(V3, 3).unwrap(), Spectrum48k);
        assert_eq!(HardwareClass::from_hardware_type(V3, 13).unwrap(), Spectrum128k);
        for (version, hw) in [(V2, 2), (V3, 2), (V2, 5), (V3, 9), (V3, 128)] {
            assert!(HardwareClass::from_hardware_type(version, hw).is_err(), "{version} {hw}");
        }
    }

    #[test]
    fn page_ids_map_to_addresses() {
        use HardwareClass::*;
        assert_eq!(page_placement(Spectrum48k, 8).unwrap().base, 0x4000);
        assert_eq!(page_placement(Spectrum48k, 4).unwrap().base, 0x8000);
        assert_eq!(page_placement(Spectrum48k, 5).unwrap().base, 0xc000);
        assert!(page_placement(Spectrum48k, 3).is_err());

        assert_eq!(
            page_placement(Spectrum128k, 8).unwrap(),
            PagePlacement { bank: None, base: 0x4000 }
        );
        assert_eq!(
            page_placement(Spectrum128k, 10).unwrap(),
            PagePlacement { bank: Some(7), base: 0xc000 }
        );
        assert!(page_placement(Spectrum128k, 11).is_err());
        assert!(page_placement(Spectrum128k, 0).is_err());
    }
}
