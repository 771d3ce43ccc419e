use crate::error::{Result, SnapshotError};
use crate::format::{
    FormatVersion, HardwareClass, BANK_COUNT, PAGE_LEN, RAM_48K_LEN, UNCOMPRESSED_PAGE,
    V1_END_MARKER,
};
use crate::header::SnapshotHeader;
use crate::rle::compress;
use crate::target::BankedMemory;

/// RAM contents to store in an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryImage {
    /// 0x4000..=0xFFFF of a 48K machine.
    Flat48k(Vec<u8>),
    /// The eight 16K banks of a 128K machine.
    Banked(Vec<Vec<u8>>),
}

impl MemoryImage {
    pub fn from_memory(memory: &BankedMemory, hardware: HardwareClass) -> Self {
        match hardware {
            HardwareClass::Spectrum48k => Self::Flat48k(memory.flat_ram()),
            HardwareClass::Spectrum128k => {
                Self::Banked((0..BANK_COUNT).map(|b| memory.bank(b).to_vec()).collect())
            }
        }
    }

    fn page(&self, page_id: u8) -> Result<&[u8]> {
        let page = match (self, page_id) {
            (Self::Flat48k(ram), 8) => ram.get(..PAGE_LEN),
            (Self::Flat48k(ram), 4) => ram.get(PAGE_LEN..2 * PAGE_LEN),
            (Self::Flat48k(ram), 5) => ram.get(2 * PAGE_LEN..3 * PAGE_LEN),
            (Self::Banked(banks), 3..=10) => banks
                .get(usize::from(page_id - 3))
                .map(Vec::as_slice)
                .filter(|b| b.len() == PAGE_LEN),
            _ => None,
        };
        page.ok_or(SnapshotError::InvalidPage(page_id))
    }
}

/// Writes .z80 images, mainly for tests and the simulated boot server.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    header: SnapshotHeader,
    compress: bool,
    page_order: Option<Vec<u8>>,
}

impl SnapshotBuilder {
    pub fn new(header: SnapshotHeader) -> Self {
        Self {
            header,
            compress: true,
            page_order: None,
        }
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Store pages in this order instead of ascending page id.
    pub fn page_order(mut self, order: Vec<u8>) -> Self {
        self.page_order = Some(order);
        self
    }

    pub fn build(&self, memory: &MemoryImage) -> Result<Vec<u8>> {
        let mut header = self.header.clone();
        if header.version == FormatVersion::V1 {
            let MemoryImage::Flat48k(ram) = memory else {
                return Err(SnapshotError::Corrupt("version 1 images hold 48K memory only"));
            };
            if ram.len() != RAM_48K_LEN {
                return Err(SnapshotError::Corrupt("48K memory image must be 0xC000 bytes"));
            }
            header.compressed = self.compress;
            let mut out = header.to_bytes()?;
            if self.compress {
                out.extend(compress(ram));
                out.extend_from_slice(&V1_END_MARKER);
            } else {
                out.extend_from_slice(ram);
            }
            return Ok(out);
        }

        let default_order: Vec<u8> = match header.hardware {
            HardwareClass::Spectrum48k => vec![4, 5, 8],
            HardwareClass::Spectrum128k => (3..=10).collect(),
        };
        let order = self.page_order.as_ref().unwrap_or(&default_order);

        let mut out = header.to_bytes()?;
        for &page_id in order {
            let data = memory.page(page_id)?;
            let packed = self.compress.then(|| compress(data));
            match packed {
                Some(packed) if packed.len() < usize::from(UNCOMPRESSED_PAGE) => {
                    out.extend_from_slice(&(packed.len() as u16).to_le_bytes());
                    out.push(page_id);
                    out.extend(packed);
                }
                _ => {
                    out.extend_from_slice(&UNCOMPRESSED_PAGE.to_le_bytes());
                    out.push(page_id);
                    out.extend_from_slice(data);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_layout() {
        let header = SnapshotHeader::new(FormatVersion::V2, HardwareClass::Spectrum48k);
        let ram = vec![0u8; RAM_48K_LEN];
        let image = SnapshotBuilder::new(header)
            .compress(false)
            .build(&MemoryImage::Flat48k(ram))
            .unwrap();
        assert_eq!(image.len(), 55 + 3 * (3 + PAGE_LEN));
        assert_eq!(&image[55..58], &[0xff, 0xff, 4]);
    }

    #[test]
    fn version_one_needs_flat_memory() {
        let mut header = SnapshotHeader::new(FormatVersion::V1, HardwareClass::Spectrum48k);
        header.regs.pc = 0x8000;
        let banks = MemoryImage::Banked(vec![vec![0; PAGE_LEN]; 8]);
        assert!(SnapshotBuilder::new(header).build(&banks).is_err());
    }
}
