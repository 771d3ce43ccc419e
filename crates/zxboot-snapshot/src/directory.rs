//! Layout of a complete snapshot file, read without decoding any memory.

use std::io::{Cursor, Seek, SeekFrom};

use crate::error::{Result, SnapshotError};
use crate::format::{page_placement, PagePlacement, PAGE_HEADER_LEN, PAGE_LEN, UNCOMPRESSED_PAGE};
use crate::header::SnapshotHeader;
use crate::io::ReadLeExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub page_id: u8,
    pub placement: PagePlacement,
    /// File offset of the page body.
    pub offset: usize,
    pub encoded_len: usize,
    pub compressed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyLayout {
    /// Version 1: one block for the whole 48K.
    Flat {
        offset: usize,
        encoded_len: usize,
        compressed: bool,
    },
    Paged(Vec<PageEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDirectory {
    pub header: SnapshotHeader,
    pub body: BodyLayout,
    /// Bytes after the last page.
    pub trailing: usize,
}

impl SnapshotDirectory {
    pub fn scan(bytes: &[u8]) -> Result<Self> {
        let header_len = SnapshotHeader::required_len(bytes)?
            .ok_or(SnapshotError::Corrupt("file ends inside the header"))?;
        if bytes.len() < header_len {
            return Err(SnapshotError::Corrupt("file ends inside the header"));
        }
        let header = SnapshotHeader::parse(bytes)?;

        if !header.version.is_paged() {
            let body = BodyLayout::Flat {
                offset: header_len,
                encoded_len: bytes.len() - header_len,
                compressed: header.compressed,
            };
            return Ok(Self {
                header,
                body,
                trailing: 0,
            });
        }

        let mut pages: Vec<PageEntry> = Vec::new();
        let mut r = Cursor::new(bytes);
        r.seek(SeekFrom::Start(header_len as u64))?;
        while pages.len() < header.hardware.page_count() {
            let pos = r.position() as usize;
            if bytes.len() - pos < PAGE_HEADER_LEN {
                break;
            }
            let len = r.read_u16_le()?;
            let page_id = r.read_u8()?;
            let placement = page_placement(header.hardware, page_id)?;
            if pages.iter().any(|p| p.page_id == page_id) {
                return Err(SnapshotError::Corrupt("page stored twice"));
            }
            let compressed = len != UNCOMPRESSED_PAGE;
            let encoded_len = if compressed {
                usize::from(len)
            } else {
                PAGE_LEN
            };
            let offset = pos + PAGE_HEADER_LEN;
            if bytes.len() - offset < encoded_len {
                return Err(SnapshotError::Truncated {
                    loaded: bytes.len() - offset,
                    expected: encoded_len,
                });
            }
            r.seek(SeekFrom::Current(encoded_len as i64))?;
            pages.push(PageEntry {
                page_id,
                placement,
                offset,
                encoded_len,
                compressed,
            });
        }

        Ok(Self {
            header,
            body: BodyLayout::Paged(pages),
            trailing: bytes.len() - r.position() as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A zeroed extended header: PC 0, hardware type 0 (48K).
    fn extended_header(ext_len: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 32 + usize::from(ext_len)];
        bytes[30] = ext_len;
        bytes
    }

    #[test]
    fn lists_pages_in_file_order() {
        let mut bytes = extended_header(54);
        bytes.extend_from_slice(&[4, 0, 5, 0xed, 0xed, 9, 0]);
        bytes.extend_from_slice(&[0xff, 0xff, 8]);
        bytes.extend(std::iter::repeat(0).take(PAGE_LEN));

        let dir = SnapshotDirectory::scan(&bytes).unwrap();
        let BodyLayout::Paged(pages) = dir.body else {
            panic!("expected paged layout");
        };
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_id, 5);
        assert_eq!(pages[0].placement.base, 0xc000);
        assert!(pages[0].compressed);
        assert_eq!(pages[1].offset, 86 + 3 + 4 + 3);
        assert!(!pages[1].compressed);
        assert_eq!(dir.trailing, 0);
    }

    #[test]
    fn page_running_past_the_end_is_truncated() {
        let mut bytes = extended_header(23);
        bytes.extend_from_slice(&[0x00, 0x10, 8, 1, 2, 3]);
        assert!(matches!(
            SnapshotDirectory::scan(&bytes),
            Err(SnapshotError::Truncated { loaded: 3, expected: 0x1000 })
        ));
    }
}
