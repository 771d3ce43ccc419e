#![forbid(unsafe_code)]

//! Streaming decoder for ZX Spectrum `.z80` snapshots.
//!
//! [`SnapshotDecoder`] accepts the file in segments of any size and writes memory to a
//! [`LoadTarget`] as it goes. [`Evacuation`] keeps the loader's own working storage alive while
//! the image is written over it.

mod decoder;
mod directory;
mod error;
mod evacuation;
mod format;
mod header;
mod io;
mod rle;
mod target;

#[cfg(feature = "image-builder")]
mod builder;

pub use crate::decoder::{DecodeStatus, SnapshotDecoder};
pub use crate::directory::{BodyLayout, PageEntry, SnapshotDirectory};
pub use crate::error::{Result, SnapshotError};
pub use crate::evacuation::{
    EvacuatingTarget, Evacuation, EvacuationPhase, EvacuationRegion, Restore, RestoreChunk,
    RestoreChunks, StagingArea,
};
pub use crate::format::{
    page_placement, FormatVersion, HardwareClass, PagePlacement, BANK_COUNT, PAGE_LEN,
    RAM_48K_LEN, RAM_START,
};
pub use crate::header::{InterruptMode, Registers, SnapshotHeader};
pub use crate::rle::{Chunk, RunDecoder};
pub use crate::target::{BankedMemory, LoadTarget};

#[cfg(feature = "image-builder")]
pub use crate::builder::{MemoryImage, SnapshotBuilder};
#[cfg(feature = "image-builder")]
pub use crate::rle::compress;

/// Decode a complete in-memory image, `segment` bytes at a time.
pub fn load_image(bytes: &[u8], segment: usize) -> Result<(SnapshotHeader, BankedMemory)> {
    let mut memory = BankedMemory::new();
    let mut decoder = SnapshotDecoder::new();
    for chunk in bytes.chunks(segment.max(1)) {
        if decoder.feed(chunk, &mut memory)? == DecodeStatus::Done {
            break;
        }
    }
    decoder.finish(&mut memory)?;
    let header = decoder
        .header()
        .cloned()
        .ok_or(SnapshotError::Corrupt("file ends inside the header"))?;
    Ok((header, memory))
}
