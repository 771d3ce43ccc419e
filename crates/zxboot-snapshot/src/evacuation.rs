//! Redirection of the firmware's own working storage while an image loads over it.
//!
//! The firmware keeps its variables and stack in a fixed window of RAM. Image bytes destined for
//! that window are parked in a staging buffer (the NIC's spare SRAM on real hardware) and copied
//! into place as the last step before the image starts.

use tracing::{debug, trace};
use zxboot_packet::Checksum;

use crate::target::LoadTarget;

/// Byte-addressed scratch memory outside the machine's address space.
pub trait StagingArea {
    fn write_staging(&mut self, offset: u16, bytes: &[u8]);

    /// Fill `buf` from `offset`, returning the checksum of the bytes read.
    fn read_staging(&mut self, offset: u16, buf: &mut [u8]) -> Checksum;
}

impl<T: StagingArea + ?Sized> StagingArea for &mut T {
    fn write_staging(&mut self, offset: u16, bytes: &[u8]) {
        <T as StagingArea>::write_staging(&mut **self, offset, bytes)
    }

    fn read_staging(&mut self, offset: u16, buf: &mut [u8]) -> Checksum {
        <T as StagingArea>::read_staging(&mut **self, offset, buf)
    }
}

impl StagingArea for Vec<u8> {
    fn write_staging(&mut self, offset: u16, bytes: &[u8]) {
        let start = usize::from(offset);
        let end = start + bytes.len();
        if self.len() < end {
            self.resize(end, 0);
        }
        self[start..end].copy_from_slice(bytes);
    }

    fn read_staging(&mut self, offset: u16, buf: &mut [u8]) -> Checksum {
        let start = usize::from(offset);
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.get(start + i).copied().unwrap_or(0);
        }
        let mut sum = Checksum::new();
        sum.add_bytes(buf);
        sum
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvacuationRegion {
    pub start: u16,
    pub len: u16,
    /// Where the region's bytes live in the staging area.
    pub staging_offset: u16,
}

impl EvacuationRegion {
    /// The firmware's window: 0x5800..0x6000, staged at offset 0x1800 of the NIC's 8K SRAM.
    pub const FIRMWARE: Self = Self {
        start: 0x5800,
        len: 0x0800,
        staging_offset: 0x1800,
    };

    /// One past the last address, as `u32` so a region ending at 0xFFFF is representable.
    pub fn end(&self) -> u32 {
        u32::from(self.start) + u32::from(self.len)
    }

    pub fn contains(&self, addr: u16) -> bool {
        (u32::from(self.start)..self.end()).contains(&u32::from(addr))
    }
}

impl Default for EvacuationRegion {
    fn default() -> Self {
        Self::FIRMWARE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvacuationPhase {
    /// Writes into the region go to the staging area.
    Decoding,
    /// Staged bytes are being copied back; nothing is redirected any more.
    Restoring,
}

/// Decode-side handle. Turning it into a [`Restore`] ends redirection for good.
#[derive(Debug, Clone)]
pub struct Evacuation {
    region: EvacuationRegion,
    staged: usize,
    /// The staging copy of the region has been zeroed.
    cleared: bool,
}

impl Evacuation {
    pub fn new(region: EvacuationRegion) -> Self {
        Self {
            region,
            staged: 0,
            cleared: false,
        }
    }

    pub fn region(&self) -> EvacuationRegion {
        self.region
    }

    pub fn phase(&self) -> EvacuationPhase {
        EvacuationPhase::Decoding
    }

    /// Bytes redirected so far. Overlapping writes count twice.
    pub fn staged_bytes(&self) -> usize {
        self.staged
    }

    /// Wrap `target` so writes into the region land in `staging` instead.
    ///
    /// The first call zeroes the staging copy, so region bytes the image never writes are
    /// restored as zero rather than as whatever the staging area held before.
    pub fn route<'a, T, S>(
        &'a mut self,
        target: &'a mut T,
        staging: &'a mut S,
    ) -> EvacuatingTarget<'a, T, S>
    where
        T: LoadTarget + ?Sized,
        S: StagingArea + ?Sized,
    {
        if !self.cleared {
            let zeros = vec![0; usize::from(self.region.len)];
            staging.write_staging(self.region.staging_offset, &zeros);
            self.cleared = true;
        }
        EvacuatingTarget {
            region: self.region,
            staged: &mut self.staged,
            target,
            staging,
        }
    }

    /// Enter the restore phase, copying `chunk` bytes at a time.
    pub fn into_restore(self, chunk: u16) -> Restore {
        debug!(staged = self.staged, "evacuation region ready to restore");
        Restore {
            region: self.region,
            chunk: chunk.max(1),
        }
    }
}

/// One staged-to-home copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreChunk {
    pub staging_offset: u16,
    pub addr: u16,
    pub len: u16,
}

/// Restore-side handle.
#[derive(Debug, Clone)]
pub struct Restore {
    region: EvacuationRegion,
    chunk: u16,
}

impl Restore {
    pub fn phase(&self) -> EvacuationPhase {
        EvacuationPhase::Restoring
    }

    pub fn region(&self) -> EvacuationRegion {
        self.region
    }

    pub fn chunks(&self) -> RestoreChunks {
        RestoreChunks {
            region: self.region,
            done: 0,
            chunk: self.chunk,
        }
    }

    /// Copy every staged byte home, returning the checksum over all of them.
    pub fn copy_back<S, T>(self, staging: &mut S, target: &mut T) -> Checksum
    where
        S: StagingArea + ?Sized,
        T: LoadTarget + ?Sized,
    {
        let mut total = Checksum::new();
        let mut buf = vec![0u8; usize::from(self.chunk)];
        for chunk in self.chunks() {
            let buf = &mut buf[..usize::from(chunk.len)];
            let sum = staging.read_staging(chunk.staging_offset, buf);
            // Per-chunk sums only line up with the whole-range sum on even chunk boundaries.
            if self.chunk % 2 == 0 {
                total.add_u16(sum.fold());
            } else {
                total.add_bytes(buf);
            }
            target.write(chunk.addr, buf);
        }
        total
    }
}

#[derive(Debug, Clone)]
pub struct RestoreChunks {
    region: EvacuationRegion,
    done: u16,
    chunk: u16,
}

impl Iterator for RestoreChunks {
    type Item = RestoreChunk;

    fn next(&mut self) -> Option<RestoreChunk> {
        let left = self.region.len - self.done;
        if left == 0 {
            return None;
        }
        let len = left.min(self.chunk);
        let item = RestoreChunk {
            staging_offset: self.region.staging_offset.wrapping_add(self.done),
            addr: self.region.start.wrapping_add(self.done),
            len,
        };
        self.done += len;
        Some(item)
    }
}

/// [`LoadTarget`] adapter splitting writes around the evacuation region.
pub struct EvacuatingTarget<'a, T: ?Sized, S: ?Sized> {
    region: EvacuationRegion,
    staged: &'a mut usize,
    target: &'a mut T,
    staging: &'a mut S,
}

impl<T, S> LoadTarget for EvacuatingTarget<'_, T, S>
where
    T: LoadTarget + ?Sized,
    S: StagingArea + ?Sized,
{
    fn select_bank(&mut self, bank: u8) {
        self.target.select_bank(bank);
    }

    fn write(&mut self, addr: u16, bytes: &[u8]) {
        let start = u32::from(addr);
        let end = start + bytes.len() as u32;
        let lo = u32::from(self.region.start).clamp(start, end);
        let hi = self.region.end().clamp(start, end);
        let at = |a: u32| (a - start) as usize;

        if lo > start {
            self.target.write(addr, &bytes[..at(lo)]);
        }
        if hi > lo {
            let offset = (lo - u32::from(self.region.start)) as u16;
            trace!(addr = lo, len = hi - lo, "staging evacuated bytes");
            self.staging.write_staging(
                self.region.staging_offset.wrapping_add(offset),
                &bytes[at(lo)..at(hi)],
            );
            *self.staged += (hi - lo) as usize;
        }
        if end > hi {
            self.target.write(hi as u16, &bytes[at(hi)..]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::BankedMemory;

    fn small_region() -> EvacuationRegion {
        EvacuationRegion {
            start: 0x5800,
            len: 0x10,
            staging_offset: 0x100,
        }
    }

    #[test]
    fn straddling_write_is_split() {
        let mut mem = BankedMemory::new();
        let mut staging = Vec::new();
        let mut evac = Evacuation::new(small_region());
        let data: Vec<u8> = (1..=0x20).collect();
        evac.route(&mut mem, &mut staging).write(0x57f8, &data);

        assert_eq!(mem.read(0x57f8), 1);
        assert_eq!(mem.read(0x57ff), 8);
        assert_eq!(mem.read(0x5800), 0, "home region untouched");
        assert_eq!(mem.read(0x580f), 0);
        assert_eq!(mem.read(0x5810), 0x19);
        assert_eq!(mem.read(0x5817), 0x20);
        assert_eq!(&staging[0x100..0x110], &data[8..24]);
        assert_eq!(evac.staged_bytes(), 0x10);
    }

    #[test]
    fn writes_outside_region_pass_through() {
        let mut mem = BankedMemory::new();
        let mut staging = Vec::new();
        let mut evac = Evacuation::new(small_region());
        {
            let mut target = evac.route(&mut mem, &mut staging);
            target.write(0x4000, &[1, 2, 3]);
            target.write(0x5810, &[4]);
            target.write(0x5805, &[5]);
        }
        assert_eq!(mem.read(0x4002), 3);
        assert_eq!(mem.read(0x5810), 4);
        assert_eq!(mem.read(0x5805), 0);
        assert_eq!(staging[0x105], 5);
    }

    #[test]
    fn bytes_the_image_never_wrote_restore_as_zero() {
        let region = small_region();
        let mut mem = BankedMemory::new();
        mem.write(0x5800, &[0xc9; 0x10]);
        let mut staging = vec![0xaa; 0x200];

        let mut evac = Evacuation::new(region);
        evac.route(&mut mem, &mut staging).write(0x5804, &[1, 2]);
        evac.route(&mut mem, &mut staging).write(0x580a, &[3]);
        assert_eq!(staging[0xff], 0xaa, "outside the region");
        assert_eq!(staging[0x110], 0xaa, "outside the region");

        evac.into_restore(4).copy_back(&mut staging, &mut mem);
        let home: Vec<u8> = (0x5800..0x5810).map(|a| mem.read(a)).collect();
        assert_eq!(home, [0, 0, 0, 0, 1, 2, 0, 0, 0, 0, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn restore_walks_region_in_chunks() {
        let restore = Evacuation::new(EvacuationRegion::FIRMWARE).into_restore(0x300);
        assert_eq!(restore.phase(), EvacuationPhase::Restoring);
        let chunks: Vec<_> = restore.chunks().collect();
        assert_eq!(
            chunks,
            [
                RestoreChunk { staging_offset: 0x1800, addr: 0x5800, len: 0x300 },
                RestoreChunk { staging_offset: 0x1b00, addr: 0x5b00, len: 0x300 },
                RestoreChunk { staging_offset: 0x1e00, addr: 0x5e00, len: 0x200 },
            ]
        );
    }

    #[test]
    fn copy_back_checksum_matches_whole_region() {
        let region = small_region();
        let mut staging = vec![0u8; 0x100];
        staging.extend((0..0x10u8).map(|b| b.wrapping_mul(37)));
        let mut whole = Checksum::new();
        whole.add_bytes(&staging[0x100..0x110]);

        for chunk in [1, 3, 4, 7, 16] {
            let mut mem = BankedMemory::new();
            let sum = Evacuation::new(region)
                .into_restore(chunk)
                .copy_back(&mut staging, &mut mem);
            assert_eq!(sum.fold(), whole.fold(), "chunk {chunk}");
            assert_eq!(mem.read(0x5801), 37);
            assert_eq!(mem.read(0x580f), 15u8.wrapping_mul(37));
        }
    }
}
