use tracing::{debug, trace};

use crate::error::{Result, SnapshotError};
use crate::format::{
    page_placement, PAGE_HEADER_LEN, PAGE_LEN, BASE_HEADER_LEN, EXTENDED_HEADER_START,
    MAX_HEADER_LEN, RAM_48K_LEN, RAM_START, UNCOMPRESSED_PAGE,
};
use crate::header::SnapshotHeader;
use crate::rle::{Chunk, RunDecoder};
use crate::target::LoadTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    NeedMore,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    PageHeader,
    Page,
    /// The single memory block of a version 1 image.
    Body,
    Done,
}

/// Output window of the current run.
#[derive(Debug, Clone, Copy)]
struct Window {
    next: u32,
    end: u32,
    /// Drop output past `end` instead of failing. Version 1 bodies end by output count, so the
    /// end marker can decode to a byte or two of overshoot.
    clamp: bool,
}

impl Window {
    fn new(base: u16, len: usize, clamp: bool) -> Self {
        Self {
            next: u32::from(base),
            end: u32::from(base) + len as u32,
            clamp,
        }
    }

    fn is_full(&self) -> bool {
        self.next == self.end
    }

    fn write<T: LoadTarget + ?Sized>(&mut self, target: &mut T, chunk: Chunk<'_>) -> Result<usize> {
        let room = (self.end - self.next) as usize;
        let len = chunk.len();
        if len > room && !self.clamp {
            return Err(SnapshotError::Corrupt("page decodes to more than 16 KiB"));
        }
        let len = len.min(room);
        if len == 0 {
            return Ok(0);
        }
        // `next` < `end` <= 0x10000 here.
        let addr = self.next as u16;
        match chunk {
            Chunk::Literal(bytes) => target.write(addr, &bytes[..len]),
            Chunk::Repeat { value, .. } => target.write(addr, &[value; u8::MAX as usize][..len]),
        }
        self.next += len as u32;
        Ok(len)
    }
}

/// Streaming .z80 decoder.
///
/// Input arrives in arbitrary segments; every parse state (header bytes, page header bytes, a
/// half-read escape sequence) survives between calls to [`SnapshotDecoder::feed`], so the split
/// points never change the result.
#[derive(Debug, Clone)]
pub struct SnapshotDecoder {
    phase: Phase,
    buf: [u8; MAX_HEADER_LEN],
    buf_len: usize,
    header: Option<SnapshotHeader>,
    run: RunDecoder,
    window: Window,
    pages_seen: u16,
    pages_done: usize,
    loaded: usize,
}

impl Default for SnapshotDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::Header,
            buf: [0; MAX_HEADER_LEN],
            buf_len: 0,
            header: None,
            run: RunDecoder::new(false, Some(0)),
            window: Window::new(0, 0, false),
            pages_seen: 0,
            pages_done: 0,
            loaded: 0,
        }
    }

    /// The parsed header, once enough bytes have arrived.
    pub fn header(&self) -> Option<&SnapshotHeader> {
        self.header.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// RAM bytes written so far.
    pub fn loaded_bytes(&self) -> usize {
        self.loaded
    }

    /// RAM bytes a complete image writes, once the header is known.
    pub fn expected_bytes(&self) -> Option<usize> {
        self.header.as_ref().map(|h| h.hardware.ram_len())
    }

    pub fn pages_loaded(&self) -> usize {
        self.pages_done
    }

    /// Consume the next segment of the file. Bytes after the image is complete are ignored.
    pub fn feed<T: LoadTarget + ?Sized>(
        &mut self,
        mut input: &[u8],
        target: &mut T,
    ) -> Result<DecodeStatus> {
        while !input.is_empty() {
            let used = match self.phase {
                Phase::Header => self.feed_header(input)?,
                Phase::PageHeader => self.feed_page_header(input, target)?,
                Phase::Page | Phase::Body => self.feed_run(input, target)?,
                Phase::Done => break,
            };
            input = &input[used..];
        }
        Ok(self.status())
    }

    /// Call once the input has ended; fails unless the image was complete.
    ///
    /// A version 1 body without its end marker may stop on a lone marker byte one short of
    /// the top of RAM. That byte is a literal and is written out here.
    pub fn finish<T: LoadTarget + ?Sized>(&mut self, target: &mut T) -> Result<()> {
        if self.phase == Phase::Body && self.run.ends_on_marker() {
            let Self {
                run,
                window,
                loaded,
                ..
            } = self;
            run.finish(|chunk| {
                *loaded += window.write(&mut *target, chunk)?;
                Ok(())
            })?;
            if self.window.is_full() {
                debug!(loaded = self.loaded, "version 1 image loaded without end marker");
                self.phase = Phase::Done;
            }
        }
        match (&self.phase, &self.header) {
            (Phase::Done, _) => Ok(()),
            (_, None) => Err(SnapshotError::Corrupt("file ends inside the header")),
            (_, Some(header)) => Err(SnapshotError::Truncated {
                loaded: self.loaded,
                expected: header.hardware.ram_len(),
            }),
        }
    }

    fn status(&self) -> DecodeStatus {
        if self.phase == Phase::Done {
            DecodeStatus::Done
        } else {
            DecodeStatus::NeedMore
        }
    }

    fn feed_header(&mut self, input: &[u8]) -> Result<usize> {
        let have = &self.buf[..self.buf_len];
        let want = match SnapshotHeader::required_len(have)? {
            Some(len) => len,
            None if self.buf_len < BASE_HEADER_LEN => BASE_HEADER_LEN,
            None => EXTENDED_HEADER_START,
        };
        let take = (want - self.buf_len).min(input.len());
        self.buf[self.buf_len..self.buf_len + take].copy_from_slice(&input[..take]);
        self.buf_len += take;

        if SnapshotHeader::required_len(&self.buf[..self.buf_len])? == Some(self.buf_len) {
            let header = SnapshotHeader::parse(&self.buf[..self.buf_len])?;
            debug!(
                version = %header.version,
                hardware = header.hardware.name(),
                pc = header.regs.pc,
                "snapshot header"
            );
            if header.version.is_paged() {
                self.phase = Phase::PageHeader;
            } else {
                self.run = RunDecoder::new(header.compressed, None);
                self.window = Window::new(RAM_START, RAM_48K_LEN, true);
                self.phase = Phase::Body;
            }
            self.header = Some(header);
            self.buf_len = 0;
        }
        Ok(take)
    }

    fn feed_page_header<T: LoadTarget + ?Sized>(
        &mut self,
        input: &[u8],
        target: &mut T,
    ) -> Result<usize> {
        let take = (PAGE_HEADER_LEN - self.buf_len).min(input.len());
        self.buf[self.buf_len..self.buf_len + take].copy_from_slice(&input[..take]);
        self.buf_len += take;
        if self.buf_len < PAGE_HEADER_LEN {
            return Ok(take);
        }
        self.buf_len = 0;

        let len = u16::from_le_bytes([self.buf[0], self.buf[1]]);
        let page_id = self.buf[2];
        let hardware = self.header.as_ref().map(|h| h.hardware).ok_or(SnapshotError::Corrupt(
            "page header before snapshot header",
        ))?;
        let placement = page_placement(hardware, page_id)?;
        let bit = 1u16 << page_id;
        if self.pages_seen & bit != 0 {
            return Err(SnapshotError::Corrupt("page stored twice"));
        }
        self.pages_seen |= bit;
        trace!(page_id, len, base = placement.base, bank = ?placement.bank, "page header");

        if let Some(bank) = placement.bank {
            target.select_bank(bank);
        }
        self.run = if len == UNCOMPRESSED_PAGE {
            RunDecoder::new(false, Some(PAGE_LEN))
        } else {
            RunDecoder::new(true, Some(usize::from(len)))
        };
        self.window = Window::new(placement.base, PAGE_LEN, false);
        self.phase = Phase::Page;
        self.close_page_if_exhausted(target)?;
        Ok(take)
    }

    fn feed_run<T: LoadTarget + ?Sized>(&mut self, input: &[u8], target: &mut T) -> Result<usize> {
        let Self {
            run,
            window,
            loaded,
            ..
        } = self;
        let used = run.decode(input, |chunk| {
            *loaded += window.write(&mut *target, chunk)?;
            Ok(())
        })?;

        match self.phase {
            Phase::Body if self.window.is_full() => {
                debug!(loaded = self.loaded, "version 1 image loaded");
                self.phase = Phase::Done;
                // Anything after the last byte is the end marker.
                Ok(input.len())
            }
            Phase::Page => {
                self.close_page_if_exhausted(target)?;
                Ok(used)
            }
            _ => Ok(used),
        }
    }

    fn close_page_if_exhausted<T: LoadTarget + ?Sized>(&mut self, target: &mut T) -> Result<()> {
        if !self.run.is_exhausted() {
            return Ok(());
        }
        let Self {
            run,
            window,
            loaded,
            ..
        } = self;
        run.finish(|chunk| {
            *loaded += window.write(&mut *target, chunk)?;
            Ok(())
        })?;
        if !self.window.is_full() {
            trace!(short_by = self.window.end - self.window.next, "page shorter than 16 KiB");
        }

        self.pages_done += 1;
        let expected = self.expected_bytes().unwrap_or(usize::MAX);
        if self.loaded >= expected {
            debug!(loaded = self.loaded, pages = self.pages_done, "all pages loaded");
            self.phase = Phase::Done;
        } else {
            self.phase = Phase::PageHeader;
        }
        Ok(())
    }
}
