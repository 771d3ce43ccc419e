//! The .z80 run-length scheme: `ED ED n v` expands to `n` copies of `v`; every other byte is a
//! literal. A lone `ED` makes the byte after it literal as well, so `ED ED` pairs can only ever
//! appear as escapes.

use crate::error::{Result, SnapshotError};
use crate::format::RLE_MARKER;

/// A piece of decoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk<'a> {
    Literal(&'a [u8]),
    Repeat { value: u8, count: u8 },
}

impl Chunk<'_> {
    pub fn len(&self) -> usize {
        match self {
            Chunk::Literal(bytes) => bytes.len(),
            Chunk::Repeat { count, .. } => usize::from(*count),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    Idle,
    /// One marker byte seen.
    Marker,
    /// `ED ED` seen; next byte is the count.
    Count,
    /// Count seen; next byte is the value.
    Value(u8),
}

/// Decoder for one run of input, resumable at any byte boundary.
///
/// A run is either a single page of a version 2/3 image (bounded by the page header's length) or
/// the whole body of a version 1 image (unbounded; the caller stops once enough output exists).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDecoder {
    compressed: bool,
    remaining: Option<usize>,
    escape: Escape,
}

impl RunDecoder {
    pub fn new(compressed: bool, input_len: Option<usize>) -> Self {
        Self {
            compressed,
            remaining: input_len,
            escape: Escape::Idle,
        }
    }

    /// Input bytes still owed to this run, if the run is bounded.
    pub fn remaining(&self) -> Option<usize> {
        self.remaining
    }

    /// The input so far ends on a single marker byte whose meaning depends on what follows.
    pub fn ends_on_marker(&self) -> bool {
        self.escape == Escape::Marker
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Decode as much of `input` as belongs to this run and return the number of bytes consumed.
    pub fn decode<E>(&mut self, input: &[u8], mut emit: E) -> Result<usize>
    where
        E: FnMut(Chunk<'_>) -> Result<()>,
    {
        let take = self.remaining.map_or(input.len(), |r| r.min(input.len()));
        let input = &input[..take];
        if let Some(r) = self.remaining.as_mut() {
            *r -= take;
        }

        if !self.compressed {
            if !input.is_empty() {
                emit(Chunk::Literal(input))?;
            }
            return Ok(take);
        }

        let mut literal_start: Option<usize> = None;
        for (i, &b) in input.iter().enumerate() {
            match self.escape {
                Escape::Idle if b != RLE_MARKER => {
                    literal_start.get_or_insert(i);
                }
                Escape::Idle => {
                    if let Some(start) = literal_start.take() {
                        emit(Chunk::Literal(&input[start..i]))?;
                    }
                    self.escape = Escape::Marker;
                }
                Escape::Marker if b == RLE_MARKER => self.escape = Escape::Count,
                Escape::Marker => {
                    emit(Chunk::Literal(&[RLE_MARKER]))?;
                    literal_start = Some(i);
                    self.escape = Escape::Idle;
                }
                Escape::Count => self.escape = Escape::Value(b),
                Escape::Value(count) => {
                    if count != 0 {
                        emit(Chunk::Repeat { value: b, count })?;
                    }
                    self.escape = Escape::Idle;
                }
            }
        }
        if let Some(start) = literal_start {
            emit(Chunk::Literal(&input[start..]))?;
        }
        Ok(take)
    }

    /// Close the run: a trailing lone marker is a literal, a half-read escape is corruption.
    pub fn finish<E>(&mut self, mut emit: E) -> Result<()>
    where
        E: FnMut(Chunk<'_>) -> Result<()>,
    {
        let escape = std::mem::replace(&mut self.escape, Escape::Idle);
        match escape {
            Escape::Idle => Ok(()),
            Escape::Marker => emit(Chunk::Literal(&[RLE_MARKER])),
            Escape::Count | Escape::Value(_) => {
                Err(SnapshotError::Corrupt("run ends inside an escape sequence"))
            }
        }
    }
}

/// Compress `data` with the .z80 run-length scheme.
///
/// Runs of five or more identical bytes, and runs of two or more marker bytes, become escapes.
/// A single marker byte is emitted with the byte after it copied literally.
#[cfg(feature = "image-builder")]
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        let run = data[i..]
            .iter()
            .take(usize::from(u8::MAX))
            .take_while(|&&x| x == b)
            .count();
        if run >= 5 || (b == RLE_MARKER && run >= 2) {
            // `run` is at most 255.
            out.extend_from_slice(&[RLE_MARKER, RLE_MARKER, run as u8, b]);
            i += run;
        } else if b == RLE_MARKER {
            out.push(RLE_MARKER);
            i += 1;
            if let Some(&next) = data.get(i) {
                out.push(next);
                i += 1;
            }
        } else {
            out.push(b);
            i += 1;
        }
    }
    out
}
