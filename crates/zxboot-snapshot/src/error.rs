use std::io;

use thiserror::Error;

use crate::format::FormatVersion;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported extended header length {0}")]
    UnsupportedVersion(u16),

    #[error("unsupported hardware type {hw_type} in {version} snapshot")]
    UnsupportedHardware { version: FormatVersion, hw_type: u8 },

    #[error("SamRom snapshots are not supported")]
    SamRom,

    #[error("16K Spectrum snapshots are not supported")]
    Spectrum16k,

    #[error("page {0} does not exist on this machine")]
    InvalidPage(u8),

    #[error("corrupt snapshot: {0}")]
    Corrupt(&'static str),

    #[error("snapshot ended early ({loaded} of {expected} bytes loaded)")]
    Truncated { loaded: usize, expected: usize },
}
