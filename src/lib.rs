#![forbid(unsafe_code)]

//! Network boot for the ZX Spectrum: fetch a `.z80` snapshot over BOOTP/TFTP, decode it into
//! memory while it arrives, and hand the machine over to it.
//!
//! The pieces live in their own crates and are re-exported here:
//!
//! - [`packet`]: Ethernet, ARP, IPv4, UDP, BOOTP and TFTP wire formats.
//! - [`net`]: the polled network session that fetches the boot file.
//! - [`snapshot`]: the streaming snapshot decoder and working-storage evacuation.
//! - [`loader`]: the boot sequence and the context switch into the image.

pub use zxboot_loader as loader;
pub use zxboot_net as net;
pub use zxboot_packet as packet;
pub use zxboot_snapshot as snapshot;

pub use zxboot_loader::{BootConfig, BootLoader, BootStatus, Handoff, Machine, Spectrum};
pub use zxboot_net::{FatalCode, FatalError, NetConfig};
pub use zxboot_snapshot::{SnapshotDecoder, SnapshotError, SnapshotHeader};
