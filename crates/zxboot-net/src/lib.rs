#![forbid(unsafe_code)]

//! Network side of the boot ROM: a UDP-only datagram engine, a BOOTP client, and a TFTP read
//! client with stop-and-wait retransmission.
//!
//! Everything is driven by polling. Callers feed time in as [`Millis`] and frames through a
//! [`FrameIo`] implementation; nothing in this crate blocks or spawns.

mod address;
pub mod bootp;
pub mod config;
pub mod datagram;
pub mod error;
pub mod frame_io;
pub mod session;
pub mod sim;
pub mod tftp;

pub type Millis = u64;

pub use address::AddressConfig;
pub use bootp::{BootParams, ConfigClient, ConfigState};
pub use config::{FileNamePolicy, NetConfig};
pub use datagram::{DatagramEngine, Peer, Segment};
pub use error::{FatalCode, FatalError, Result};
pub use frame_io::{FrameClass, FrameIo, SramFrameIo, TxFrame, SRAM_LEN};
pub use session::{DataSink, NetSession, SessionPhase};
pub use tftp::{TransferClient, TransferEvent, TransferState};
