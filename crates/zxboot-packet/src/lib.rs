#![forbid(unsafe_code)]

//! Wire codecs for the boot firmware's network path.
//!
//! Parsers borrow from the receive buffer and never allocate; builders either write into a
//! caller-provided buffer or return a freshly allocated `Vec<u8>`. Every parser fails closed:
//! anything that does not look exactly like the expected layout is reported as a
//! [`PacketError`] and the caller drops the frame.

pub mod arp;
pub mod bootp;
pub mod checksum;
pub mod ethernet;
pub mod ipv4;
pub mod syslog;
pub mod tftp;
pub mod udp;

use thiserror::Error;

pub use arp::{ArpPacket, ArpPacketBuilder, ARP_OP_REPLY, ARP_OP_REQUEST};
pub use bootp::{parse_dotted_quad, BootpMessage, BootpReplyBuilder, BootpRequestBuilder};
pub use checksum::Checksum;
pub use ethernet::{EthernetFrame, MacAddr, ETHERTYPE_ARP, ETHERTYPE_IPV4};
pub use ipv4::{Ipv4Packet, IPPROTO_UDP};
pub use tftp::{TftpErrorCode, TftpPacket};
pub use udp::UdpSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet truncated")]
    Truncated,

    #[error("output buffer too small (need {needed} bytes, have {available})")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

pub(crate) fn ensure_len(data: &[u8], len: usize) -> Result<(), PacketError> {
    if data.len() < len {
        return Err(PacketError::Truncated);
    }
    Ok(())
}

pub(crate) fn ensure_out_buf_len(out: &[u8], len: usize) -> Result<(), PacketError> {
    if out.len() < len {
        return Err(PacketError::BufferTooSmall {
            needed: len,
            available: out.len(),
        });
    }
    Ok(())
}
