//! BOOTP (RFC 951) messages, restricted to the fields a boot ROM needs.

use core::net::Ipv4Addr;

use super::ethernet::MacAddr;
use super::{ensure_len, PacketError};

pub const BOOTP_SERVER_PORT: u16 = 67;
pub const BOOTP_CLIENT_PORT: u16 = 68;

pub const BOOTP_OP_REQUEST: u8 = 1;
pub const BOOTP_OP_REPLY: u8 = 2;

/// Size of a request as sent on the wire (fixed part plus the 64-byte vendor area).
pub const MESSAGE_LEN: usize = 300;

const OFFSET_XID: usize = 4;
const OFFSET_YIADDR: usize = 16;
const OFFSET_SIADDR: usize = 20;
const OFFSET_CHADDR: usize = 28;
const OFFSET_SNAME: usize = 44;
const SNAME_LEN: usize = 64;
const OFFSET_FILE: usize = 108;
const FILE_LEN: usize = 128;
/// Everything up to and including `file`; the vendor area is optional on receive.
const FIXED_LEN: usize = OFFSET_FILE + FILE_LEN;

const HTYPE_ETHERNET: u8 = 1;

#[derive(Clone, Copy, Debug)]
pub struct BootpMessage<'a> {
    data: &'a [u8],
}

impl<'a> BootpMessage<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        ensure_len(data, FIXED_LEN)?;
        Ok(Self { data })
    }

    pub fn op(&self) -> u8 {
        self.data[0]
    }

    pub fn xid(&self) -> [u8; 4] {
        let mut xid = [0u8; 4];
        xid.copy_from_slice(&self.data[OFFSET_XID..OFFSET_XID + 4]);
        xid
    }

    pub fn yiaddr(&self) -> Ipv4Addr {
        self.addr_at(OFFSET_YIADDR)
    }

    pub fn siaddr(&self) -> Ipv4Addr {
        self.addr_at(OFFSET_SIADDR)
    }

    pub fn chaddr(&self) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.data[OFFSET_CHADDR..OFFSET_CHADDR + 6]);
        MacAddr(mac)
    }

    /// Server host name, up to the first NUL.
    pub fn sname(&self) -> &'a [u8] {
        nul_terminated(&self.data[OFFSET_SNAME..OFFSET_SNAME + SNAME_LEN])
    }

    /// Boot file name, up to the first NUL.
    pub fn file(&self) -> &'a [u8] {
        nul_terminated(&self.data[OFFSET_FILE..OFFSET_FILE + FILE_LEN])
    }

    fn addr_at(&self, offset: usize) -> Ipv4Addr {
        let b = &self.data[offset..offset + 4];
        Ipv4Addr::new(b[0], b[1], b[2], b[3])
    }
}

fn nul_terminated(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

pub struct BootpRequestBuilder {
    pub xid: [u8; 4],
    pub chaddr: MacAddr,
}

impl BootpRequestBuilder {
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = vec![0u8; MESSAGE_LEN];
        out[0] = BOOTP_OP_REQUEST;
        out[1] = HTYPE_ETHERNET;
        out[2] = 6;
        out[OFFSET_XID..OFFSET_XID + 4].copy_from_slice(&self.xid);
        out[OFFSET_CHADDR..OFFSET_CHADDR + 6].copy_from_slice(&self.chaddr.0);
        out
    }
}

/// Server-side reply builder, used by the loopback server and tests.
pub struct BootpReplyBuilder<'a> {
    pub xid: [u8; 4],
    pub chaddr: MacAddr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub sname: &'a str,
    pub file: &'a str,
}

impl BootpReplyBuilder<'_> {
    pub fn to_vec(&self) -> Result<Vec<u8>, PacketError> {
        if self.sname.len() >= SNAME_LEN {
            return Err(PacketError::Malformed("BOOTP sname too long"));
        }
        if self.file.len() >= FILE_LEN {
            return Err(PacketError::Malformed("BOOTP file name too long"));
        }
        let mut out = vec![0u8; MESSAGE_LEN];
        out[0] = BOOTP_OP_REPLY;
        out[1] = HTYPE_ETHERNET;
        out[2] = 6;
        out[OFFSET_XID..OFFSET_XID + 4].copy_from_slice(&self.xid);
        out[OFFSET_YIADDR..OFFSET_YIADDR + 4].copy_from_slice(&self.yiaddr.octets());
        out[OFFSET_SIADDR..OFFSET_SIADDR + 4].copy_from_slice(&self.siaddr.octets());
        out[OFFSET_CHADDR..OFFSET_CHADDR + 6].copy_from_slice(&self.chaddr.0);
        out[OFFSET_SNAME..OFFSET_SNAME + self.sname.len()].copy_from_slice(self.sname.as_bytes());
        out[OFFSET_FILE..OFFSET_FILE + self.file.len()].copy_from_slice(self.file.as_bytes());
        Ok(out)
    }
}

/// Parse a dotted-decimal IPv4 address as found in the `sname` field.
///
/// Only digits and dots are accepted, each octet has at most three digits and must fit in a
/// byte, and exactly four octets are required. A single trailing dot is tolerated.
pub fn parse_dotted_quad(text: &[u8]) -> Result<Ipv4Addr, PacketError> {
    let text = text.strip_suffix(b".").unwrap_or(text);
    let mut octets = [0u8; 4];
    let mut count = 0usize;
    for part in text.split(|&b| b == b'.') {
        if count == octets.len() {
            return Err(PacketError::Malformed("too many octets in address"));
        }
        if part.is_empty() || part.len() > 3 {
            return Err(PacketError::Malformed("address octet must have 1-3 digits"));
        }
        let mut value: u16 = 0;
        for &b in part {
            if !b.is_ascii_digit() {
                return Err(PacketError::Malformed("unexpected character in address"));
            }
            value = value * 10 + u16::from(b - b'0');
        }
        octets[count] = u8::try_from(value)
            .map_err(|_| PacketError::Malformed("address octet out of range"))?;
        count += 1;
    }
    if count != octets.len() {
        return Err(PacketError::Malformed("too few octets in address"));
    }
    Ok(Ipv4Addr::from(octets))
}
