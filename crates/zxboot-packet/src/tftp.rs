//! TFTP (RFC 1350) packets. Only the read side is needed by the client; write requests are
//! parsed as [`TftpPacket::Unsupported`].

use super::{ensure_len, PacketError};

pub const TFTP_SERVER_PORT: u16 = 69;

/// Maximum DATA payload; a shorter segment ends the transfer.
pub const MAX_DATA_LEN: usize = 512;

pub const OPCODE_RRQ: u16 = 1;
pub const OPCODE_DATA: u16 = 3;
pub const OPCODE_ACK: u16 = 4;
pub const OPCODE_ERROR: u16 = 5;

pub const MODE_OCTET: &str = "octet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TftpErrorCode(pub u16);

impl TftpErrorCode {
    pub const NOT_DEFINED: Self = Self(0);
    pub const FILE_NOT_FOUND: Self = Self(1);
    pub const ILLEGAL_OPERATION: Self = Self(4);
    pub const UNKNOWN_TRANSFER_ID: Self = Self(5);

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "not defined",
            1 => "file not found",
            2 => "access violation",
            3 => "disk full",
            4 => "illegal TFTP operation",
            5 => "unknown transfer ID",
            6 => "file already exists",
            7 => "no such user",
            _ => "unknown error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TftpPacket<'a> {
    ReadRequest { filename: &'a [u8], mode: &'a [u8] },
    Data { block: u16, payload: &'a [u8] },
    Ack { block: u16 },
    Error { code: TftpErrorCode, message: &'a [u8] },
    Unsupported { opcode: u16 },
}

impl<'a> TftpPacket<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, PacketError> {
        ensure_len(data, 2)?;
        let opcode = u16::from_be_bytes([data[0], data[1]]);
        let body = &data[2..];
        match opcode {
            OPCODE_RRQ => {
                let (filename, rest) = split_nul(body)?;
                let (mode, _options) = split_nul(rest)?;
                Ok(Self::ReadRequest { filename, mode })
            }
            OPCODE_DATA => {
                ensure_len(body, 2)?;
                Ok(Self::Data {
                    block: u16::from_be_bytes([body[0], body[1]]),
                    payload: &body[2..],
                })
            }
            OPCODE_ACK => {
                ensure_len(body, 2)?;
                Ok(Self::Ack {
                    block: u16::from_be_bytes([body[0], body[1]]),
                })
            }
            OPCODE_ERROR => {
                ensure_len(body, 2)?;
                let code = TftpErrorCode(u16::from_be_bytes([body[0], body[1]]));
                // Some servers omit the trailing NUL.
                let message = split_nul(&body[2..]).map_or(&body[2..], |(m, _)| m);
                Ok(Self::Error { code, message })
            }
            opcode => Ok(Self::Unsupported { opcode }),
        }
    }
}

fn split_nul(data: &[u8]) -> Result<(&[u8], &[u8]), PacketError> {
    let end = data
        .iter()
        .position(|&b| b == 0)
        .ok_or(PacketError::Malformed("missing NUL terminator"))?;
    Ok((&data[..end], &data[end + 1..]))
}

pub fn read_request(filename: &str, mode: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + filename.len() + mode.len());
    out.extend_from_slice(&OPCODE_RRQ.to_be_bytes());
    out.extend_from_slice(filename.as_bytes());
    out.push(0);
    out.extend_from_slice(mode.as_bytes());
    out.push(0);
    out
}

pub fn ack(block: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(4);
    out.extend_from_slice(&OPCODE_ACK.to_be_bytes());
    out.extend_from_slice(&block.to_be_bytes());
    out
}

pub fn data(block: u16, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
    if payload.len() > MAX_DATA_LEN {
        return Err(PacketError::Malformed("TFTP data payload exceeds 512 bytes"));
    }
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&OPCODE_DATA.to_be_bytes());
    out.extend_from_slice(&block.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn error(code: TftpErrorCode, message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(5 + message.len());
    out.extend_from_slice(&OPCODE_ERROR.to_be_bytes());
    out.extend_from_slice(&code.0.to_be_bytes());
    out.extend_from_slice(message.as_bytes());
    out.push(0);
    out
}
