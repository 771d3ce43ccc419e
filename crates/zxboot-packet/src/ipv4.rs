use core::net::Ipv4Addr;

use super::checksum::{ipv4_header_checksum, Checksum};
use super::{ensure_len, PacketError};

pub const IPPROTO_UDP: u8 = 17;

pub const DEFAULT_TTL: u8 = 64;
const FLAG_DONT_FRAGMENT: u16 = 0x4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Packet<'a> {
    pub header: &'a [u8],
    pub total_len: u16,
    pub identification: u16,
    pub flags_fragment: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub header_checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: &'a [u8],
}

impl<'a> Ipv4Packet<'a> {
    pub const MIN_HEADER_LEN: usize = 20;

    /// Parse an IPv4 datagram. Options are skipped and any link-layer padding after
    /// `total_len` is cut off.
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::MIN_HEADER_LEN)?;
        let version = buf[0] >> 4;
        let ihl = (buf[0] & 0x0f) as usize;
        if version != 4 || ihl < 5 {
            return Err(PacketError::Malformed("invalid IPv4 header"));
        }
        let header_len = ihl * 4;
        ensure_len(buf, header_len)?;
        let total_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if total_len < header_len {
            return Err(PacketError::Malformed("IPv4 total length < header length"));
        }
        ensure_len(buf, total_len)?;

        Ok(Self {
            header: &buf[..header_len],
            total_len: total_len as u16,
            identification: u16::from_be_bytes([buf[4], buf[5]]),
            flags_fragment: u16::from_be_bytes([buf[6], buf[7]]),
            ttl: buf[8],
            protocol: buf[9],
            header_checksum: u16::from_be_bytes([buf[10], buf[11]]),
            src: Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]),
            dst: Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]),
            payload: &buf[header_len..total_len],
        })
    }

    pub fn header_checksum_valid(&self) -> bool {
        let mut acc = Checksum::new();
        acc.add_bytes(self.header);
        acc.is_intact()
    }

    pub fn is_fragment(&self) -> bool {
        // MF set or a non-zero fragment offset.
        self.flags_fragment & 0x3fff != 0
    }

    pub fn serialize(
        src: Ipv4Addr,
        dst: Ipv4Addr,
        protocol: u8,
        ttl: u8,
        payload: &[u8],
    ) -> Vec<u8> {
        let header_len = Self::MIN_HEADER_LEN;
        let total_len = header_len + payload.len();
        let mut out = vec![0u8; header_len];
        out[0] = (4u8 << 4) | 5;
        out[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        out[6..8].copy_from_slice(&FLAG_DONT_FRAGMENT.to_be_bytes());
        out[8] = ttl;
        out[9] = protocol;
        out[12..16].copy_from_slice(&src.octets());
        out[16..20].copy_from_slice(&dst.octets());
        let csum = ipv4_header_checksum(&out);
        out[10..12].copy_from_slice(&csum.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_then_parse_validates_checksum() {
        let src = Ipv4Addr::new(192, 168, 0, 17);
        let dst = Ipv4Addr::new(192, 168, 0, 1);
        let pkt = Ipv4Packet::serialize(src, dst, IPPROTO_UDP, DEFAULT_TTL, b"payload");
        let parsed = Ipv4Packet::parse(&pkt).unwrap();
        assert_eq!(parsed.src, src);
        assert_eq!(parsed.dst, dst);
        assert_eq!(parsed.protocol, IPPROTO_UDP);
        assert_eq!(parsed.ttl, 64);
        assert_eq!(parsed.payload, b"payload");
        assert!(!parsed.is_fragment());
        assert!(parsed.header_checksum_valid());
    }

    #[test]
    fn corrupted_header_fails_checksum() {
        let mut pkt = Ipv4Packet::serialize(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
            IPPROTO_UDP,
            DEFAULT_TTL,
            &[1, 2, 3],
        );
        pkt[8] ^= 0x01;
        assert!(!Ipv4Packet::parse(&pkt).unwrap().header_checksum_valid());
    }

    #[test]
    fn options_are_skipped_and_padding_trimmed() {
        let mut pkt = vec![0u8; 24];
        pkt[0] = 0x46;
        pkt[2..4].copy_from_slice(&26u16.to_be_bytes());
        pkt[9] = IPPROTO_UDP;
        pkt.extend_from_slice(&[0xaa, 0xbb]);
        pkt.extend_from_slice(&[0u8; 10]);
        let csum = ipv4_header_checksum(&pkt[..24]);
        pkt[10..12].copy_from_slice(&csum.to_be_bytes());

        let parsed = Ipv4Packet::parse(&pkt).unwrap();
        assert_eq!(parsed.header.len(), 24);
        assert_eq!(parsed.payload, &[0xaa, 0xbb]);
        assert!(parsed.header_checksum_valid());
    }

    #[test]
    fn rejects_non_ipv4() {
        let mut pkt = vec![0u8; 20];
        pkt[0] = 0x65;
        assert!(matches!(Ipv4Packet::parse(&pkt), Err(PacketError::Malformed(_))));
    }
}
