use core::net::Ipv4Addr;

use super::checksum::transport_checksum_ipv4;
use super::ipv4::IPPROTO_UDP;
use super::{ensure_len, PacketError};

/// A UDP segment, trimmed to the length its header declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpSegment<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub checksum: u16,
    /// Header and payload, as covered by the checksum.
    pub bytes: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> UdpSegment<'a> {
    pub const HEADER_LEN: usize = 8;

    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::HEADER_LEN)?;
        let len = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        if len < Self::HEADER_LEN {
            return Err(PacketError::Malformed("UDP length < header length"));
        }
        ensure_len(buf, len)?;
        Ok(Self {
            src_port: u16::from_be_bytes([buf[0], buf[1]]),
            dst_port: u16::from_be_bytes([buf[2], buf[3]]),
            checksum: u16::from_be_bytes([buf[6], buf[7]]),
            bytes: &buf[..len],
            payload: &buf[Self::HEADER_LEN..len],
        })
    }

    /// A zero checksum field means the sender did not compute one.
    pub fn checksum_valid(&self, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        self.checksum == 0 || transport_checksum_ipv4(src, dst, IPPROTO_UDP, self.bytes) == 0
    }

    /// Build a segment with the checksum field left at zero, as the boot client sends them.
    pub fn serialize(src_port: u16, dst_port: u16, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
        let len = u16::try_from(Self::HEADER_LEN + payload.len())
            .map_err(|_| PacketError::Malformed("UDP length > 65535"))?;
        let mut out = Vec::with_capacity(usize::from(len));
        out.extend_from_slice(&src_port.to_be_bytes());
        out.extend_from_slice(&dst_port.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(payload);
        Ok(out)
    }

    /// Fill in the checksum of a segment built by [`UdpSegment::serialize`].
    pub fn seal(src: Ipv4Addr, dst: Ipv4Addr, segment: &mut [u8]) -> Result<(), PacketError> {
        ensure_len(segment, Self::HEADER_LEN)?;
        segment[6..8].fill(0);
        let csum = match transport_checksum_ipv4(src, dst, IPPROTO_UDP, segment) {
            // Zero on the wire means "not computed".
            0 => 0xffff,
            csum => csum,
        };
        segment[6..8].copy_from_slice(&csum.to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);
    const HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 17);

    #[test]
    fn client_segments_carry_no_checksum() {
        let bytes = UdpSegment::serialize(68, 67, &[1, 2, 3]).unwrap();
        assert_eq!(bytes, [0, 68, 0, 67, 0, 11, 0, 0, 1, 2, 3]);
        let seg = UdpSegment::parse(&bytes).unwrap();
        assert_eq!(seg.checksum, 0);
        assert!(seg.checksum_valid(Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST));
    }

    #[test]
    fn sealed_segment_is_bound_to_its_addresses() {
        let mut bytes = UdpSegment::serialize(69, 0xc123, b"speccy").unwrap();
        UdpSegment::seal(SERVER, HOST, &mut bytes).unwrap();
        let seg = UdpSegment::parse(&bytes).unwrap();
        assert_eq!((seg.src_port, seg.dst_port), (69, 0xc123));
        assert_eq!(seg.payload, b"speccy");
        assert_ne!(seg.checksum, 0);
        assert!(seg.checksum_valid(SERVER, HOST));
        assert!(!seg.checksum_valid(SERVER, Ipv4Addr::new(192, 168, 0, 18)));
    }

    #[test]
    fn trailing_padding_is_cut_off() {
        let mut bytes = UdpSegment::serialize(1, 2, &[9; 4]).unwrap();
        bytes.extend_from_slice(&[0; 6]);
        let seg = UdpSegment::parse(&bytes).unwrap();
        assert_eq!(seg.payload, &[9; 4]);
        assert_eq!(seg.bytes.len(), 12);
    }

    #[test]
    fn declared_length_must_fit() {
        let mut bytes = UdpSegment::serialize(1, 2, &[0; 4]).unwrap();
        bytes[5] = 7;
        assert!(matches!(UdpSegment::parse(&bytes), Err(PacketError::Malformed(_))));
        bytes[5] = 40;
        assert_eq!(UdpSegment::parse(&bytes), Err(PacketError::Truncated));
    }

    #[test]
    fn oversized_payload_is_refused() {
        assert!(UdpSegment::serialize(1, 2, &vec![0; 65_530]).is_err());
    }
}
