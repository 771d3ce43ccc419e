use core::net::Ipv4Addr;

use super::ethernet::{MacAddr, ETHERTYPE_IPV4};
use super::{ensure_len, PacketError};

pub const ARP_OP_REQUEST: u16 = 1;
pub const ARP_OP_REPLY: u16 = 2;

const HTYPE_ETHERNET: u16 = 1;

/// Ethernet/IPv4 ARP packet. Other hardware or protocol types are rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    pub op: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub const LEN: usize = 28;

    pub fn parse(buf: &[u8]) -> Result<Self, PacketError> {
        ensure_len(buf, Self::LEN)?;
        let htype = u16::from_be_bytes([buf[0], buf[1]]);
        let ptype = u16::from_be_bytes([buf[2], buf[3]]);
        if htype != HTYPE_ETHERNET || ptype != ETHERTYPE_IPV4 || buf[4] != 6 || buf[5] != 4 {
            return Err(PacketError::Malformed("not an Ethernet/IPv4 ARP packet"));
        }
        let mut sender_mac = [0u8; 6];
        let mut target_mac = [0u8; 6];
        sender_mac.copy_from_slice(&buf[8..14]);
        target_mac.copy_from_slice(&buf[18..24]);
        Ok(Self {
            op: u16::from_be_bytes([buf[6], buf[7]]),
            sender_mac: MacAddr(sender_mac),
            sender_ip: Ipv4Addr::new(buf[14], buf[15], buf[16], buf[17]),
            target_mac: MacAddr(target_mac),
            target_ip: Ipv4Addr::new(buf[24], buf[25], buf[26], buf[27]),
        })
    }
}

pub struct ArpPacketBuilder {
    pub op: u16,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacketBuilder {
    /// Answer `request` on behalf of `our_mac`/`our_ip`.
    pub fn reply_to(request: &ArpPacket, our_mac: MacAddr, our_ip: Ipv4Addr) -> Self {
        Self {
            op: ARP_OP_REPLY,
            sender_mac: our_mac,
            sender_ip: our_ip,
            target_mac: request.sender_mac,
            target_ip: request.sender_ip,
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ArpPacket::LEN);
        out.extend_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        out.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
        out.push(6);
        out.push(4);
        out.extend_from_slice(&self.op.to_be_bytes());
        out.extend_from_slice(&self.sender_mac.0);
        out.extend_from_slice(&self.sender_ip.octets());
        out.extend_from_slice(&self.target_mac.0);
        out.extend_from_slice(&self.target_ip.octets());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_swaps_sender_and_target() {
        let request = ArpPacket::parse(
            &ArpPacketBuilder {
                op: ARP_OP_REQUEST,
                sender_mac: MacAddr([2, 0, 0, 0, 0, 1]),
                sender_ip: Ipv4Addr::new(192, 168, 0, 1),
                target_mac: MacAddr([0; 6]),
                target_ip: Ipv4Addr::new(192, 168, 0, 17),
            }
            .to_vec(),
        )
        .unwrap();

        let ours = MacAddr([0xba, 0xdb, 0xad, 0xc0, 0xff, 0xee]);
        let reply_bytes = ArpPacketBuilder::reply_to(&request, ours, request.target_ip).to_vec();
        let reply = ArpPacket::parse(&reply_bytes).unwrap();
        assert_eq!(reply.op, ARP_OP_REPLY);
        assert_eq!(reply.sender_mac, ours);
        assert_eq!(reply.sender_ip, Ipv4Addr::new(192, 168, 0, 17));
        assert_eq!(reply.target_mac, request.sender_mac);
        assert_eq!(reply.target_ip, request.sender_ip);
    }

    #[test]
    fn rejects_non_ipv4_protocol() {
        let mut bytes = ArpPacketBuilder {
            op: ARP_OP_REQUEST,
            sender_mac: MacAddr([0; 6]),
            sender_ip: Ipv4Addr::UNSPECIFIED,
            target_mac: MacAddr([0; 6]),
            target_ip: Ipv4Addr::UNSPECIFIED,
        }
        .to_vec();
        bytes[2] = 0x86;
        bytes[3] = 0xdd;
        assert!(ArpPacket::parse(&bytes).is_err());
    }
}
