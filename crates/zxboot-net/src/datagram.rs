//! Ethernet/IPv4/UDP framing, receive validation, and priority-frame retransmission.

use core::net::Ipv4Addr;

use tracing::{debug, trace, warn};
use zxboot_packet::bootp::BOOTP_CLIENT_PORT;
use zxboot_packet::ipv4::DEFAULT_TTL;
use zxboot_packet::{
    ArpPacket, ArpPacketBuilder, EthernetFrame, Ipv4Packet, MacAddr, UdpSegment,
    ARP_OP_REQUEST, ETHERTYPE_ARP, ETHERTYPE_IPV4, IPPROTO_UDP,
};

use crate::address::AddressConfig;
use crate::config::NetConfig;
use crate::error::{FatalError, Result};
use crate::frame_io::{FrameClass, FrameIo};
use crate::Millis;

/// Sender of a received segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// A validated UDP payload, routed by destination port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Bootp { payload: &'a [u8] },
    Tftp { from: Peer, payload: &'a [u8] },
}

#[derive(Debug, Clone)]
struct PendingFrame {
    dst: MacAddr,
    datagram: Vec<u8>,
    due_at: Millis,
    timeout: Millis,
    resends: u32,
}

pub struct DatagramEngine {
    mac: MacAddr,
    address: AddressConfig,
    pending: Option<PendingFrame>,
    initial_timeout: Millis,
    max_timeout: Millis,
    max_retransmissions: Option<u32>,
}

impl DatagramEngine {
    pub fn new(config: &NetConfig) -> Self {
        Self {
            mac: config.mac,
            address: AddressConfig::default(),
            pending: None,
            initial_timeout: config.initial_retransmit_timeout_ms.max(1),
            max_timeout: config
                .max_retransmit_timeout_ms
                .max(config.initial_retransmit_timeout_ms),
            max_retransmissions: config.max_retransmissions,
        }
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn address(&self) -> &AddressConfig {
        &self.address
    }

    pub fn bind(&mut self, host: Ipv4Addr, boot_server: Ipv4Addr) -> Result<()> {
        self.address.set(host, boot_server)?;
        debug!(%host, %boot_server, "address configuration bound");
        Ok(())
    }

    /// Broadcast until configured, then the boot server.
    pub fn destination_ip(&self) -> Ipv4Addr {
        self.address.boot_server().unwrap_or(Ipv4Addr::BROADCAST)
    }

    pub fn source_ip(&self) -> Ipv4Addr {
        self.address.host().unwrap_or(Ipv4Addr::UNSPECIFIED)
    }

    /// Send a UDP datagram. A priority datagram replaces any earlier one as the frame to
    /// retransmit, with the timeout reset to its initial value.
    #[allow(clippy::too_many_arguments)]
    pub fn send_udp<F: FrameIo + ?Sized>(
        &mut self,
        io: &mut F,
        dst_mac: MacAddr,
        src_port: u16,
        dst_port: u16,
        payload: &[u8],
        class: FrameClass,
        now_ms: Millis,
    ) -> Result<()> {
        let segment = UdpSegment::serialize(src_port, dst_port, payload)
            .map_err(|_| FatalError::Internal("oversized datagram"))?;
        let datagram = Ipv4Packet::serialize(
            self.source_ip(),
            self.destination_ip(),
            IPPROTO_UDP,
            DEFAULT_TTL,
            &segment,
        );

        io.send_frame(dst_mac, ETHERTYPE_IPV4, class, &datagram);
        if class == FrameClass::Priority {
            self.pending = Some(PendingFrame {
                dst: dst_mac,
                datagram,
                due_at: now_ms.saturating_add(self.initial_timeout),
                timeout: self.initial_timeout,
                resends: 0,
            });
        }
        Ok(())
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// When the pending priority frame is next due for retransmission.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.pending.as_ref().map(|p| p.due_at)
    }

    pub fn cancel_retransmission(&mut self) {
        self.pending = None;
    }

    /// Timer callback: resend the pending priority frame if its timeout has expired.
    pub fn poll_timeout<F: FrameIo + ?Sized>(&mut self, io: &mut F, now_ms: Millis) -> Result<()> {
        let Some(pending) = self.pending.as_mut() else {
            return Ok(());
        };
        if now_ms < pending.due_at {
            return Ok(());
        }
        if self
            .max_retransmissions
            .is_some_and(|max| pending.resends >= max)
        {
            warn!(resends = pending.resends, "no reply to priority frame, giving up");
            self.pending = None;
            return Err(FatalError::NoResponse);
        }

        pending.resends += 1;
        pending.timeout = pending.timeout.saturating_mul(2).min(self.max_timeout);
        pending.due_at = now_ms.saturating_add(pending.timeout);
        debug!(
            resends = pending.resends,
            next_timeout_ms = pending.timeout,
            "retransmitting priority frame"
        );
        io.send_frame(pending.dst, ETHERTYPE_IPV4, FrameClass::Priority, &pending.datagram);
        Ok(())
    }

    /// Validate a received frame and return the UDP payload if it is addressed to one of our
    /// clients. ARP requests for our address are answered here. Everything else is dropped.
    pub fn receive<'a, F: FrameIo + ?Sized>(
        &mut self,
        io: &mut F,
        frame: &'a [u8],
        tftp_port: Option<u16>,
    ) -> Option<Segment<'a>> {
        let eth = match EthernetFrame::parse(frame) {
            Ok(eth) => eth,
            Err(err) => {
                trace!(%err, "dropping malformed frame");
                return None;
            }
        };
        if eth.src == self.mac {
            trace!("dropping frame sent by us");
            return None;
        }
        if eth.dst != self.mac && !eth.dst.is_broadcast() {
            trace!(dst = %eth.dst, "dropping frame for another station");
            return None;
        }

        match eth.ethertype {
            ETHERTYPE_ARP => {
                self.answer_arp(io, eth.payload);
                None
            }
            ETHERTYPE_IPV4 => self.receive_ipv4(&eth, tftp_port),
            other => {
                trace!(ethertype = other, "dropping frame with unhandled ethertype");
                None
            }
        }
    }

    fn receive_ipv4<'a>(
        &self,
        eth: &EthernetFrame<'a>,
        tftp_port: Option<u16>,
    ) -> Option<Segment<'a>> {
        let ip = match Ipv4Packet::parse(eth.payload) {
            Ok(ip) => ip,
            Err(err) => {
                trace!(%err, "dropping malformed IPv4 datagram");
                return None;
            }
        };
        if !ip.header_checksum_valid() {
            debug!(src = %ip.src, "bad checksum");
            return None;
        }
        if ip.protocol != IPPROTO_UDP || ip.is_fragment() {
            trace!(protocol = ip.protocol, "dropping non-UDP or fragmented datagram");
            return None;
        }
        if let Some(host) = self.address.host() {
            if ip.dst != host {
                trace!(dst = %ip.dst, "dropping datagram for another host");
                return None;
            }
        }

        let udp = match UdpSegment::parse(ip.payload) {
            Ok(udp) => udp,
            Err(err) => {
                trace!(%err, "dropping malformed UDP segment");
                return None;
            }
        };
        if !udp.checksum_valid(ip.src, ip.dst) {
            debug!(src = %ip.src, "bad checksum");
            return None;
        }

        let dst_port = udp.dst_port;
        if self.address.is_set() && tftp_port == Some(dst_port) {
            Some(Segment::Tftp {
                from: Peer {
                    mac: eth.src,
                    ip: ip.src,
                    port: udp.src_port,
                },
                payload: udp.payload,
            })
        } else if dst_port == BOOTP_CLIENT_PORT {
            Some(Segment::Bootp {
                payload: udp.payload,
            })
        } else {
            trace!(dst_port, "dropping segment for unknown port");
            None
        }
    }

    fn answer_arp<F: FrameIo + ?Sized>(&self, io: &mut F, payload: &[u8]) {
        let Some(host) = self.address.host() else {
            return;
        };
        let Ok(request) = ArpPacket::parse(payload) else {
            trace!("dropping malformed ARP packet");
            return;
        };
        if request.op != ARP_OP_REQUEST || request.target_ip != host {
            return;
        }
        trace!(from = %request.sender_ip, "answering ARP request");
        let reply = ArpPacketBuilder::reply_to(&request, self.mac, host).to_vec();
        io.send_frame(request.sender_mac, ETHERTYPE_ARP, FrameClass::Optional, &reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_io::SramFrameIo;
    use crate::sim::udp_frame;
    use zxboot_packet::ARP_OP_REPLY;

    const SERVER_MAC: MacAddr = MacAddr([2, 0, 0, 0, 0, 1]);
    const HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 17);
    const SERVER: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);

    fn engine() -> (DatagramEngine, SramFrameIo) {
        let cfg = NetConfig::default();
        (DatagramEngine::new(&cfg), SramFrameIo::new(cfg.mac))
    }

    fn sent_ip(io: &mut SramFrameIo) -> (Ipv4Addr, Ipv4Addr) {
        let tx = io.drain_transmitted();
        assert_eq!(tx.len(), 1);
        let eth = EthernetFrame::parse(&tx[0].frame).unwrap();
        let ip = Ipv4Packet::parse(eth.payload).unwrap();
        assert!(ip.header_checksum_valid());
        assert_eq!(ip.ttl, 64);
        (ip.src, ip.dst)
    }

    #[test]
    fn broadcasts_until_bound_then_unicasts() {
        let (mut eng, mut io) = engine();
        eng.send_udp(&mut io, MacAddr::BROADCAST, 68, 67, b"x", FrameClass::Optional, 0)
            .unwrap();
        assert_eq!(sent_ip(&mut io), (Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST));

        eng.bind(HOST, SERVER).unwrap();
        eng.send_udp(&mut io, SERVER_MAC, 0xc000, 69, b"x", FrameClass::Optional, 0)
            .unwrap();
        assert_eq!(sent_ip(&mut io), (HOST, SERVER));
        assert!(!eng.has_pending());
    }

    #[test]
    fn priority_frame_backoff_doubles_and_caps() {
        let (mut eng, mut io) = engine();
        eng.send_udp(&mut io, MacAddr::BROADCAST, 68, 67, b"req", FrameClass::Priority, 0)
            .unwrap();
        io.drain_transmitted();

        let mut resend_times = Vec::new();
        for now in (0..100_000).step_by(10) {
            eng.poll_timeout(&mut io, now).unwrap();
            if !io.drain_transmitted().is_empty() {
                resend_times.push(now);
            }
        }
        assert_eq!(&resend_times[..5], &[2_560, 7_680, 17_920, 38_400, 58_880]);
    }

    #[test]
    fn outgoing_segments_leave_the_checksum_unset() {
        let (mut eng, mut io) = engine();
        eng.bind(HOST, SERVER).unwrap();
        eng.send_udp(&mut io, SERVER_MAC, 0xc000, 69, b"ack", FrameClass::Optional, 0)
            .unwrap();
        let tx = io.drain_transmitted();
        let eth = EthernetFrame::parse(&tx[0].frame).unwrap();
        let ip = Ipv4Packet::parse(eth.payload).unwrap();
        let udp = UdpSegment::parse(ip.payload).unwrap();
        assert_eq!((udp.src_port, udp.dst_port, udp.checksum), (0xc000, 69, 0));
        assert_eq!(udp.payload, b"ack");
    }

    #[test]
    fn retransmission_budget_raises_no_response() {
        let cfg = NetConfig {
            max_retransmissions: Some(2),
            ..NetConfig::default()
        };
        let mut eng = DatagramEngine::new(&cfg);
        let mut io = SramFrameIo::new(cfg.mac);
        eng.send_udp(&mut io, MacAddr::BROADCAST, 68, 67, b"req", FrameClass::Priority, 0)
            .unwrap();
        eng.poll_timeout(&mut io, 2_560).unwrap();
        eng.poll_timeout(&mut io, 7_680).unwrap();
        assert_eq!(eng.poll_timeout(&mut io, 17_920), Err(FatalError::NoResponse));
        assert!(!eng.has_pending());
        assert_eq!(io.drain_transmitted().len(), 3);
    }

    #[test]
    fn new_priority_frame_supersedes_old_one() {
        let (mut eng, mut io) = engine();
        eng.send_udp(&mut io, MacAddr::BROADCAST, 68, 67, b"one", FrameClass::Priority, 0)
            .unwrap();
        eng.poll_timeout(&mut io, 2_560).unwrap();
        eng.send_udp(&mut io, MacAddr::BROADCAST, 68, 67, b"two", FrameClass::Priority, 3_000)
            .unwrap();
        assert_eq!(eng.next_deadline(), Some(5_560));
        io.drain_transmitted();

        eng.poll_timeout(&mut io, 5_560).unwrap();
        let tx = io.drain_transmitted();
        let eth = EthernetFrame::parse(&tx[0].frame).unwrap();
        let ip = Ipv4Packet::parse(eth.payload).unwrap();
        assert_eq!(UdpSegment::parse(ip.payload).unwrap().payload, b"two");

        eng.cancel_retransmission();
        eng.poll_timeout(&mut io, 1_000_000).unwrap();
        assert!(io.drain_transmitted().is_empty());
    }

    #[test]
    fn dispatches_by_port() {
        let (mut eng, mut io) = engine();
        let ours = eng.mac();
        let bootp = udp_frame(SERVER_MAC, ours, SERVER, Ipv4Addr::BROADCAST, 67, 68, b"reply");
        assert_eq!(
            eng.receive(&mut io, &bootp, Some(0xc000)),
            Some(Segment::Bootp { payload: b"reply" })
        );

        // TFTP traffic is only routed once an address is bound.
        let tftp = udp_frame(SERVER_MAC, ours, SERVER, HOST, 0x8000, 0xc000, b"data");
        assert_eq!(eng.receive(&mut io, &tftp, Some(0xc000)), None);
        eng.bind(HOST, SERVER).unwrap();
        assert_eq!(
            eng.receive(&mut io, &tftp, Some(0xc000)),
            Some(Segment::Tftp {
                from: Peer {
                    mac: SERVER_MAC,
                    ip: SERVER,
                    port: 0x8000
                },
                payload: b"data"
            })
        );

        let other = udp_frame(SERVER_MAC, ours, SERVER, HOST, 0x8000, 1234, b"data");
        assert_eq!(eng.receive(&mut io, &other, Some(0xc000)), None);
    }

    #[test]
    fn fails_closed_on_bad_frames() {
        let (mut eng, mut io) = engine();
        let ours = eng.mac();
        eng.bind(HOST, SERVER).unwrap();

        let good = udp_frame(SERVER_MAC, ours, SERVER, HOST, 67, 68, b"reply");
        assert!(eng.receive(&mut io, &good, None).is_some());

        let mut bad_ip = good.clone();
        bad_ip[14 + 8] ^= 0xff; // TTL
        assert_eq!(eng.receive(&mut io, &bad_ip, None), None);

        let mut bad_udp = good.clone();
        let last = bad_udp.len() - 1;
        bad_udp[last] ^= 0xff;
        assert_eq!(eng.receive(&mut io, &bad_udp, None), None);

        let elsewhere = Ipv4Addr::new(192, 168, 0, 99);
        let foreign = udp_frame(SERVER_MAC, ours, SERVER, elsewhere, 67, 68, b"r");
        assert_eq!(eng.receive(&mut io, &foreign, None), None);

        let looped = udp_frame(ours, ours, SERVER, HOST, 67, 68, b"r");
        assert_eq!(eng.receive(&mut io, &looped, None), None);

        let stranger = MacAddr([2, 0, 0, 0, 0, 9]);
        let other_station = udp_frame(SERVER_MAC, stranger, SERVER, HOST, 67, 68, b"r");
        assert_eq!(eng.receive(&mut io, &other_station, None), None);

        assert_eq!(eng.receive(&mut io, &good[..20], None), None);
        assert!(io.drain_transmitted().is_empty());
    }

    #[test]
    fn answers_arp_only_for_bound_host() {
        let (mut eng, mut io) = engine();
        let request = ArpPacketBuilder {
            op: ARP_OP_REQUEST,
            sender_mac: SERVER_MAC,
            sender_ip: SERVER,
            target_mac: MacAddr([0; 6]),
            target_ip: HOST,
        }
        .to_vec();
        let frame =
            EthernetFrame::serialize(MacAddr::BROADCAST, SERVER_MAC, ETHERTYPE_ARP, &request);

        assert_eq!(eng.receive(&mut io, &frame, None), None);
        assert!(io.drain_transmitted().is_empty());

        eng.bind(HOST, SERVER).unwrap();
        assert_eq!(eng.receive(&mut io, &frame, None), None);
        let tx = io.drain_transmitted();
        assert_eq!(tx.len(), 1);
        assert_eq!(tx[0].class, FrameClass::Optional);
        let eth = EthernetFrame::parse(&tx[0].frame).unwrap();
        assert_eq!(eth.dst, SERVER_MAC);
        let reply = ArpPacket::parse(eth.payload).unwrap();
        assert_eq!(reply.op, ARP_OP_REPLY);
        assert_eq!(reply.sender_ip, HOST);
        assert_eq!(reply.sender_mac, eng.mac());
    }
}
