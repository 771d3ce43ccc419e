//! In-process BOOTP/TFTP server and a loopback link for exercising the client end to end.

use core::net::Ipv4Addr;
use std::collections::HashMap;

use tracing::trace;
use zxboot_packet::bootp::{BOOTP_CLIENT_PORT, BOOTP_OP_REQUEST, BOOTP_SERVER_PORT};
use zxboot_packet::ipv4::DEFAULT_TTL;
use zxboot_packet::tftp::{self, MAX_DATA_LEN, MODE_OCTET, TFTP_SERVER_PORT};
use zxboot_packet::{
    BootpMessage, BootpReplyBuilder, Checksum, EthernetFrame, Ipv4Packet, MacAddr, TftpErrorCode,
    TftpPacket, UdpSegment, ETHERTYPE_IPV4, IPPROTO_UDP,
};

use crate::config::NetConfig;
use crate::frame_io::{FrameClass, FrameIo, SramFrameIo};

/// Build a complete Ethernet/IPv4/UDP frame with a computed UDP checksum.
pub fn udp_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let segment = UdpSegment::serialize(src_port, dst_port, payload)
        .and_then(|mut segment| {
            UdpSegment::seal(src_ip, dst_ip, &mut segment)?;
            Ok(segment)
        })
        .unwrap_or_default();
    let ip = Ipv4Packet::serialize(src_ip, dst_ip, IPPROTO_UDP, DEFAULT_TTL, &segment);
    EthernetFrame::serialize(dst_mac, src_mac, ETHERTYPE_IPV4, &ip)
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub offered_ip: Ipv4Addr,
    /// Sent in the `sname` field; empty to leave it blank.
    pub sname: String,
    /// Sent in the `file` field; empty to leave it blank.
    pub boot_file: String,
    /// Directory the files are served from; requests outside it are not found.
    pub root: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mac: MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            ip: Ipv4Addr::new(192, 168, 0, 1),
            offered_ip: Ipv4Addr::new(192, 168, 0, 17),
            sname: String::new(),
            boot_file: String::new(),
            root: NetConfig::DEFAULT_TFTP_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub bootp_requests: u64,
    pub read_requests: u64,
    pub data_sent: u64,
    pub acks_received: u64,
    pub errors_received: u64,
}

struct ServerTransfer {
    client_mac: MacAddr,
    client_ip: Ipv4Addr,
    client_port: u16,
    tid: u16,
    data: Vec<u8>,
    /// 1-based index of the last block sent.
    sent: usize,
    finished: bool,
}

impl ServerTransfer {
    fn block_count(&self) -> usize {
        self.data.len() / MAX_DATA_LEN + 1
    }

    fn block(&self, index: usize) -> &[u8] {
        let start = ((index - 1) * MAX_DATA_LEN).min(self.data.len());
        let end = (start + MAX_DATA_LEN).min(self.data.len());
        &self.data[start..end]
    }
}

/// Minimal boot server: answers every BOOTP request and serves files by exact name under
/// its root directory.
///
/// It has no timers. Lost DATA is recovered when the client retransmits the previous ACK.
pub struct BootServer {
    cfg: ServerConfig,
    files: HashMap<String, Vec<u8>>,
    transfers: HashMap<u16, ServerTransfer>,
    next_tid: u16,
    stats: ServerStats,
    requested: Vec<String>,
}

impl BootServer {
    pub fn new(cfg: ServerConfig) -> Self {
        Self {
            cfg,
            files: HashMap::new(),
            transfers: HashMap::new(),
            next_tid: 0x8000,
            stats: ServerStats::default(),
            requested: Vec::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.cfg
    }

    pub fn add_file(&mut self, name: impl Into<String>, contents: Vec<u8>) {
        self.files.insert(name.into(), contents);
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Paths named in read requests, in arrival order.
    pub fn requested(&self) -> &[String] {
        &self.requested
    }

    /// Process one frame sent by a client and return the frames sent in response.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Vec<Vec<u8>> {
        let Ok(eth) = EthernetFrame::parse(frame) else {
            return Vec::new();
        };
        if eth.ethertype != ETHERTYPE_IPV4 {
            return Vec::new();
        }
        let Ok(ip) = Ipv4Packet::parse(eth.payload) else {
            return Vec::new();
        };
        if !ip.header_checksum_valid() || ip.protocol != IPPROTO_UDP {
            return Vec::new();
        }
        let Ok(udp) = UdpSegment::parse(ip.payload) else {
            return Vec::new();
        };
        if !udp.checksum_valid(ip.src, ip.dst) {
            return Vec::new();
        }

        match udp.dst_port {
            BOOTP_SERVER_PORT => self.handle_bootp(udp.payload),
            TFTP_SERVER_PORT => {
                self.handle_read_request(eth.src, ip.src, udp.src_port, udp.payload)
            }
            port => self.handle_transfer(port, udp.src_port, udp.payload),
        }
    }

    fn handle_bootp(&mut self, payload: &[u8]) -> Vec<Vec<u8>> {
        let Ok(request) = BootpMessage::parse(payload) else {
            return Vec::new();
        };
        if request.op() != BOOTP_OP_REQUEST {
            return Vec::new();
        }
        self.stats.bootp_requests += 1;
        let reply = BootpReplyBuilder {
            xid: request.xid(),
            chaddr: request.chaddr(),
            yiaddr: self.cfg.offered_ip,
            siaddr: self.cfg.ip,
            sname: &self.cfg.sname,
            file: &self.cfg.boot_file,
        }
        .to_vec();
        let Ok(reply) = reply else {
            return Vec::new();
        };
        vec![udp_frame(
            self.cfg.mac,
            request.chaddr(),
            self.cfg.ip,
            Ipv4Addr::BROADCAST,
            BOOTP_SERVER_PORT,
            BOOTP_CLIENT_PORT,
            &reply,
        )]
    }

    fn handle_read_request(
        &mut self,
        client_mac: MacAddr,
        client_ip: Ipv4Addr,
        client_port: u16,
        payload: &[u8],
    ) -> Vec<Vec<u8>> {
        let Ok(TftpPacket::ReadRequest { filename, mode }) = TftpPacket::parse(payload) else {
            return Vec::new();
        };
        self.stats.read_requests += 1;
        let name = String::from_utf8_lossy(filename).into_owned();
        trace!(file = %name, client_port, "server: read request");
        self.requested.push(name.clone());

        if !mode.eq_ignore_ascii_case(MODE_OCTET.as_bytes()) {
            let tid = self.allocate_tid();
            let err = tftp::error(TftpErrorCode::ILLEGAL_OPERATION, "octet mode only");
            return vec![self.frame_to(client_mac, client_ip, tid, client_port, &err)];
        }
        let served = name
            .strip_prefix(self.cfg.root.as_str())
            .and_then(|file| self.files.get(file))
            .cloned();
        let Some(data) = served else {
            let tid = self.allocate_tid();
            let err = tftp::error(TftpErrorCode::FILE_NOT_FOUND, "file not found");
            return vec![self.frame_to(client_mac, client_ip, tid, client_port, &err)];
        };

        // A repeated request restarts the transfer on the same TID.
        let tid = match self.transfers.get(&client_port) {
            Some(existing) => existing.tid,
            None => self.allocate_tid(),
        };
        self.transfers.insert(
            client_port,
            ServerTransfer {
                client_mac,
                client_ip,
                client_port,
                tid,
                data,
                sent: 0,
                finished: false,
            },
        );
        self.send_block(client_port, 1)
    }

    fn handle_transfer(&mut self, tid: u16, client_port: u16, payload: &[u8]) -> Vec<Vec<u8>> {
        let Some(transfer) = self.transfers.get(&client_port) else {
            return Vec::new();
        };
        if transfer.tid != tid || transfer.finished {
            return Vec::new();
        }
        let sent = transfer.sent;
        let count = transfer.block_count();

        match TftpPacket::parse(payload) {
            Ok(TftpPacket::Ack { block }) => {
                self.stats.acks_received += 1;
                if block == sent as u16 {
                    if sent == count {
                        if let Some(t) = self.transfers.get_mut(&client_port) {
                            t.finished = true;
                        }
                        Vec::new()
                    } else {
                        self.send_block(client_port, sent + 1)
                    }
                } else if sent > 1 && block == (sent - 1) as u16 {
                    // The client timed out waiting for the current block.
                    self.send_block(client_port, sent)
                } else {
                    Vec::new()
                }
            }
            Ok(TftpPacket::Error { .. }) => {
                self.stats.errors_received += 1;
                self.transfers.remove(&client_port);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn send_block(&mut self, client_port: u16, index: usize) -> Vec<Vec<u8>> {
        let Some(transfer) = self.transfers.get_mut(&client_port) else {
            return Vec::new();
        };
        transfer.sent = index;
        let Ok(packet) = tftp::data(index as u16, transfer.block(index)) else {
            return Vec::new();
        };
        let (mac, ip, tid, port) = (
            transfer.client_mac,
            transfer.client_ip,
            transfer.tid,
            transfer.client_port,
        );
        self.stats.data_sent += 1;
        vec![self.frame_to(mac, ip, tid, port, &packet)]
    }

    fn frame_to(
        &self,
        mac: MacAddr,
        ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        udp_frame(self.cfg.mac, mac, self.cfg.ip, ip, src_port, dst_port, payload)
    }

    fn allocate_tid(&mut self) -> u16 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1).max(0x8000);
        tid
    }
}

/// Frames to drop on the loopback link, counted separately per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Drop every n-th frame sent by the server.
    pub drop_every_nth_reply: Option<u32>,
    /// Drop every n-th frame sent by the client.
    pub drop_every_nth_request: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub client_frames: u64,
    pub server_frames: u64,
    pub dropped: u64,
}

/// [`FrameIo`] whose wire leads straight into a [`BootServer`].
pub struct LoopbackNetwork {
    io: SramFrameIo,
    server: BootServer,
    faults: FaultPlan,
    stats: LinkStats,
}

impl LoopbackNetwork {
    pub fn new(client_mac: MacAddr, server: BootServer, faults: FaultPlan) -> Self {
        Self {
            io: SramFrameIo::new(client_mac),
            server,
            faults,
            stats: LinkStats::default(),
        }
    }

    pub fn server(&self) -> &BootServer {
        &self.server
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Inject a frame as if it arrived from the wire.
    pub fn inject(&mut self, frame: Vec<u8>) {
        self.io.push_received(frame);
    }

    fn hits(every: Option<u32>, count: u64) -> bool {
        every.is_some_and(|n| n > 0 && count % u64::from(n) == 0)
    }
}

impl FrameIo for LoopbackNetwork {
    fn send_frame(&mut self, dst: MacAddr, ethertype: u16, class: FrameClass, payload: &[u8]) {
        self.io.send_frame(dst, ethertype, class, payload);
        for tx in self.io.drain_transmitted() {
            self.stats.client_frames += 1;
            if Self::hits(self.faults.drop_every_nth_request, self.stats.client_frames) {
                self.stats.dropped += 1;
                continue;
            }
            for reply in self.server.handle_frame(&tx.frame) {
                self.stats.server_frames += 1;
                if Self::hits(self.faults.drop_every_nth_reply, self.stats.server_frames) {
                    self.stats.dropped += 1;
                    continue;
                }
                self.io.push_received(reply);
            }
        }
    }

    fn poll_received_frame(&mut self) -> Option<Vec<u8>> {
        self.io.poll_received_frame()
    }

    fn read_bytes(&mut self, src: u16, buf: &mut [u8]) -> Checksum {
        self.io.read_bytes(src, buf)
    }

    fn write_bytes(&mut self, dst: u16, bytes: &[u8]) {
        self.io.write_bytes(dst, bytes);
    }
}
