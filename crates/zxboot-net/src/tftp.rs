//! TFTP read client.
//!
//! Block numbers are compared on their low byte only, so a gap of exactly 256 blocks is
//! indistinguishable from an in-order segment.

use core::net::Ipv4Addr;

use tracing::{debug, trace, warn};
use zxboot_packet::tftp::{self, MAX_DATA_LEN, MODE_OCTET, TFTP_SERVER_PORT};
use zxboot_packet::{MacAddr, TftpErrorCode, TftpPacket};

use crate::datagram::{DatagramEngine, Peer};
use crate::error::{FatalError, Result};
use crate::frame_io::{FrameClass, FrameIo};
use crate::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    RequestSent,
    Transferring,
    Complete,
    Failed,
}

/// What a received segment amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent<'a> {
    /// In-order data, acknowledged. `last` is set on the short segment that ends the file.
    Data { payload: &'a [u8], last: bool },
    /// Repeat of the previous block; acknowledged again, payload not forwarded.
    Duplicate,
    /// Not part of this transfer.
    Ignored,
}

const EPHEMERAL_PORT_BASE: u16 = 0xc000;
const EPHEMERAL_PORT_SPAN: Millis = 0x3f00;

/// Source port for a new session, derived from the clock so consecutive sessions differ.
pub fn ephemeral_port(now_ms: Millis) -> u16 {
    EPHEMERAL_PORT_BASE + (now_ms % EPHEMERAL_PORT_SPAN) as u16
}

pub struct TransferClient {
    state: TransferState,
    file_name: String,
    local_port: u16,
    server_ip: Ipv4Addr,
    server_port: Option<u16>,
    expected_block: u16,
}

impl TransferClient {
    pub fn new(file_name: impl Into<String>, server_ip: Ipv4Addr, now_ms: Millis) -> Self {
        Self {
            state: TransferState::RequestSent,
            file_name: file_name.into(),
            local_port: ephemeral_port(now_ms),
            server_ip,
            server_port: None,
            expected_block: 1,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn expected_block(&self) -> u16 {
        self.expected_block
    }

    /// Send the read request.
    pub fn start<F: FrameIo + ?Sized>(
        &mut self,
        engine: &mut DatagramEngine,
        io: &mut F,
        now_ms: Millis,
    ) -> Result<()> {
        debug!(file = %self.file_name, port = self.local_port, "sending TFTP read request");
        let request = tftp::read_request(&self.file_name, MODE_OCTET);
        engine.send_udp(
            io,
            MacAddr::BROADCAST,
            self.local_port,
            TFTP_SERVER_PORT,
            &request,
            FrameClass::Priority,
            now_ms,
        )
    }

    /// Handle a segment received on our session port.
    pub fn handle_segment<'a, F: FrameIo + ?Sized>(
        &mut self,
        engine: &mut DatagramEngine,
        io: &mut F,
        from: Peer,
        payload: &'a [u8],
        now_ms: Millis,
    ) -> Result<TransferEvent<'a>> {
        if self.state == TransferState::Failed {
            return Ok(TransferEvent::Ignored);
        }
        if from.ip != self.server_ip {
            trace!(src = %from.ip, "ignoring TFTP segment from another host");
            return Ok(TransferEvent::Ignored);
        }
        if let Some(port) = self.server_port {
            if from.port != port {
                debug!(port = from.port, "TFTP segment from unknown transfer ID");
                let err = tftp::error(TftpErrorCode::UNKNOWN_TRANSFER_ID, "");
                engine.send_udp(
                    io,
                    from.mac,
                    self.local_port,
                    from.port,
                    &err,
                    FrameClass::Optional,
                    now_ms,
                )?;
                return Ok(TransferEvent::Ignored);
            }
        }

        let packet = match TftpPacket::parse(payload) {
            Ok(packet) => packet,
            Err(err) => {
                trace!(%err, "dropping malformed TFTP segment");
                return Ok(TransferEvent::Ignored);
            }
        };
        let (block, data) = match packet {
            TftpPacket::Data { block, payload } if payload.len() <= MAX_DATA_LEN => {
                (block, payload)
            }
            TftpPacket::Data { .. } => {
                trace!("dropping oversized TFTP data segment");
                return Ok(TransferEvent::Ignored);
            }
            TftpPacket::Error { code, message } => {
                let message = String::from_utf8_lossy(message).into_owned();
                warn!(code = code.0, kind = code.name(), %message, "TFTP server reported an error");
                let err = FatalError::FileNotFound(format!("{}: {message}", self.file_name));
                return Err(self.fail(engine, err));
            }
            other => {
                warn!(?other, "unexpected TFTP opcode");
                return Err(self.fail(engine, FatalError::FileNotFound(self.file_name.clone())));
            }
        };

        self.server_port.get_or_insert(from.port);
        let received = block as u8;
        let expected = self.expected_block as u8;

        if received == expected && self.state != TransferState::Complete {
            let last = data.len() < MAX_DATA_LEN;
            self.expected_block = self.expected_block.wrapping_add(1);
            if last {
                self.state = TransferState::Complete;
                engine.cancel_retransmission();
                debug!(block, "final TFTP block received");
            } else {
                self.state = TransferState::Transferring;
                trace!(block, len = data.len(), "TFTP block received");
            }
            self.send_ack(engine, io, from, block, now_ms)?;
            Ok(TransferEvent::Data { payload: data, last })
        } else if received == expected.wrapping_sub(1) {
            trace!(block, "duplicate TFTP block, re-acknowledging");
            self.send_ack(engine, io, from, block, now_ms)?;
            Ok(TransferEvent::Duplicate)
        } else if self.state == TransferState::Complete {
            trace!(block, "ignoring TFTP data after end of transfer");
            Ok(TransferEvent::Ignored)
        } else {
            warn!(block, expected = self.expected_block, "TFTP block out of sequence");
            let err = tftp::error(TftpErrorCode::ILLEGAL_OPERATION, "");
            engine.send_udp(
                io,
                from.mac,
                self.local_port,
                from.port,
                &err,
                FrameClass::Optional,
                now_ms,
            )?;
            Err(self.fail(engine, FatalError::Protocol("TFTP block out of sequence")))
        }
    }

    fn send_ack<F: FrameIo + ?Sized>(
        &self,
        engine: &mut DatagramEngine,
        io: &mut F,
        to: Peer,
        block: u16,
        now_ms: Millis,
    ) -> Result<()> {
        // Nothing follows the final ACK, so there is no reply to wait for.
        let class = if self.state == TransferState::Complete {
            FrameClass::Optional
        } else {
            FrameClass::Priority
        };
        engine.send_udp(io, to.mac, self.local_port, to.port, &tftp::ack(block), class, now_ms)
    }

    fn fail(&mut self, engine: &mut DatagramEngine, err: FatalError) -> FatalError {
        self.state = TransferState::Failed;
        engine.cancel_retransmission();
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetConfig;
    use crate::frame_io::SramFrameIo;
    use crate::frame_io::TxFrame;
    use proptest::prelude::*;
    use zxboot_packet::{EthernetFrame, Ipv4Packet, UdpSegment};

    const SERVER: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);
    const HOST: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 17);
    const FROM: Peer = Peer {
        mac: MacAddr([2, 0, 0, 0, 0, 1]),
        ip: SERVER,
        port: 0x8001,
    };

    fn setup() -> (TransferClient, DatagramEngine, SramFrameIo) {
        let cfg = NetConfig::default();
        let mut engine = DatagramEngine::new(&cfg);
        engine.bind(HOST, SERVER).unwrap();
        let io = SramFrameIo::new(cfg.mac);
        (TransferClient::new("game.z80", SERVER, 0), engine, io)
    }

    fn data(block: u16, len: usize) -> Vec<u8> {
        tftp::data(block, &vec![block as u8; len]).unwrap()
    }

    fn sent_tftp(tx: &[TxFrame]) -> Vec<(FrameClass, u16, Vec<u8>)> {
        tx.iter()
            .map(|f| {
                let eth = EthernetFrame::parse(&f.frame).unwrap();
                let ip = Ipv4Packet::parse(eth.payload).unwrap();
                let udp = UdpSegment::parse(ip.payload).unwrap();
                (f.class, udp.dst_port, udp.payload.to_vec())
            })
            .collect()
    }

    #[test]
    fn read_request_layout() {
        let (mut client, mut engine, mut io) = setup();
        client.start(&mut engine, &mut io, 0).unwrap();
        let sent = sent_tftp(&io.drain_transmitted());
        assert_eq!(
            sent,
            vec![(FrameClass::Priority, 69, b"\x00\x01game.z80\x00octet\x00".to_vec())]
        );
        assert_eq!(client.local_port(), 0xc000);
        assert_eq!(client.state(), TransferState::RequestSent);
    }

    #[test]
    fn ephemeral_port_follows_clock() {
        assert_eq!(ephemeral_port(0), 0xc000);
        assert_eq!(ephemeral_port(0x100), 0xc100);
        assert_eq!(ephemeral_port(0x3f00), 0xc000);
        assert!(ephemeral_port(u64::MAX) >= 0xc000);
    }

    #[test]
    fn in_order_blocks_are_acked_and_forwarded() {
        let (mut client, mut engine, mut io) = setup();
        let seg = data(1, 512);
        match client.handle_segment(&mut engine, &mut io, FROM, &seg, 0).unwrap() {
            TransferEvent::Data { payload, last } => {
                assert_eq!(payload.len(), 512);
                assert!(!last);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(client.state(), TransferState::Transferring);
        assert_eq!(
            sent_tftp(&io.drain_transmitted()),
            vec![(FrameClass::Priority, 0x8001, vec![0, 4, 0, 1])]
        );

        let seg = data(2, 100);
        assert_eq!(
            client.handle_segment(&mut engine, &mut io, FROM, &seg, 0).unwrap(),
            TransferEvent::Data {
                payload: &[2; 100],
                last: true
            }
        );
        assert_eq!(client.state(), TransferState::Complete);
        assert!(!engine.has_pending());
        assert_eq!(
            sent_tftp(&io.drain_transmitted()),
            vec![(FrameClass::Optional, 0x8001, vec![0, 4, 0, 2])]
        );
    }

    #[test]
    fn previous_block_is_acked_without_forwarding() {
        let (mut client, mut engine, mut io) = setup();
        let first = data(1, 512);
        client.handle_segment(&mut engine, &mut io, FROM, &first, 0).unwrap();
        io.drain_transmitted();

        assert_eq!(
            client.handle_segment(&mut engine, &mut io, FROM, &first, 0).unwrap(),
            TransferEvent::Duplicate
        );
        assert_eq!(
            sent_tftp(&io.drain_transmitted()),
            vec![(FrameClass::Priority, 0x8001, vec![0, 4, 0, 1])]
        );
        assert_eq!(client.expected_block(), 2);
    }

    #[test]
    fn final_block_repeat_is_reacked() {
        let (mut client, mut engine, mut io) = setup();
        let last = data(1, 3);
        client.handle_segment(&mut engine, &mut io, FROM, &last, 0).unwrap();
        io.drain_transmitted();
        assert_eq!(
            client.handle_segment(&mut engine, &mut io, FROM, &last, 0).unwrap(),
            TransferEvent::Duplicate
        );
        assert_eq!(
            sent_tftp(&io.drain_transmitted()),
            vec![(FrameClass::Optional, 0x8001, vec![0, 4, 0, 1])]
        );
    }

    #[test]
    fn gap_is_fatal_and_reported_to_server() {
        let (mut client, mut engine, mut io) = setup();
        let seg = data(3, 512);
        assert_eq!(
            client.handle_segment(&mut engine, &mut io, FROM, &seg, 0),
            Err(FatalError::Protocol("TFTP block out of sequence"))
        );
        assert_eq!(client.state(), TransferState::Failed);
        assert_eq!(
            sent_tftp(&io.drain_transmitted()),
            vec![(FrameClass::Optional, 0x8001, vec![0, 5, 0, 4, 0])]
        );

        // Once failed, nothing else is processed.
        let seg = data(1, 512);
        assert_eq!(
            client.handle_segment(&mut engine, &mut io, FROM, &seg, 0).unwrap(),
            TransferEvent::Ignored
        );
    }

    #[test]
    fn server_error_is_file_not_found() {
        let (mut client, mut engine, mut io) = setup();
        client.start(&mut engine, &mut io, 0).unwrap();
        let err = tftp::error(TftpErrorCode::FILE_NOT_FOUND, "nope");
        assert!(matches!(
            client.handle_segment(&mut engine, &mut io, FROM, &err, 0),
            Err(FatalError::FileNotFound(_))
        ));
        assert!(!engine.has_pending());
    }

    #[test]
    fn unexpected_opcode_is_fatal() {
        let (mut client, mut engine, mut io) = setup();
        assert!(matches!(
            client.handle_segment(&mut engine, &mut io, FROM, &tftp::ack(1), 0),
            Err(FatalError::FileNotFound(_))
        ));
    }

    #[test]
    fn foreign_transfer_id_gets_error_and_is_ignored() {
        let (mut client, mut engine, mut io) = setup();
        let seg = data(1, 512);
        client.handle_segment(&mut engine, &mut io, FROM, &seg, 0).unwrap();
        io.drain_transmitted();

        let intruder = Peer { port: 0x9999, ..FROM };
        let seg = data(2, 512);
        assert_eq!(
            client.handle_segment(&mut engine, &mut io, intruder, &seg, 0).unwrap(),
            TransferEvent::Ignored
        );
        assert_eq!(
            sent_tftp(&io.drain_transmitted()),
            vec![(FrameClass::Optional, 0x9999, vec![0, 5, 0, 5, 0])]
        );
        assert_eq!(client.expected_block(), 2);

        let stranger = Peer {
            ip: Ipv4Addr::new(192, 168, 0, 99),
            ..FROM
        };
        assert_eq!(
            client.handle_segment(&mut engine, &mut io, stranger, &seg, 0).unwrap(),
            TransferEvent::Ignored
        );
    }

    #[test]
    fn block_counter_wraps_past_255() {
        let (mut client, mut engine, mut io) = setup();
        for block in 1..=300u16 {
            let seg = data(block, 512);
            assert!(matches!(
                client.handle_segment(&mut engine, &mut io, FROM, &seg, 0).unwrap(),
                TransferEvent::Data { .. }
            ));
        }
        // Servers that wrap their own 16-bit counter modulo 256 still match on the low byte.
        let seg = data(301 & 0xff, 0);
        assert!(matches!(
            client.handle_segment(&mut engine, &mut io, FROM, &seg, 0).unwrap(),
            TransferEvent::Data { last: true, .. }
        ));
    }

    proptest! {
        // Steps are either the next block or a repeat of the previous one.
        #[test]
        fn each_block_forwarded_once(steps in proptest::collection::vec(any::<bool>(), 1..200)) {
            let (mut client, mut engine, mut io) = setup();
            let total = steps.len();
            let mut next: u16 = 1;
            let mut forwarded = Vec::new();
            let mut acks = 0usize;

            for advance in steps {
                let block = if advance || next == 1 { next } else { next - 1 };
                let seg = data(block, 512);
                match client.handle_segment(&mut engine, &mut io, FROM, &seg, 0).unwrap() {
                    TransferEvent::Data { .. } => {
                        forwarded.push(block);
                        next += 1;
                    }
                    TransferEvent::Duplicate => {}
                    TransferEvent::Ignored => prop_assert!(false, "segment ignored"),
                }
                acks += io.drain_transmitted().len();
            }

            let distinct: Vec<u16> = (1..next).collect();
            prop_assert_eq!(forwarded, distinct);
            prop_assert_eq!(acks, total);
            prop_assert_eq!(client.expected_block(), next);
        }
    }
}
