use std::collections::VecDeque;

use zxboot_packet::{Checksum, EthernetFrame, MacAddr};

/// Transmit class of an outgoing frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClass {
    /// Expects a reply; kept by the datagram engine and retransmitted on timeout.
    Priority,
    /// Fire-and-forget.
    Optional,
}

/// Link-layer driver for the Ethernet controller.
///
/// The controller owns a small on-chip SRAM. Besides frame buffers it doubles as the staging
/// area for evacuated working storage, hence the raw `read_bytes`/`write_bytes` accessors.
pub trait FrameIo {
    /// Frame `payload` with a link header addressed to `dst` and transmit it.
    fn send_frame(&mut self, dst: MacAddr, ethertype: u16, class: FrameClass, payload: &[u8]);

    /// Next received frame, oldest first.
    fn poll_received_frame(&mut self) -> Option<Vec<u8>> {
        None
    }

    /// Copy controller SRAM starting at `src` into `buf` and return the running checksum of
    /// the bytes read.
    fn read_bytes(&mut self, src: u16, buf: &mut [u8]) -> Checksum;

    /// Copy `bytes` into controller SRAM starting at `dst`.
    fn write_bytes(&mut self, dst: u16, bytes: &[u8]);
}

impl<T: FrameIo + ?Sized> FrameIo for Box<T> {
    fn send_frame(&mut self, dst: MacAddr, ethertype: u16, class: FrameClass, payload: &[u8]) {
        <T as FrameIo>::send_frame(&mut **self, dst, ethertype, class, payload);
    }

    fn poll_received_frame(&mut self) -> Option<Vec<u8>> {
        <T as FrameIo>::poll_received_frame(&mut **self)
    }

    fn read_bytes(&mut self, src: u16, buf: &mut [u8]) -> Checksum {
        <T as FrameIo>::read_bytes(&mut **self, src, buf)
    }

    fn write_bytes(&mut self, dst: u16, bytes: &[u8]) {
        <T as FrameIo>::write_bytes(&mut **self, dst, bytes);
    }
}

impl<T: FrameIo + ?Sized> FrameIo for &mut T {
    fn send_frame(&mut self, dst: MacAddr, ethertype: u16, class: FrameClass, payload: &[u8]) {
        <T as FrameIo>::send_frame(&mut **self, dst, ethertype, class, payload);
    }

    fn poll_received_frame(&mut self) -> Option<Vec<u8>> {
        <T as FrameIo>::poll_received_frame(&mut **self)
    }

    fn read_bytes(&mut self, src: u16, buf: &mut [u8]) -> Checksum {
        <T as FrameIo>::read_bytes(&mut **self, src, buf)
    }

    fn write_bytes(&mut self, dst: u16, bytes: &[u8]) {
        <T as FrameIo>::write_bytes(&mut **self, dst, bytes);
    }
}

/// Size of the controller's on-chip SRAM.
pub const SRAM_LEN: usize = 0x2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    pub class: FrameClass,
    pub frame: Vec<u8>,
}

/// Queue-backed [`FrameIo`] with an emulated controller SRAM.
///
/// Transmitted frames are collected for inspection and received frames are injected with
/// [`SramFrameIo::push_received`]. SRAM addresses wrap, like the controller's receive ring.
pub struct SramFrameIo {
    mac: MacAddr,
    sram: Vec<u8>,
    rx: VecDeque<Vec<u8>>,
    tx: VecDeque<TxFrame>,
}

impl SramFrameIo {
    pub fn new(mac: MacAddr) -> Self {
        Self {
            mac,
            sram: vec![0; SRAM_LEN],
            rx: VecDeque::new(),
            tx: VecDeque::new(),
        }
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn push_received(&mut self, frame: Vec<u8>) {
        self.rx.push_back(frame);
    }

    pub fn drain_transmitted(&mut self) -> Vec<TxFrame> {
        self.tx.drain(..).collect()
    }

    pub fn sram(&self) -> &[u8] {
        &self.sram
    }
}

impl FrameIo for SramFrameIo {
    fn send_frame(&mut self, dst: MacAddr, ethertype: u16, class: FrameClass, payload: &[u8]) {
        let frame = EthernetFrame::serialize(dst, self.mac, ethertype, payload);
        self.tx.push_back(TxFrame { class, frame });
    }

    fn poll_received_frame(&mut self) -> Option<Vec<u8>> {
        self.rx.pop_front()
    }

    fn read_bytes(&mut self, src: u16, buf: &mut [u8]) -> Checksum {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.sram[(usize::from(src) + i) % SRAM_LEN];
        }
        let mut acc = Checksum::new();
        acc.add_bytes(buf);
        acc
    }

    fn write_bytes(&mut self, dst: u16, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.sram[(usize::from(dst) + i) % SRAM_LEN] = b;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zxboot_packet::ETHERTYPE_IPV4;

    #[test]
    fn sram_round_trip_with_wrap() {
        let mut io = SramFrameIo::new(MacAddr([2, 0, 0, 0, 0, 1]));
        io.write_bytes((SRAM_LEN - 2) as u16, &[1, 2, 3, 4]);
        let mut buf = [0u8; 4];
        let acc = io.read_bytes((SRAM_LEN - 2) as u16, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(acc.fold(), 0x0102 + 0x0304);
        assert_eq!(&io.sram()[..2], &[3, 4]);
    }

    #[test]
    fn boxed_and_borrowed_io_forward() {
        fn send(mut io: impl FrameIo) {
            io.send_frame(MacAddr::BROADCAST, ETHERTYPE_IPV4, FrameClass::Optional, b"hi");
        }

        let mut io = SramFrameIo::new(MacAddr([2, 0, 0, 0, 0, 1]));
        send(&mut io);
        let mut boxed: Box<dyn FrameIo> = Box::new(SramFrameIo::new(MacAddr([2, 0, 0, 0, 0, 2])));
        send(&mut boxed);

        let sent = io.drain_transmitted();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].class, FrameClass::Optional);
        let eth = EthernetFrame::parse(&sent[0].frame).unwrap();
        assert_eq!(eth.src, io.mac());
        assert_eq!(eth.payload, b"hi");
    }
}
