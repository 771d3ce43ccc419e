//! Internet-style ones'-complement checksums.

use core::net::Ipv4Addr;

/// Running 16-bit ones'-complement sum.
///
/// Bytes may be fed in arbitrarily sized pieces: an odd trailing byte is held back and paired
/// with the first byte of the next piece, so splitting a range never changes the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum {
    sum: u32,
    pending: Option<u8>,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bytes(&mut self, mut bytes: &[u8]) {
        if let Some(hi) = self.pending.take() {
            match bytes.split_first() {
                Some((&lo, rest)) => {
                    self.add_u16(u16::from_be_bytes([hi, lo]));
                    bytes = rest;
                }
                None => {
                    self.pending = Some(hi);
                    return;
                }
            }
        }

        let mut chunks = bytes.chunks_exact(2);
        for pair in &mut chunks {
            self.add_u16(u16::from_be_bytes([pair[0], pair[1]]));
        }
        if let [last] = chunks.remainder() {
            self.pending = Some(*last);
        }
    }

    pub fn add_u16(&mut self, value: u16) {
        self.sum += u32::from(value);
        // Keep the accumulator small so it can never overflow.
        if self.sum > 0xffff {
            self.sum = (self.sum & 0xffff) + (self.sum >> 16);
        }
    }

    /// Folded (but not complemented) sum, with any odd byte padded with zero.
    pub fn fold(&self) -> u16 {
        let mut sum = self.sum;
        if let Some(hi) = self.pending {
            sum += u32::from(u16::from_be_bytes([hi, 0]));
        }
        while sum > 0xffff {
            sum = (sum & 0xffff) + (sum >> 16);
        }
        sum as u16
    }

    /// Value to place in a checksum field.
    pub fn finish(&self) -> u16 {
        !self.fold()
    }

    /// True when the covered range already includes a correct checksum field.
    pub fn is_intact(&self) -> bool {
        self.fold() == 0xffff
    }
}

pub fn ipv4_header_checksum(header: &[u8]) -> u16 {
    let mut acc = Checksum::new();
    acc.add_bytes(header);
    acc.finish()
}

/// Checksum over the IPv4 pseudo header plus `segment`.
///
/// For a segment whose checksum field is already filled in this returns 0 when the checksum
/// is correct.
pub fn transport_checksum_ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, segment: &[u8]) -> u16 {
    let mut acc = Checksum::new();
    acc.add_bytes(&src.octets());
    acc.add_bytes(&dst.octets());
    acc.add_u16(u16::from(protocol));
    acc.add_u16(segment.len() as u16);
    acc.add_bytes(segment);
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 1071 example data.
    const SAMPLE: [u8; 8] = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];

    #[test]
    fn rfc1071_sample() {
        let mut acc = Checksum::new();
        acc.add_bytes(&SAMPLE);
        assert_eq!(acc.fold(), 0xddf2);
        assert_eq!(acc.finish(), 0x220d);
    }

    #[test]
    fn odd_split_matches_single_pass() {
        let mut whole = Checksum::new();
        whole.add_bytes(&SAMPLE);
        for split in 0..=SAMPLE.len() {
            let mut parts = Checksum::new();
            parts.add_bytes(&SAMPLE[..split]);
            parts.add_bytes(&[]);
            parts.add_bytes(&SAMPLE[split..]);
            assert_eq!(parts.fold(), whole.fold(), "split at {split}");
        }
    }

    #[test]
    fn odd_length_is_zero_padded() {
        let mut acc = Checksum::new();
        acc.add_bytes(&[0x12, 0x34, 0x56]);
        assert_eq!(acc.fold(), 0x1234 + 0x5600);
    }

    #[test]
    fn header_with_checksum_folds_to_all_ones() {
        let mut header = [
            0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 192, 168, 0,
            1, 192, 168, 0, 2,
        ];
        let csum = ipv4_header_checksum(&header);
        header[10..12].copy_from_slice(&csum.to_be_bytes());
        let mut acc = Checksum::new();
        acc.add_bytes(&header);
        assert!(acc.is_intact());
    }
}
