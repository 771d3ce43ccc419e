use zxboot_snapshot::SnapshotHeader;

/// Primary registers, SP and R, computed as soon as the header is known and loaded as the
/// second-to-last step of the hand-off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterScratch {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub sp: u16,
    pub r: u8,
}

impl RegisterScratch {
    /// Only the low seven bits of R count; bit 7 is carried over unchanged.
    pub fn prepare(header: &SnapshotHeader, r_adjust: u8) -> Self {
        let regs = &header.regs;
        Self {
            af: u16::from_be_bytes([regs.a, regs.f]),
            bc: regs.bc,
            de: regs.de,
            hl: regs.hl,
            sp: regs.sp,
            r: (regs.r.wrapping_add(r_adjust) & 0x7f) | (regs.r & 0x80),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zxboot_snapshot::{FormatVersion, HardwareClass};

    #[test]
    fn r_keeps_bit_seven_through_adjustment() {
        let mut header = SnapshotHeader::new(FormatVersion::V2, HardwareClass::Spectrum48k);
        header.regs.r = 0xfe;
        header.regs.a = 0x12;
        header.regs.f = 0x34;
        assert_eq!(RegisterScratch::prepare(&header, 0).r, 0xfe);
        assert_eq!(RegisterScratch::prepare(&header, 3).r, 0x81);
        assert_eq!(RegisterScratch::prepare(&header, 0xef).af, 0x1234);

        header.regs.r = 0x05;
        assert_eq!(RegisterScratch::prepare(&header, 0xef).r, 0x74);
    }
}
