use std::io::Cursor;

use crate::error::{Result, SnapshotError};
use crate::format::{
    FormatVersion, HardwareClass, BASE_HEADER_LEN, EXTENDED_HEADER_START, FLAG_COMPRESSED,
    FLAG_MODIFY_HARDWARE, FLAG_SAMROM,
};
use crate::io::ReadLeExt;

/// Z80 register file as stored in the header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub a_alt: u8,
    pub f_alt: u8,
    pub bc_alt: u16,
    pub de_alt: u16,
    pub hl_alt: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
    pub i: u8,
    /// Full refresh register; bit 7 is reassembled from the misc flags byte.
    pub r: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterruptMode {
    #[default]
    Im0,
    Im1,
    Im2,
}

impl InterruptMode {
    fn from_header_byte(b: u8) -> Self {
        match b & 0x03 {
            0 => Self::Im0,
            1 => Self::Im1,
            _ => Self::Im2,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::Im0 => 0,
            Self::Im1 => 1,
            Self::Im2 => 2,
        }
    }
}

/// Decoded .z80 header.
///
/// The misc flags byte packs the border colour, bit 7 of R and the version 1 compression flag;
/// those are split into separate fields here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub version: FormatVersion,
    pub hardware: HardwareClass,
    /// Raw hardware byte (0 for version 1).
    pub hardware_type: u8,
    pub regs: Registers,
    pub iff1: bool,
    pub iff2: bool,
    pub interrupt_mode: InterruptMode,
    pub border: u8,
    /// Version 1 only: the single memory block is run-length encoded.
    pub compressed: bool,
    /// Last value written to port 0x7FFD (128K only).
    pub port_7ffd: u8,
    /// Last value written to port 0xFFFD (AY register select).
    pub ay_selected: u8,
    pub ay_registers: [u8; 16],
}

impl SnapshotHeader {
    /// A zeroed header for the given layout.
    pub fn new(version: FormatVersion, hardware: HardwareClass) -> Self {
        Self {
            version,
            hardware,
            hardware_type: match version {
                FormatVersion::V1 => 0,
                v => hardware.hardware_type(v),
            },
            regs: Registers::default(),
            iff1: false,
            iff2: false,
            interrupt_mode: InterruptMode::Im0,
            border: 0,
            compressed: false,
            port_7ffd: 0,
            ay_selected: 0,
            ay_registers: [0; 16],
        }
    }

    /// Total on-wire length of the header starting with `prefix`, or `None` while too few bytes
    /// are available to tell.
    pub fn required_len(prefix: &[u8]) -> Result<Option<usize>> {
        if prefix.len() < BASE_HEADER_LEN {
            return Ok(None);
        }
        if prefix[6] != 0 || prefix[7] != 0 {
            return Ok(Some(BASE_HEADER_LEN));
        }
        if prefix.len() < EXTENDED_HEADER_START {
            return Ok(None);
        }
        let ext_len = u16::from_le_bytes([prefix[30], prefix[31]]);
        FormatVersion::from_extended_len(ext_len)?;
        Ok(Some(EXTENDED_HEADER_START + usize::from(ext_len)))
    }

    /// Length of this header when encoded.
    pub fn encoded_len(&self) -> usize {
        match self.version.extended_len() {
            None => BASE_HEADER_LEN,
            Some(ext) => EXTENDED_HEADER_START + usize::from(ext),
        }
    }

    /// Parse a complete header. `bytes` may extend past the header.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(bytes);
        let a = r.read_u8()?;
        let f = r.read_u8()?;
        let bc = r.read_u16_le()?;
        let hl = r.read_u16_le()?;
        let pc = r.read_u16_le()?;
        let sp = r.read_u16_le()?;
        let i = r.read_u8()?;
        let r_low = r.read_u8()?;
        let mut misc = r.read_u8()?;
        if misc == 0xff {
            misc = 0x01;
        }
        let de = r.read_u16_le()?;
        let bc_alt = r.read_u16_le()?;
        let de_alt = r.read_u16_le()?;
        let hl_alt = r.read_u16_le()?;
        let a_alt = r.read_u8()?;
        let f_alt = r.read_u8()?;
        let iy = r.read_u16_le()?;
        let ix = r.read_u16_le()?;
        let iff1 = r.read_bool()?;
        let iff2 = r.read_bool()?;
        let interrupt_mode = InterruptMode::from_header_byte(r.read_u8()?);

        let mut header = Self {
            version: FormatVersion::V1,
            hardware: HardwareClass::Spectrum48k,
            hardware_type: 0,
            regs: Registers {
                a,
                f,
                bc,
                de,
                hl,
                a_alt,
                f_alt,
                bc_alt,
                de_alt,
                hl_alt,
                ix,
                iy,
                sp,
                pc,
                i,
                r: (r_low & 0x7f) | ((misc & 0x01) << 7),
            },
            iff1,
            iff2,
            interrupt_mode,
            border: (misc >> 1) & 0x07,
            compressed: misc & FLAG_COMPRESSED != 0,
            port_7ffd: 0,
            ay_selected: 0,
            ay_registers: [0; 16],
        };

        if pc != 0 {
            if misc & FLAG_SAMROM != 0 {
                return Err(SnapshotError::SamRom);
            }
            return Ok(header);
        }

        let ext_len = r.read_u16_le()?;
        let version = FormatVersion::from_extended_len(ext_len)?;
        header.version = version;
        header.regs.pc = r.read_u16_le()?;
        header.hardware_type = r.read_u8()?;
        header.hardware = HardwareClass::from_hardware_type(version, header.hardware_type)?;
        header.port_7ffd = r.read_u8()?;
        let _if1_paged = r.read_u8()?;
        let modify = r.read_u8()?;
        if header.hardware == HardwareClass::Spectrum48k && modify & FLAG_MODIFY_HARDWARE != 0 {
            return Err(SnapshotError::Spectrum16k);
        }
        header.ay_selected = r.read_u8()?;
        header.ay_registers = r.read_array()?;
        Ok(header)
    }

    /// Encode the header. Extended headers carry zeroes in every field this crate does not model.
    #[cfg(feature = "image-builder")]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        use crate::io::WriteLeExt;

        let mut out = Vec::with_capacity(self.encoded_len());
        let regs = &self.regs;
        let paged = self.version.is_paged();
        let mut misc = (regs.r >> 7) | ((self.border & 0x07) << 1);
        if !paged && self.compressed {
            misc |= FLAG_COMPRESSED;
        }

        out.write_u8(regs.a)?;
        out.write_u8(regs.f)?;
        out.write_u16_le(regs.bc)?;
        out.write_u16_le(regs.hl)?;
        out.write_u16_le(if paged { 0 } else { regs.pc })?;
        out.write_u16_le(regs.sp)?;
        out.write_u8(regs.i)?;
        out.write_u8(regs.r & 0x7f)?;
        out.write_u8(misc)?;
        out.write_u16_le(regs.de)?;
        out.write_u16_le(regs.bc_alt)?;
        out.write_u16_le(regs.de_alt)?;
        out.write_u16_le(regs.hl_alt)?;
        out.write_u8(regs.a_alt)?;
        out.write_u8(regs.f_alt)?;
        out.write_u16_le(regs.iy)?;
        out.write_u16_le(regs.ix)?;
        out.write_u8(self.iff1.into())?;
        out.write_u8(self.iff2.into())?;
        out.write_u8(self.interrupt_mode.number())?;

        let Some(ext_len) = self.version.extended_len() else {
            if regs.pc == 0 {
                return Err(SnapshotError::Corrupt("version 1 snapshot with PC of zero"));
            }
            return Ok(out);
        };
        out.write_u16_le(ext_len)?;
        out.write_u16_le(regs.pc)?;
        out.write_u8(self.hardware_type)?;
        out.write_u8(self.port_7ffd)?;
        out.write_u8(0)?;
        out.write_u8(0)?;
        out.write_u8(self.ay_selected)?;
        out.write_bytes(&self.ay_registers)?;
        out.resize(self.encoded_len(), 0);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_bytes() -> Vec<u8> {
        let mut h = vec![0u8; 30];
        h[0] = 0x12; // A
        h[1] = 0x34; // F
        h[2] = 0x01; // C
        h[3] = 0x02; // B
        h[6] = 0x00;
        h[7] = 0x80; // PC = 0x8000
        h[11] = 0x7f;
        h[12] = 0x01 | (5 << 1) | 0x20;
        h[13] = 0x0e; // E
        h[14] = 0x0d; // D
        h[27] = 1;
        h[29] = 0x41;
        h
    }

    #[test]
    fn version_one_header_demuxes_misc_flags() {
        let h = SnapshotHeader::parse(&v1_bytes()).unwrap();
        assert_eq!(h.version, FormatVersion::V1);
        assert_eq!(h.hardware, HardwareClass::Spectrum48k);
        assert_eq!(h.regs.a, 0x12);
        assert_eq!(h.regs.f, 0x34);
        assert_eq!(h.regs.bc, 0x0201);
        assert_eq!(h.regs.de, 0x0d0e);
        assert_eq!(h.regs.pc, 0x8000);
        assert_eq!(h.regs.r, 0xff);
        assert_eq!(h.border, 5);
        assert!(h.compressed);
        assert!(h.iff1);
        assert!(!h.iff2);
        assert_eq!(h.interrupt_mode, InterruptMode::Im1);
        assert_eq!(SnapshotHeader::required_len(&v1_bytes()).unwrap(), Some(30));
    }

    #[test]
    fn misc_byte_of_ff_reads_as_one() {
        let mut bytes = v1_bytes();
        bytes[12] = 0xff;
        let h = SnapshotHeader::parse(&bytes).unwrap();
        assert_eq!(h.border, 0);
        assert!(!h.compressed);
        assert_eq!(h.regs.r, 0xff);
    }

    #[test]
    fn samrom_flag_is_rejected() {
        let mut bytes = v1_bytes();
        bytes[12] |= FLAG_SAMROM;
        assert!(matches!(SnapshotHeader::parse(&bytes), Err(SnapshotError::SamRom)));
    }

    #[test]
    fn extended_header_fields() {
        let mut bytes = vec![0u8; 32 + 54];
        bytes[30] = 54;
        bytes[32] = 0x34;
        bytes[33] = 0x12;
        bytes[34] = 4;
        bytes[35] = 0x17;
        bytes[38] = 0x0e;
        for (i, b) in bytes[39..55].iter_mut().enumerate() {
            *b = i as u8 * 3;
        }
        bytes[29] = 0x02;

        assert_eq!(SnapshotHeader::required_len(&bytes[..31]).unwrap(), None);
        assert_eq!(SnapshotHeader::required_len(&bytes).unwrap(), Some(86));

        let h = SnapshotHeader::parse(&bytes).unwrap();
        assert_eq!(h.version, FormatVersion::V3);
        assert_eq!(h.hardware, HardwareClass::Spectrum128k);
        assert_eq!(h.regs.pc, 0x1234);
        assert_eq!(h.port_7ffd, 0x17);
        assert_eq!(h.ay_selected, 0x0e);
        assert_eq!(h.ay_registers[15], 45);
        assert_eq!(h.interrupt_mode, InterruptMode::Im2);
    }

    #[test]
    fn unknown_extended_length_is_rejected_early() {
        let mut bytes = vec![0u8; 32];
        bytes[30] = 30;
        assert!(matches!(
            SnapshotHeader::required_len(&bytes),
            Err(SnapshotError::UnsupportedVersion(30))
        ));
    }

    #[test]
    fn samram_and_16k_are_rejected() {
        let mut bytes = vec![0u8; 32 + 23];
        bytes[30] = 23;
        bytes[34] = 2;
        assert!(matches!(
            SnapshotHeader::parse(&bytes),
            Err(SnapshotError::UnsupportedHardware { hw_type: 2, .. })
        ));

        bytes[34] = 0;
        bytes[37] = FLAG_MODIFY_HARDWARE;
        assert!(matches!(SnapshotHeader::parse(&bytes), Err(SnapshotError::Spectrum16k)));
    }

    #[cfg(feature = "image-builder")]
    #[test]
    fn encoded_header_parses_back() {
        let mut h = SnapshotHeader::new(FormatVersion::V2, HardwareClass::Spectrum128k);
        h.regs.pc = 0xbeef;
        h.regs.r = 0x85;
        h.border = 3;
        h.port_7ffd = 0x10;
        h.ay_registers[7] = 0x38;
        let bytes = h.to_bytes().unwrap();
        assert_eq!(bytes.len(), 55);
        assert_eq!(SnapshotHeader::parse(&bytes).unwrap(), h);
    }
}
