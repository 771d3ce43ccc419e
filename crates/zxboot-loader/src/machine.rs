use bitflags::bitflags;
use zxboot_net::FatalCode;
use zxboot_snapshot::{InterruptMode, LoadTarget, SnapshotHeader};

use crate::scratch::RegisterScratch;

/// 128K memory paging register.
pub const PORT_7FFD: u16 = 0x7ffd;
/// +2A/+3 paging register; bit 2 selects the upper ROM.
pub const PORT_1FFD: u16 = 0x1ffd;
/// AY register select.
pub const PORT_AY_SELECT: u16 = 0xfffd;
/// AY register data.
pub const PORT_AY_DATA: u16 = 0xbffd;
/// ULA port; the low three bits set the border.
pub const PORT_ULA: u16 = 0x00fe;

/// Bank number field of port 0x7FFD.
pub const BANK_MASK: u8 = 0x07;

bitflags! {
    /// Port 0x7FFD bits above the bank number.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PagingFlags: u8 {
        const SHADOW_SCREEN = 1 << 3;
        const ROM_48K = 1 << 4;
        /// Ignore further writes until reset.
        const LOCK = 1 << 5;
    }
}

/// Port 0x1FFD value that keeps the 48K BASIC ROM paged in.
pub const UPPER_ROM_1FFD: u8 = 0x04;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlternateRegisters {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
}

impl AlternateRegisters {
    pub fn from_header(header: &SnapshotHeader) -> Self {
        let regs = &header.regs;
        Self {
            af: u16::from_be_bytes([regs.a_alt, regs.f_alt]),
            bc: regs.bc_alt,
            de: regs.de_alt,
            hl: regs.hl_alt,
        }
    }
}

/// The CPU and I/O side of the target machine, as seen by the final hand-off.
///
/// Memory goes through [`LoadTarget`]; everything else the context switch touches is here.
pub trait Machine: LoadTarget {
    fn disable_interrupts(&mut self);

    fn port_write(&mut self, port: u16, value: u8);

    /// Load I.
    fn set_interrupt_vector(&mut self, i: u8);

    fn set_alternate_registers(&mut self, regs: &AlternateRegisters);

    fn set_index_registers(&mut self, ix: u16, iy: u16);

    fn set_interrupt_mode(&mut self, mode: InterruptMode);

    /// Load AF, BC, DE, HL, SP and R.
    fn load_registers(&mut self, scratch: &RegisterScratch);

    /// Start executing at `pc`. This is the last thing the firmware does.
    fn jump(&mut self, pc: u16, enable_interrupts: bool);

    /// Stop with the diagnostic colour for `code` on the border.
    fn halt(&mut self, code: FatalCode);

    fn set_border(&mut self, colour: u8) {
        self.port_write(PORT_ULA, colour & 0x07);
    }

    fn ay_write(&mut self, reg: u8, value: u8) {
        self.port_write(PORT_AY_SELECT, reg);
        self.port_write(PORT_AY_DATA, value);
    }
}

impl<T: Machine + ?Sized> Machine for &mut T {
    fn disable_interrupts(&mut self) {
        <T as Machine>::disable_interrupts(&mut **self)
    }

    fn port_write(&mut self, port: u16, value: u8) {
        <T as Machine>::port_write(&mut **self, port, value)
    }

    fn set_interrupt_vector(&mut self, i: u8) {
        <T as Machine>::set_interrupt_vector(&mut **self, i)
    }

    fn set_alternate_registers(&mut self, regs: &AlternateRegisters) {
        <T as Machine>::set_alternate_registers(&mut **self, regs)
    }

    fn set_index_registers(&mut self, ix: u16, iy: u16) {
        <T as Machine>::set_index_registers(&mut **self, ix, iy)
    }

    fn set_interrupt_mode(&mut self, mode: InterruptMode) {
        <T as Machine>::set_interrupt_mode(&mut **self, mode)
    }

    fn load_registers(&mut self, scratch: &RegisterScratch) {
        <T as Machine>::load_registers(&mut **self, scratch)
    }

    fn jump(&mut self, pc: u16, enable_interrupts: bool) {
        <T as Machine>::jump(&mut **self, pc, enable_interrupts)
    }

    fn halt(&mut self, code: FatalCode) {
        <T as Machine>::halt(&mut **self, code)
    }
}
