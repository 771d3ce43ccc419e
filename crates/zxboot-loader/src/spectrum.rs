use tracing::debug;
use zxboot_net::FatalCode;
use zxboot_snapshot::{BankedMemory, InterruptMode, LoadTarget};

use crate::machine::{
    AlternateRegisters, Machine, PagingFlags, BANK_MASK, PORT_1FFD, PORT_7FFD, PORT_AY_DATA,
    PORT_AY_SELECT,
};
use crate::scratch::RegisterScratch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Still under firmware control.
    Booting,
    Running { pc: u16, interrupts_enabled: bool },
    Halted(FatalCode),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuState {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub alt: AlternateRegisters,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub i: u8,
    pub r: u8,
    pub interrupt_mode: InterruptMode,
    pub interrupts_enabled: bool,
}

/// Host model of a 128K Spectrum (a 48K machine is the same with paging locked).
#[derive(Debug, Clone)]
pub struct Spectrum {
    memory: BankedMemory,
    port_7ffd: u8,
    port_1ffd: u8,
    paging_locked: bool,
    border: u8,
    ay_selected: u8,
    ay: [u8; 16],
    cpu: CpuState,
    state: RunState,
}

impl Default for Spectrum {
    fn default() -> Self {
        Self::new()
    }
}

impl Spectrum {
    pub fn new() -> Self {
        Self {
            memory: BankedMemory::new(),
            port_7ffd: 0,
            port_1ffd: 0,
            paging_locked: false,
            border: 7,
            ay_selected: 0,
            ay: [0; 16],
            cpu: CpuState {
                interrupts_enabled: true,
                interrupt_mode: InterruptMode::Im1,
                ..CpuState::default()
            },
            state: RunState::Booting,
        }
    }

    pub fn memory(&self) -> &BankedMemory {
        &self.memory
    }

    pub fn cpu(&self) -> &CpuState {
        &self.cpu
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn border(&self) -> u8 {
        self.border
    }

    pub fn port_7ffd(&self) -> u8 {
        self.port_7ffd
    }

    pub fn port_1ffd(&self) -> u8 {
        self.port_1ffd
    }

    pub fn paging_flags(&self) -> PagingFlags {
        PagingFlags::from_bits_truncate(self.port_7ffd)
    }

    pub fn paging_locked(&self) -> bool {
        self.paging_locked
    }

    pub fn ay_selected(&self) -> u8 {
        self.ay_selected
    }

    pub fn ay_registers(&self) -> &[u8; 16] {
        &self.ay
    }
}

impl LoadTarget for Spectrum {
    fn select_bank(&mut self, bank: u8) {
        self.memory.select_bank(bank);
    }

    fn write(&mut self, addr: u16, bytes: &[u8]) {
        self.memory.write(addr, bytes);
    }
}

impl Machine for Spectrum {
    fn disable_interrupts(&mut self) {
        self.cpu.interrupts_enabled = false;
    }

    fn port_write(&mut self, port: u16, value: u8) {
        match port {
            PORT_7FFD => {
                if self.paging_locked {
                    return;
                }
                self.port_7ffd = value;
                self.memory.select_bank(value & BANK_MASK);
                self.paging_locked =
                    PagingFlags::from_bits_truncate(value).contains(PagingFlags::LOCK);
            }
            PORT_1FFD => self.port_1ffd = value,
            PORT_AY_SELECT => self.ay_selected = value & 0x0f,
            PORT_AY_DATA => self.ay[usize::from(self.ay_selected)] = value,
            p if p & 0x01 == 0 => self.border = value & 0x07,
            _ => {}
        }
    }

    fn set_interrupt_vector(&mut self, i: u8) {
        self.cpu.i = i;
    }

    fn set_alternate_registers(&mut self, regs: &AlternateRegisters) {
        self.cpu.alt = *regs;
    }

    fn set_index_registers(&mut self, ix: u16, iy: u16) {
        self.cpu.ix = ix;
        self.cpu.iy = iy;
    }

    fn set_interrupt_mode(&mut self, mode: InterruptMode) {
        self.cpu.interrupt_mode = mode;
    }

    fn load_registers(&mut self, scratch: &RegisterScratch) {
        self.cpu.af = scratch.af;
        self.cpu.bc = scratch.bc;
        self.cpu.de = scratch.de;
        self.cpu.hl = scratch.hl;
        self.cpu.sp = scratch.sp;
        self.cpu.r = scratch.r;
    }

    fn jump(&mut self, pc: u16, enable_interrupts: bool) {
        self.cpu.interrupts_enabled = enable_interrupts;
        self.state = RunState::Running {
            pc,
            interrupts_enabled: enable_interrupts,
        };
    }

    fn halt(&mut self, code: FatalCode) {
        debug!(%code, colour = code.border_colour(), "halting");
        self.cpu.interrupts_enabled = false;
        self.set_border(code.border_colour());
        self.state = RunState::Halted(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_lock_ignores_later_writes() {
        let mut zx = Spectrum::new();
        zx.port_write(PORT_7FFD, 0x03);
        zx.write(0xc000, &[0xaa]);
        assert_eq!(zx.memory().bank(3)[0], 0xaa);

        zx.port_write(PORT_7FFD, 0x30);
        assert!(zx.paging_locked());
        zx.port_write(PORT_7FFD, 0x07);
        assert_eq!(zx.port_7ffd(), 0x30);
        assert_eq!(zx.memory().selected_bank(), 0);
    }

    #[test]
    fn ay_and_border_ports() {
        let mut zx = Spectrum::new();
        zx.ay_write(7, 0x38);
        zx.set_border(0x0d);
        assert_eq!(zx.ay_registers()[7], 0x38);
        assert_eq!(zx.ay_selected(), 7);
        assert_eq!(zx.border(), 5);
    }

    #[test]
    fn halt_shows_code_colour() {
        let mut zx = Spectrum::new();
        zx.halt(FatalCode::FileNotFound);
        assert_eq!(zx.border(), 6);
        assert_eq!(zx.state(), RunState::Halted(FatalCode::FileNotFound));
        assert!(!zx.cpu().interrupts_enabled);
    }
}
