//! Hand-off from the firmware to the loaded image.

use tracing::debug;
use zxboot_snapshot::{HardwareClass, Restore, SnapshotHeader, StagingArea};

use crate::machine::{
    AlternateRegisters, Machine, PagingFlags, PORT_1FFD, PORT_7FFD, PORT_AY_SELECT, UPPER_ROM_1FFD,
};
use crate::scratch::RegisterScratch;

/// What the machine was left doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handoff {
    pub pc: u16,
    pub interrupts_enabled: bool,
    pub hardware: HardwareClass,
    /// Bytes copied back from the staging area.
    pub restored: usize,
    /// Ones'-complement sum over the restored bytes.
    pub restore_checksum: u16,
}

/// Put the machine into the state recorded in `header` and jump to it.
///
/// Interrupts stay off from the first step until the final jump. The order of the steps is
/// fixed: paging first so the restore lands in the right banks, and the primary registers
/// last since the restore would otherwise clobber them.
pub fn switch_context<M, S>(
    machine: &mut M,
    staging: &mut S,
    header: &SnapshotHeader,
    scratch: &RegisterScratch,
    restore: Restore,
) -> Handoff
where
    M: Machine + ?Sized,
    S: StagingArea + ?Sized,
{
    machine.disable_interrupts();

    match header.hardware {
        HardwareClass::Spectrum128k => {
            let flags = PagingFlags::from_bits_truncate(header.port_7ffd);
            let upper = if flags.contains(PagingFlags::ROM_48K) { UPPER_ROM_1FFD } else { 0 };
            machine.port_write(PORT_1FFD, upper);
            machine.port_write(PORT_7FFD, header.port_7ffd);
        }
        HardwareClass::Spectrum48k => {
            machine.port_write(PORT_1FFD, UPPER_ROM_1FFD);
            machine.port_write(PORT_7FFD, (PagingFlags::ROM_48K | PagingFlags::LOCK).bits());
        }
    }

    if header.hardware.has_ay() {
        for reg in (0..16u8).rev() {
            machine.ay_write(reg, header.ay_registers[usize::from(reg)]);
        }
        machine.port_write(PORT_AY_SELECT, header.ay_selected);
    }

    machine.set_interrupt_vector(header.regs.i);
    machine.set_border(header.border);
    machine.set_alternate_registers(&AlternateRegisters::from_header(header));
    machine.set_index_registers(header.regs.ix, header.regs.iy);
    machine.set_interrupt_mode(header.interrupt_mode);

    let restored = usize::from(restore.region().len);
    let checksum = restore.copy_back(staging, machine);

    machine.load_registers(scratch);
    debug!(pc = header.regs.pc, ei = header.iff1, "jumping to image");
    machine.jump(header.regs.pc, header.iff1);

    Handoff {
        pc: header.regs.pc,
        interrupts_enabled: header.iff1,
        hardware: header.hardware,
        restored,
        restore_checksum: checksum.fold(),
    }
}
