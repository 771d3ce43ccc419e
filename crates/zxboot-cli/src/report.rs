//! Plain-text reports printed by the subcommands.

use std::io::{self, Write};

use zxboot_loader::machine::BANK_MASK;
use zxboot_loader::{Handoff, PagingFlags, Spectrum};
use zxboot_net::sim::LoopbackNetwork;
use zxboot_snapshot::{BodyLayout, HardwareClass, SnapshotDirectory, SnapshotHeader};

pub fn write_directory(out: &mut impl Write, dir: &SnapshotDirectory) -> io::Result<()> {
    let h = &dir.header;
    writeln!(out, "version      {}", h.version)?;
    writeln!(out, "hardware     {} (type {})", h.hardware.name(), h.hardware_type)?;
    write_header_registers(out, h)?;
    if h.hardware == HardwareClass::Spectrum128k {
        let flags = PagingFlags::from_bits_truncate(h.port_7ffd);
        writeln!(
            out,
            "7ffd         {:#04x} (bank {}, screen {}, rom {}, {})",
            h.port_7ffd,
            h.port_7ffd & BANK_MASK,
            if flags.contains(PagingFlags::SHADOW_SCREEN) { 7 } else { 5 },
            u8::from(flags.contains(PagingFlags::ROM_48K)),
            if flags.contains(PagingFlags::LOCK) { "locked" } else { "unlocked" },
        )?;
        writeln!(out, "ay           select {:#04x} regs {:02x?}", h.ay_selected, h.ay_registers)?;
    }

    match &dir.body {
        BodyLayout::Flat {
            offset,
            encoded_len,
            compressed,
        } => {
            writeln!(
                out,
                "body         {encoded_len} bytes at {offset:#x}, {}",
                if *compressed { "compressed" } else { "stored" }
            )?;
        }
        BodyLayout::Paged(pages) => {
            writeln!(out, "pages        {} of {}", pages.len(), h.hardware.page_count())?;
            writeln!(out, "  id  target        offset  encoded  compressed")?;
            for p in pages {
                let target = match p.placement.bank {
                    Some(bank) => format!("bank {bank}"),
                    None => format!("{:#06x}", p.placement.base),
                };
                writeln!(
                    out,
                    "  {:>2}  {:<12}  {:>6x}  {:>7}  {}",
                    p.page_id,
                    target,
                    p.offset,
                    p.encoded_len,
                    if p.compressed { "yes" } else { "no" }
                )?;
            }
            if dir.trailing > 0 {
                writeln!(out, "trailing     {} bytes", dir.trailing)?;
            }
        }
    }
    Ok(())
}

fn write_header_registers(out: &mut impl Write, h: &SnapshotHeader) -> io::Result<()> {
    let r = &h.regs;
    writeln!(out, "pc           {:#06x}", r.pc)?;
    writeln!(out, "sp           {:#06x}", r.sp)?;
    writeln!(
        out,
        "af bc de hl  {:02x}{:02x} {:04x} {:04x} {:04x}",
        r.a, r.f, r.bc, r.de, r.hl
    )?;
    writeln!(
        out,
        "alternates   {:02x}{:02x} {:04x} {:04x} {:04x}",
        r.a_alt, r.f_alt, r.bc_alt, r.de_alt, r.hl_alt
    )?;
    writeln!(out, "ix iy        {:04x} {:04x}", r.ix, r.iy)?;
    writeln!(out, "i r          {:02x} {:02x}", r.i, r.r)?;
    writeln!(
        out,
        "interrupts   iff1 {} iff2 {} im {}",
        u8::from(h.iff1),
        u8::from(h.iff2),
        h.interrupt_mode.number()
    )?;
    writeln!(out, "border       {}", h.border)
}

pub fn write_handoff(out: &mut impl Write, handoff: &Handoff, zx: &Spectrum) -> io::Result<()> {
    let cpu = zx.cpu();
    writeln!(out, "started      {} at pc {:#06x}", handoff.hardware.name(), handoff.pc)?;
    writeln!(
        out,
        "interrupts   {} im {}",
        if handoff.interrupts_enabled { "enabled" } else { "disabled" },
        cpu.interrupt_mode.number()
    )?;
    writeln!(
        out,
        "restored     {} bytes, checksum {:#06x}",
        handoff.restored, handoff.restore_checksum
    )?;
    writeln!(
        out,
        "af bc de hl  {:04x} {:04x} {:04x} {:04x}",
        cpu.af, cpu.bc, cpu.de, cpu.hl
    )?;
    writeln!(
        out,
        "alternates   {:04x} {:04x} {:04x} {:04x}",
        cpu.alt.af, cpu.alt.bc, cpu.alt.de, cpu.alt.hl
    )?;
    writeln!(out, "ix iy sp     {:04x} {:04x} {:04x}", cpu.ix, cpu.iy, cpu.sp)?;
    writeln!(out, "i r          {:02x} {:02x}", cpu.i, cpu.r)?;
    writeln!(
        out,
        "paging       7ffd {:#04x} 1ffd {:#04x} bank {}{}",
        zx.port_7ffd(),
        zx.port_1ffd(),
        zx.memory().selected_bank(),
        if zx.paging_locked() { " (locked)" } else { "" }
    )?;
    writeln!(out, "border       {}", zx.border())
}

pub fn write_halt(out: &mut impl Write, zx: &Spectrum) -> io::Result<()> {
    writeln!(out, "state        {:?}", zx.state())?;
    writeln!(out, "border       {}", zx.border())
}

pub fn write_link(out: &mut impl Write, net: &LoopbackNetwork) -> io::Result<()> {
    let link = net.stats();
    let server = net.server().stats();
    writeln!(
        out,
        "link         {} sent, {} received, {} dropped",
        link.client_frames, link.server_frames, link.dropped
    )?;
    writeln!(
        out,
        "server       {} bootp, {} rrq, {} data, {} acks",
        server.bootp_requests, server.read_requests, server.data_sent, server.acks_received
    )
}
