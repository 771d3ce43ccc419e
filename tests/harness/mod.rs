#![allow(dead_code)]

use rand::{Rng, SeedableRng};

use zxboot::net::sim::{BootServer, FaultPlan, LoopbackNetwork, ServerConfig};
use zxboot::snapshot::{
    FormatVersion, HardwareClass, InterruptMode, MemoryImage, SnapshotBuilder, PAGE_LEN,
    RAM_48K_LEN,
};
use zxboot::{BootConfig, BootLoader, FatalError, Handoff, SnapshotHeader, Spectrum};

/// Install a test subscriber once; `RUST_LOG` controls the output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// RAM contents with runs, random stretches and stray RLE markers.
pub fn program_ram(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        let n = rng.gen_range(1..400).min(len - out.len());
        match rng.gen_range(0..5) {
            0 | 1 => out.extend(std::iter::repeat(rng.gen::<u8>()).take(n)),
            2 => out.extend(std::iter::repeat(0xed).take(n.min(4))),
            _ => out.extend((0..n).map(|_| rng.gen::<u8>())),
        }
    }
    out
}

pub fn memory(seed: u64, hardware: HardwareClass) -> MemoryImage {
    match hardware {
        HardwareClass::Spectrum48k => MemoryImage::Flat48k(program_ram(seed, RAM_48K_LEN)),
        HardwareClass::Spectrum128k => MemoryImage::Banked(
            (0..8).map(|b| program_ram(seed ^ (b << 32), PAGE_LEN)).collect(),
        ),
    }
}

pub fn header(version: FormatVersion, hardware: HardwareClass, seed: u64) -> SnapshotHeader {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut h = SnapshotHeader::new(version, hardware);
    h.regs.a = rng.gen();
    h.regs.f = rng.gen();
    h.regs.bc = rng.gen();
    h.regs.de = rng.gen();
    h.regs.hl = rng.gen();
    h.regs.a_alt = rng.gen();
    h.regs.f_alt = rng.gen();
    h.regs.bc_alt = rng.gen();
    h.regs.de_alt = rng.gen();
    h.regs.hl_alt = rng.gen();
    h.regs.ix = rng.gen();
    h.regs.iy = rng.gen();
    h.regs.sp = rng.gen();
    h.regs.pc = rng.gen_range(0x4000..=0xffff);
    h.regs.i = rng.gen();
    h.regs.r = rng.gen();
    h.iff1 = rng.gen();
    h.iff2 = h.iff1;
    let modes = [InterruptMode::Im0, InterruptMode::Im1, InterruptMode::Im2];
    h.interrupt_mode = modes[rng.gen_range(0..3)];
    h.border = rng.gen_range(0..8);
    if hardware == HardwareClass::Spectrum128k {
        // Leave the lock bit clear so the context switch can still page.
        h.port_7ffd = rng.gen::<u8>() & 0x1f;
        h.ay_selected = rng.gen_range(0..16);
        rng.fill(&mut h.ay_registers);
    }
    h
}

pub fn image(header: &SnapshotHeader, memory: &MemoryImage) -> Vec<u8> {
    SnapshotBuilder::new(header.clone())
        .build(memory)
        .expect("image builds")
}

/// Boot `image` through the loopback server and return the machine with the outcome.
pub fn netboot(
    image: Vec<u8>,
    config: &BootConfig,
    faults: FaultPlan,
) -> (Spectrum, Result<Option<Handoff>, FatalError>) {
    let mut server = BootServer::new(ServerConfig::default());
    server.add_file(config.net.default_file.clone(), image);
    let mut net = LoopbackNetwork::new(config.net.mac, server, faults);
    let mut boot = BootLoader::new(config, Spectrum::new());
    let outcome = boot.run_until(&mut net, 0, u64::MAX);
    (boot.into_machine(), outcome)
}
