#![forbid(unsafe_code)]

mod config;
mod report;
mod syslog;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use zxboot_loader::{BootLoader, SnapshotSink, Spectrum};
use zxboot_net::sim::{BootServer, FaultPlan, LoopbackNetwork, ServerConfig};
use zxboot_net::{Millis, SRAM_LEN};
use zxboot_snapshot::{DecodeStatus, MemoryImage, SnapshotDirectory};

use crate::config::{parse_xid, FileConfig};
use crate::syslog::SyslogWriter;

#[derive(Debug, Parser)]
#[command(name = "zxboot", version, about = "Inspect, load and netboot ZX Spectrum .z80 snapshots")]
struct Args {
    /// Also send log records as syslog datagrams to this address (e.g. 255.255.255.255:514).
    ///
    /// Environment variable: `ZXBOOT_SYSLOG`.
    #[arg(long, global = true, env = "ZXBOOT_SYSLOG")]
    syslog: Option<SocketAddr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the header and page table of a snapshot.
    Inspect { file: PathBuf },

    /// Decode a snapshot into a host-modelled Spectrum and start it.
    Load {
        file: PathBuf,

        /// Bytes handed to the decoder per call, like one TFTP data block.
        #[arg(long, default_value_t = 512)]
        segment: usize,

        /// Write the loaded RAM to a file (48K flat, or the eight 128K banks in order).
        #[arg(long)]
        dump_ram: Option<PathBuf>,

        /// JSON boot settings.
        ///
        /// Environment variable: `ZXBOOT_CONFIG`.
        #[arg(long, env = "ZXBOOT_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Boot a snapshot over the simulated BOOTP/TFTP link.
    Netboot {
        file: PathBuf,

        /// JSON boot settings.
        ///
        /// Environment variable: `ZXBOOT_CONFIG`.
        #[arg(long, env = "ZXBOOT_CONFIG")]
        config: Option<PathBuf>,

        /// Drop every N-th frame in each direction.
        #[arg(long)]
        drop_every: Option<u32>,

        /// Fixed BOOTP transaction id (eight hex digits).
        #[arg(long, value_parser = parse_xid)]
        xid: Option<[u8; 4]>,

        /// Give up after this much simulated time.
        #[arg(long, default_value_t = 600_000)]
        timeout_ms: Millis,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.syslog)?;

    match args.command {
        Command::Inspect { file } => inspect(&file),
        Command::Load {
            file,
            segment,
            dump_ram,
            config,
        } => load(&file, segment, dump_ram.as_deref(), config.as_deref()),
        Command::Netboot {
            file,
            config,
            drop_every,
            xid,
            timeout_ms,
        } => netboot(&file, config.as_deref(), drop_every, xid, timeout_ms),
    }
}

fn init_logging(syslog: Option<SocketAddr>) -> Result<()> {
    let syslog = syslog
        .map(|dst| {
            SyslogWriter::connect(dst)
                .with_context(|| format!("failed to open syslog socket for {dst}"))
        })
        .transpose()?;
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(syslog.map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .without_time()
                .with_level(false)
        }))
        .init();
    Ok(())
}

fn read_snapshot(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read snapshot: {}", path.display()))
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = read_snapshot(path)?;
    let dir = SnapshotDirectory::scan(&bytes)
        .with_context(|| format!("not a usable snapshot: {}", path.display()))?;
    let mut out = std::io::stdout().lock();
    report::write_directory(&mut out, &dir)?;
    Ok(())
}

fn load(path: &Path, segment: usize, dump_ram: Option<&Path>, config: Option<&Path>) -> Result<()> {
    if segment == 0 {
        bail!("--segment must be non-zero");
    }
    let cfg = FileConfig::from_env(config)?.into_boot_config()?;
    let bytes = read_snapshot(path)?;

    let mut staging = vec![0u8; SRAM_LEN];
    let mut sink = SnapshotSink::new(Spectrum::new(), &cfg);
    for chunk in bytes.chunks(segment) {
        if sink.feed(&mut staging, chunk)? == DecodeStatus::Done {
            break;
        }
    }
    sink.finish(&mut staging)?;
    info!(loaded = sink.decoder().loaded_bytes(), "snapshot decoded");

    let handoff = sink.start_image(&mut staging)?;
    let zx = sink.into_machine();
    let mut out = std::io::stdout().lock();
    report::write_handoff(&mut out, &handoff, &zx)?;

    if let Some(dump) = dump_ram {
        write_ram(dump, &MemoryImage::from_memory(zx.memory(), handoff.hardware))?;
        info!(path = %dump.display(), "RAM written");
    }
    Ok(())
}

fn write_ram(path: &Path, image: &MemoryImage) -> Result<()> {
    let f = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    match image {
        MemoryImage::Flat48k(ram) => w.write_all(ram)?,
        MemoryImage::Banked(banks) => {
            for bank in banks {
                w.write_all(bank)?;
            }
        }
    }
    w.flush()?;
    Ok(())
}

fn netboot(
    path: &Path,
    config: Option<&Path>,
    drop_every: Option<u32>,
    xid: Option<[u8; 4]>,
    timeout_ms: Millis,
) -> Result<()> {
    let mut cfg = FileConfig::from_env(config)?.into_boot_config()?;
    let bytes = read_snapshot(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("snapshot path has no usable file name: {}", path.display()))?
        .to_string();
    cfg.net.default_file = name.clone();
    if xid.is_some() {
        cfg.net.xid = xid;
    }

    let mut server = BootServer::new(ServerConfig {
        root: cfg.net.tftp_prefix.clone(),
        ..ServerConfig::default()
    });
    server.add_file(name, bytes);
    let faults = FaultPlan {
        drop_every_nth_reply: drop_every,
        drop_every_nth_request: drop_every,
    };
    let mut net = LoopbackNetwork::new(cfg.net.mac, server, faults);
    let mut boot = BootLoader::new(&cfg, Spectrum::new());

    let result = boot.run_until(&mut net, 0, timeout_ms);
    let mut out = std::io::stdout().lock();
    report::write_link(&mut out, &net)?;
    match result {
        Ok(Some(handoff)) => {
            report::write_handoff(&mut out, &handoff, boot.machine())?;
            Ok(())
        }
        Ok(None) => bail!("no hand-off within {timeout_ms} ms of simulated time"),
        Err(err) => {
            report::write_halt(&mut out, boot.machine())?;
            Err(err).context("boot failed")
        }
    }
}
