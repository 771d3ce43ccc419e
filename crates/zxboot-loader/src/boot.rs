use tracing::{debug, info, warn};
use zxboot_net::{DataSink, FatalError, FrameIo, Millis, NetSession, Result};
use zxboot_snapshot::{DecodeStatus, Evacuation, SnapshotDecoder, StagingArea};

use crate::config::BootConfig;
use crate::error::SnapshotResultExt;
use crate::machine::Machine;
use crate::scratch::RegisterScratch;
use crate::staging::NicStaging;
use crate::switch::{switch_context, Handoff};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStatus {
    Loading,
    Started(Handoff),
}

/// Receives the boot file and writes the image into the machine.
pub struct SnapshotSink<M> {
    machine: M,
    decoder: SnapshotDecoder,
    evacuation: Option<Evacuation>,
    scratch: Option<RegisterScratch>,
    r_adjust: u8,
    restore_chunk: u16,
}

impl<M: Machine> SnapshotSink<M> {
    pub fn new(machine: M, config: &BootConfig) -> Self {
        Self {
            machine,
            decoder: SnapshotDecoder::new(),
            evacuation: Some(Evacuation::new(config.evacuation)),
            scratch: None,
            r_adjust: config.r_adjust,
            restore_chunk: config.restore_chunk,
        }
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut M {
        &mut self.machine
    }

    pub fn into_machine(self) -> M {
        self.machine
    }

    pub fn decoder(&self) -> &SnapshotDecoder {
        &self.decoder
    }

    pub fn scratch(&self) -> Option<&RegisterScratch> {
        self.scratch.as_ref()
    }

    /// Decode `bytes`, parking evacuated bytes in `staging`.
    pub fn feed<S: StagingArea + ?Sized>(
        &mut self,
        staging: &mut S,
        bytes: &[u8],
    ) -> Result<DecodeStatus> {
        let evacuation = self
            .evacuation
            .as_mut()
            .ok_or(FatalError::Internal("image already started"))?;
        let mut target = evacuation.route(&mut self.machine, staging);
        let status = self.decoder.feed(bytes, &mut target).or_incompatible()?;

        if self.scratch.is_none() {
            if let Some(header) = self.decoder.header() {
                self.scratch = Some(RegisterScratch::prepare(header, self.r_adjust));
            }
        }
        Ok(status)
    }

    /// The input has ended; anything short of a complete image is fatal.
    pub fn finish<S: StagingArea + ?Sized>(&mut self, staging: &mut S) -> Result<()> {
        let evacuation = self
            .evacuation
            .as_mut()
            .ok_or(FatalError::Internal("image already started"))?;
        let mut target = evacuation.route(&mut self.machine, staging);
        self.decoder.finish(&mut target).or_incompatible()
    }

    /// Hand the machine over to the decoded image. Only valid once decoding is done.
    pub fn start_image<S: StagingArea + ?Sized>(&mut self, staging: &mut S) -> Result<Handoff> {
        if !self.decoder.is_done() {
            return Err(FatalError::Internal("image started before it was loaded"));
        }
        let (Some(header), Some(scratch)) = (self.decoder.header(), self.scratch) else {
            return Err(FatalError::Internal("image started without a header"));
        };
        let evacuation = self
            .evacuation
            .take()
            .ok_or(FatalError::Internal("image already started"))?;
        let restore = evacuation.into_restore(self.restore_chunk);
        Ok(switch_context(&mut self.machine, staging, header, &scratch, restore))
    }
}

impl<M: Machine> DataSink for SnapshotSink<M> {
    fn on_data<F: FrameIo + ?Sized>(
        &mut self,
        io: &mut F,
        payload: &[u8],
        last: bool,
    ) -> Result<()> {
        if self.decoder.is_done() {
            return Ok(());
        }
        let mut staging = NicStaging::new(io);
        self.feed(&mut staging, payload)?;
        if last {
            self.finish(&mut staging)?;
        }
        Ok(())
    }
}

/// The whole boot: BOOTP, TFTP, decode, hand-off.
///
/// Any fatal error halts the machine with the error's border colour; the error is also
/// returned, and every later poll repeats it.
pub struct BootLoader<M> {
    session: NetSession,
    sink: SnapshotSink<M>,
    started: bool,
    outcome: Option<std::result::Result<Handoff, FatalError>>,
}

impl<M: Machine> BootLoader<M> {
    pub fn new(config: &BootConfig, machine: M) -> Self {
        Self {
            session: NetSession::new(&config.net),
            sink: SnapshotSink::new(machine, config),
            started: false,
            outcome: None,
        }
    }

    pub fn session(&self) -> &NetSession {
        &self.session
    }

    pub fn sink(&self) -> &SnapshotSink<M> {
        &self.sink
    }

    pub fn machine(&self) -> &M {
        self.sink.machine()
    }

    pub fn into_machine(self) -> M {
        self.sink.into_machine()
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.session.next_deadline()
    }

    /// Advance the boot. The first call sends the BOOTP request.
    pub fn poll<F: FrameIo + ?Sized>(&mut self, io: &mut F, now_ms: Millis) -> Result<BootStatus> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone().map(BootStatus::Started);
        }
        match self.step(io, now_ms) {
            Ok(BootStatus::Started(handoff)) => {
                self.outcome = Some(Ok(handoff));
                Ok(BootStatus::Started(handoff))
            }
            Ok(status) => Ok(status),
            Err(err) => {
                warn!(
                    code = %err.code(),
                    colour = err.code().border_colour(),
                    "boot failed: {err}"
                );
                let machine = self.sink.machine_mut();
                machine.disable_interrupts();
                machine.halt(err.code());
                self.outcome = Some(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// Poll on a virtual clock that jumps straight to each retransmission deadline.
    ///
    /// Returns `Ok(None)` if the image has not started by `deadline_ms`, or if nothing is left
    /// that could make progress (no frame awaiting an answer).
    pub fn run_until<F: FrameIo + ?Sized>(
        &mut self,
        io: &mut F,
        start_ms: Millis,
        deadline_ms: Millis,
    ) -> Result<Option<Handoff>> {
        let mut now = start_ms;
        loop {
            if let BootStatus::Started(handoff) = self.poll(io, now)? {
                return Ok(Some(handoff));
            }
            let Some(next) = self.next_deadline() else {
                return Ok(None);
            };
            now = next.max(now + 1);
            if now > deadline_ms {
                return Ok(None);
            }
        }
    }

    fn step<F: FrameIo + ?Sized>(&mut self, io: &mut F, now_ms: Millis) -> Result<BootStatus> {
        if !self.started {
            self.started = true;
            self.session.start(io, now_ms)?;
        }
        self.session.poll(io, &mut self.sink, now_ms)?;
        if !self.sink.decoder().is_done() {
            return Ok(BootStatus::Loading);
        }

        debug!(loaded = self.sink.decoder().loaded_bytes(), "image loaded");
        self.session.cancel_retransmission();
        let handoff = self.sink.start_image(&mut NicStaging::new(io))?;
        info!(pc = handoff.pc, hardware = handoff.hardware.name(), "image started");
        Ok(BootStatus::Started(handoff))
    }
}
