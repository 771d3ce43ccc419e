use tracing::{debug, info};

use crate::bootp::{BootParams, ConfigClient, ConfigState};
use crate::config::NetConfig;
use crate::datagram::{DatagramEngine, Segment};
use crate::error::Result;
use crate::frame_io::FrameIo;
use crate::tftp::{TransferClient, TransferEvent, TransferState};
use crate::Millis;

/// Consumer of the boot file's contents.
///
/// The frame driver is lent to the sink for the duration of the call so it can use the NIC's
/// buffer memory as scratch space.
pub trait DataSink {
    /// Called once per in-order data segment. `last` marks the short segment that ends the file.
    fn on_data<F: FrameIo + ?Sized>(
        &mut self,
        io: &mut F,
        payload: &[u8],
        last: bool,
    ) -> Result<()>;
}

impl<T: DataSink + ?Sized> DataSink for &mut T {
    fn on_data<F: FrameIo + ?Sized>(
        &mut self,
        io: &mut F,
        payload: &[u8],
        last: bool,
    ) -> Result<()> {
        <T as DataSink>::on_data(&mut **self, io, payload, last)
    }
}

impl DataSink for Vec<u8> {
    fn on_data<F: FrameIo + ?Sized>(
        &mut self,
        _io: &mut F,
        payload: &[u8],
        _last: bool,
    ) -> Result<()> {
        self.extend_from_slice(payload);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Configuring,
    Transferring,
    Complete,
}

/// BOOTP followed by a single TFTP read, driven by polling.
///
/// The session is sans-IO: frames come from the [`FrameIo`] passed to [`NetSession::poll`] and
/// time only advances through the `now_ms` argument.
pub struct NetSession {
    engine: DatagramEngine,
    config_client: ConfigClient,
    transfer: Option<TransferClient>,
    params: Option<BootParams>,
    tftp_prefix: String,
}

impl NetSession {
    pub fn new(config: &NetConfig) -> Self {
        let xid = config
            .xid
            .unwrap_or_else(|| rand::random::<u32>().to_be_bytes());
        Self {
            engine: DatagramEngine::new(config),
            config_client: ConfigClient::new(config, xid),
            transfer: None,
            params: None,
            tftp_prefix: config.tftp_prefix.clone(),
        }
    }

    pub fn engine(&self) -> &DatagramEngine {
        &self.engine
    }

    pub fn params(&self) -> Option<&BootParams> {
        self.params.as_ref()
    }

    pub fn transfer(&self) -> Option<&TransferClient> {
        self.transfer.as_ref()
    }

    pub fn xid(&self) -> [u8; 4] {
        self.config_client.xid()
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.config_client.state(), self.transfer.as_ref().map(|t| t.state())) {
            (ConfigState::Requesting, _) => SessionPhase::Configuring,
            (ConfigState::Bound, Some(TransferState::Complete)) => SessionPhase::Complete,
            (ConfigState::Bound, _) => SessionPhase::Transferring,
        }
    }

    pub fn start<F: FrameIo + ?Sized>(&mut self, io: &mut F, now_ms: Millis) -> Result<()> {
        info!(mac = %self.engine.mac(), "starting network boot");
        self.config_client.start(&mut self.engine, io, now_ms)
    }

    /// Drain every frame the driver has buffered, then run the retransmission timer.
    pub fn poll<F, S>(&mut self, io: &mut F, sink: &mut S, now_ms: Millis) -> Result<SessionPhase>
    where
        F: FrameIo + ?Sized,
        S: DataSink + ?Sized,
    {
        while let Some(frame) = io.poll_received_frame() {
            self.handle_frame(io, sink, &frame, now_ms)?;
        }
        self.engine.poll_timeout(io, now_ms)?;
        Ok(self.phase())
    }

    /// When the retransmission timer next needs servicing.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.engine.next_deadline()
    }

    /// Stop retransmitting; used before handing the machine over to the loaded image.
    pub fn cancel_retransmission(&mut self) {
        self.engine.cancel_retransmission();
    }

    fn handle_frame<F, S>(
        &mut self,
        io: &mut F,
        sink: &mut S,
        frame: &[u8],
        now_ms: Millis,
    ) -> Result<()>
    where
        F: FrameIo + ?Sized,
        S: DataSink + ?Sized,
    {
        let tftp_port = self.transfer.as_ref().map(|t| t.local_port());
        match self.engine.receive(io, frame, tftp_port) {
            None => Ok(()),
            Some(Segment::Bootp { payload }) => {
                let Some(params) = self.config_client.handle_reply(&mut self.engine, payload)?
                else {
                    return Ok(());
                };
                info!(
                    host = %params.host,
                    server = %params.boot_server,
                    file = %params.file_name,
                    "configured"
                );
                let path = format!("{}{}", self.tftp_prefix, params.file_name);
                let mut transfer = TransferClient::new(path, params.boot_server, now_ms);
                transfer.start(&mut self.engine, io, now_ms)?;
                self.transfer = Some(transfer);
                self.params = Some(params);
                Ok(())
            }
            Some(Segment::Tftp { from, payload }) => {
                let Some(transfer) = self.transfer.as_mut() else {
                    return Ok(());
                };
                if let TransferEvent::Data { payload, last } =
                    transfer.handle_segment(&mut self.engine, io, from, payload, now_ms)?
                {
                    sink.on_data(io, payload, last)?;
                    if last {
                        debug!(file = %transfer.file_name(), "transfer complete");
                    }
                }
                Ok(())
            }
        }
    }
}
