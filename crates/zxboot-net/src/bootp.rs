//! BOOTP client: one broadcast request, one accepted reply.

use core::net::Ipv4Addr;

use tracing::{debug, trace, warn};
use zxboot_packet::bootp::{BOOTP_CLIENT_PORT, BOOTP_OP_REPLY, BOOTP_SERVER_PORT};
use zxboot_packet::{parse_dotted_quad, BootpMessage, BootpRequestBuilder, MacAddr};

use crate::config::{FileNamePolicy, NetConfig};
use crate::datagram::DatagramEngine;
use crate::error::{FatalError, Result};
use crate::frame_io::{FrameClass, FrameIo};
use crate::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    Requesting,
    Bound,
}

/// Outcome of a successful BOOTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootParams {
    pub host: Ipv4Addr,
    pub boot_server: Ipv4Addr,
    pub file_name: String,
}

pub struct ConfigClient {
    state: ConfigState,
    xid: [u8; 4],
    default_file: String,
    policy: FileNamePolicy,
}

impl ConfigClient {
    pub fn new(config: &NetConfig, xid: [u8; 4]) -> Self {
        Self {
            state: ConfigState::Requesting,
            xid,
            default_file: config.default_file.clone(),
            policy: config.file_name_policy,
        }
    }

    pub fn state(&self) -> ConfigState {
        self.state
    }

    pub fn xid(&self) -> [u8; 4] {
        self.xid
    }

    /// Broadcast the request. Resends are left to the engine's retransmission timer.
    pub fn start<F: FrameIo + ?Sized>(
        &mut self,
        engine: &mut DatagramEngine,
        io: &mut F,
        now_ms: Millis,
    ) -> Result<()> {
        let request = BootpRequestBuilder {
            xid: self.xid,
            chaddr: engine.mac(),
        }
        .to_vec();
        debug!(xid = ?self.xid, "sending BOOTP request");
        engine.send_udp(
            io,
            MacAddr::BROADCAST,
            BOOTP_CLIENT_PORT,
            BOOTP_SERVER_PORT,
            &request,
            FrameClass::Priority,
            now_ms,
        )
    }

    /// Handle a segment received on the BOOTP client port.
    ///
    /// Returns the boot parameters on the transition to [`ConfigState::Bound`]; replies that are
    /// not for us, and anything arriving after the transition, are ignored.
    pub fn handle_reply(
        &mut self,
        engine: &mut DatagramEngine,
        payload: &[u8],
    ) -> Result<Option<BootParams>> {
        if self.state == ConfigState::Bound {
            return Ok(None);
        }
        let Ok(reply) = BootpMessage::parse(payload) else {
            trace!("dropping truncated BOOTP message");
            return Ok(None);
        };
        if reply.op() != BOOTP_OP_REPLY || reply.xid() != self.xid {
            trace!(
                op = reply.op(),
                xid = ?reply.xid(),
                "ignoring BOOTP message for another transaction"
            );
            return Ok(None);
        }
        let host = reply.yiaddr();
        if host.is_unspecified() {
            warn!("BOOTP reply offers no host address, ignoring");
            return Ok(None);
        }

        let boot_server = match reply.sname() {
            [] => reply.siaddr(),
            sname => parse_dotted_quad(sname).map_err(|err| {
                warn!(%err, sname = %String::from_utf8_lossy(sname), "invalid boot server name");
                FatalError::InvalidBootServer
            })?,
        };

        let file_name = match (self.policy, reply.file()) {
            (FileNamePolicy::PreferReply, file) if !file.is_empty() => {
                String::from_utf8_lossy(file).into_owned()
            }
            _ => self.default_file.clone(),
        };

        engine.bind(host, boot_server)?;
        engine.cancel_retransmission();
        self.state = ConfigState::Bound;
        debug!(%host, %boot_server, file = %file_name, "BOOTP bound");
        Ok(Some(BootParams {
            host,
            boot_server,
            file_name,
        }))
    }
}
