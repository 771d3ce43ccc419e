//! Log records forwarded as syslog datagrams, one per event.

use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;
use zxboot_packet::syslog::{self, Severity};

const TAG: &str = "zxboot";

/// [`MakeWriter`] for a `fmt` layer: every formatted event goes out as one datagram to `dst`,
/// which may be a broadcast address.
#[derive(Debug, Clone)]
pub struct SyslogWriter {
    socket: Arc<UdpSocket>,
    dst: SocketAddr,
}

impl SyslogWriter {
    pub fn connect(dst: SocketAddr) -> io::Result<Self> {
        let socket = if dst.is_ipv4() {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
            socket.set_broadcast(true)?;
            socket
        } else {
            UdpSocket::bind((Ipv6Addr::UNSPECIFIED, 0))?
        };
        Ok(Self {
            socket: Arc::new(socket),
            dst,
        })
    }

    fn line(&self, severity: Severity) -> SyslogLine<'_> {
        SyslogLine {
            writer: self,
            severity,
            buf: Vec::new(),
        }
    }
}

fn severity(level: &Level) -> Severity {
    match *level {
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warning,
        Level::INFO => Severity::Informational,
        Level::DEBUG | Level::TRACE => Severity::Debug,
    }
}

impl<'a> MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogLine<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        self.line(Severity::Informational)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.line(severity(meta.level()))
    }
}

/// Collects one formatted event and sends it when dropped.
pub struct SyslogLine<'a> {
    writer: &'a SyslogWriter,
    severity: Severity,
    buf: Vec<u8>,
}

impl Write for SyslogLine<'_> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogLine<'_> {
    fn drop(&mut self) {
        let text = self.buf.strip_suffix(b"\n").unwrap_or(&self.buf);
        if text.is_empty() {
            return;
        }
        let datagram = syslog::message(self.severity, TAG, text);
        // Best effort.
        let _ = self.writer.socket.send_to(&datagram, self.writer.dst);
    }
}
