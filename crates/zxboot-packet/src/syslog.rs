//! BSD syslog messages (RFC 3164) in the short form the firmware broadcasts: `<PRI>TAG: MSG`,
//! with no HEADER since there is neither a clock nor a host name to put in it.

pub const SYSLOG_PORT: u16 = 514;

/// Longest datagram a relay has to accept.
pub const MAX_MESSAGE_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

/// Build a message in facility 0. `msg` is cut to fit [`MAX_MESSAGE_LEN`].
pub fn message(severity: Severity, tag: &str, msg: &[u8]) -> Vec<u8> {
    let mut out = format!("<{}>{tag}: ", severity as u8).into_bytes();
    let room = MAX_MESSAGE_LEN.saturating_sub(out.len());
    out.extend_from_slice(&msg[..msg.len().min(room)]);
    out
}
