use zxboot_packet::MacAddr;

use crate::Millis;

/// How the boot file name offered in a BOOTP reply relates to the configured default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileNamePolicy {
    /// A non-empty `file` field in the reply replaces the default.
    #[default]
    PreferReply,
    /// Always request the configured default; the reply's `file` field is ignored.
    ConfiguredOnly,
}

#[derive(Debug, Clone)]
pub struct NetConfig {
    pub mac: MacAddr,

    /// File requested when the BOOTP reply does not name one (or is ignored by policy).
    pub default_file: String,
    pub file_name_policy: FileNamePolicy,
    /// Server directory put in front of every requested file name.
    pub tftp_prefix: String,

    /// Fixed BOOTP transaction id. `None` picks a random id per session.
    pub xid: Option<[u8; 4]>,

    /// Retransmission timeout for the first resend of a priority frame. Doubles after each
    /// resend, up to `max_retransmit_timeout_ms`.
    pub initial_retransmit_timeout_ms: Millis,
    pub max_retransmit_timeout_ms: Millis,

    /// Number of resends of a single priority frame before giving up with
    /// [`crate::FatalError::NoResponse`]. `None` retries forever.
    pub max_retransmissions: Option<u32>,
}

impl NetConfig {
    pub const DEFAULT_MAC: MacAddr = MacAddr([0xba, 0xdb, 0xad, 0xc0, 0xff, 0xee]);
    pub const DEFAULT_FILE: &'static str = "snapshots.lst";
    pub const DEFAULT_TFTP_PREFIX: &'static str = "speccyboot/";
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            mac: Self::DEFAULT_MAC,
            default_file: Self::DEFAULT_FILE.to_string(),
            file_name_policy: FileNamePolicy::default(),
            tftp_prefix: Self::DEFAULT_TFTP_PREFIX.to_string(),
            xid: None,
            initial_retransmit_timeout_ms: 2_560,
            max_retransmit_timeout_ms: 20_480,
            max_retransmissions: None,
        }
    }
}
