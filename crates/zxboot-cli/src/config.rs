use std::env;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use zxboot_loader::BootConfig;
use zxboot_net::FileNamePolicy;
use zxboot_packet::MacAddr;

/// Boot settings as read from a JSON file. Every field is optional; missing ones keep the
/// firmware defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "snake_case")]
pub struct FileConfig {
    pub mac: Option<String>,
    pub default_file: Option<String>,
    pub file_name_policy: Option<PolicyName>,
    /// Server directory for requested files; `""` requests bare names.
    pub tftp_prefix: Option<String>,
    /// Eight hex digits.
    pub xid: Option<String>,
    pub initial_retransmit_timeout_ms: Option<u64>,
    pub max_retransmit_timeout_ms: Option<u64>,
    pub max_retransmissions: Option<u32>,
    /// Use the refresh-register adjustment of the ROM on real hardware.
    pub hardware_r_adjust: Option<bool>,
    pub r_adjust: Option<u8>,
    pub restore_chunk: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyName {
    PreferReply,
    ConfiguredOnly,
}

impl From<PolicyName> for FileNamePolicy {
    fn from(name: PolicyName) -> Self {
        match name {
            PolicyName::PreferReply => FileNamePolicy::PreferReply,
            PolicyName::ConfiguredOnly => FileNamePolicy::ConfiguredOnly,
        }
    }
}

impl FromStr for PolicyName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prefer-reply" => Ok(Self::PreferReply),
            "configured-only" => Ok(Self::ConfiguredOnly),
            other => bail!(
                "unknown file name policy {other:?} (expected prefer-reply or configured-only)"
            ),
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config file: {}", path.display()))
    }

    /// Optional file, then `ZXBOOT_*` variables on top.
    pub fn from_env(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| env::var(key).ok())?;
        Ok(cfg)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("ZXBOOT_MAC") {
            self.mac = Some(v);
        }
        if let Some(v) = var("ZXBOOT_DEFAULT_FILE") {
            self.default_file = Some(v);
        }
        if let Some(v) = var("ZXBOOT_FILE_NAME_POLICY") {
            self.file_name_policy = Some(v.parse()?);
        }
        if let Some(v) = var("ZXBOOT_TFTP_PREFIX") {
            self.tftp_prefix = Some(v);
        }
        if let Some(v) = var("ZXBOOT_XID") {
            self.xid = Some(v);
        }
        if let Some(v) = parse_var(&var, "ZXBOOT_INITIAL_RETRANSMIT_TIMEOUT_MS")? {
            self.initial_retransmit_timeout_ms = Some(v);
        }
        if let Some(v) = parse_var(&var, "ZXBOOT_MAX_RETRANSMIT_TIMEOUT_MS")? {
            self.max_retransmit_timeout_ms = Some(v);
        }
        if let Some(v) = parse_var(&var, "ZXBOOT_MAX_RETRANSMISSIONS")? {
            self.max_retransmissions = Some(v);
        }
        if let Some(v) = parse_var(&var, "ZXBOOT_HARDWARE_R_ADJUST")? {
            self.hardware_r_adjust = Some(v);
        }
        if let Some(v) = parse_var(&var, "ZXBOOT_RESTORE_CHUNK")? {
            self.restore_chunk = Some(v);
        }
        Ok(())
    }

    pub fn into_boot_config(self) -> Result<BootConfig> {
        let mut cfg = if self.hardware_r_adjust.unwrap_or(false) {
            BootConfig::hardware()
        } else {
            BootConfig::default()
        };
        if let Some(r_adjust) = self.r_adjust {
            cfg.r_adjust = r_adjust;
        }
        if let Some(chunk) = self.restore_chunk {
            if chunk == 0 {
                bail!("restore_chunk must be non-zero");
            }
            cfg.restore_chunk = chunk;
        }

        let net = &mut cfg.net;
        if let Some(mac) = &self.mac {
            net.mac = mac
                .parse::<MacAddr>()
                .map_err(|e| anyhow!("invalid mac {mac:?}: {e}"))?;
        }
        if let Some(file) = self.default_file {
            net.default_file = file;
        }
        if let Some(policy) = self.file_name_policy {
            net.file_name_policy = policy.into();
        }
        if let Some(prefix) = self.tftp_prefix {
            net.tftp_prefix = prefix;
        }
        if let Some(xid) = &self.xid {
            net.xid = Some(parse_xid(xid)?);
        }
        if let Some(ms) = self.initial_retransmit_timeout_ms {
            net.initial_retransmit_timeout_ms = ms;
        }
        if let Some(ms) = self.max_retransmit_timeout_ms {
            net.max_retransmit_timeout_ms = ms;
        }
        if net.initial_retransmit_timeout_ms == 0
            || net.max_retransmit_timeout_ms < net.initial_retransmit_timeout_ms
        {
            bail!(
                "retransmit timeouts must satisfy 0 < initial ({}) <= max ({})",
                net.initial_retransmit_timeout_ms,
                net.max_retransmit_timeout_ms
            );
        }
        if self.max_retransmissions.is_some() {
            net.max_retransmissions = self.max_retransmissions;
        }
        Ok(cfg)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|v| v.trim().parse::<T>().map_err(|e| anyhow!("invalid {key}={v:?}: {e}")))
        .transpose()
}

/// Transaction id as eight hex digits, optionally prefixed with `0x`.
pub fn parse_xid(s: &str) -> Result<[u8; 4]> {
    let digits = s.trim().trim_start_matches("0x");
    if digits.len() != 8 {
        bail!("xid must be eight hex digits, got {s:?}");
    }
    let value = u32::from_str_radix(digits, 16).with_context(|| format!("invalid xid {s:?}"))?;
    Ok(value.to_be_bytes())
}
