use core::net::Ipv4Addr;

use crate::error::{FatalError, Result};

/// Host and boot-server addresses learned from BOOTP.
///
/// Starts unset and can be set exactly once; there is no re-acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddressConfig {
    bound: Option<(Ipv4Addr, Ipv4Addr)>,
}

impl AddressConfig {
    pub fn is_set(&self) -> bool {
        self.bound.is_some()
    }

    pub fn host(&self) -> Option<Ipv4Addr> {
        self.bound.map(|(host, _)| host)
    }

    pub fn boot_server(&self) -> Option<Ipv4Addr> {
        self.bound.map(|(_, server)| server)
    }

    pub(crate) fn set(&mut self, host: Ipv4Addr, boot_server: Ipv4Addr) -> Result<()> {
        if self.bound.is_some() {
            return Err(FatalError::Internal("address configuration already set"));
        }
        if host.is_unspecified() {
            return Err(FatalError::Internal("host address must be non-zero"));
        }
        self.bound = Some((host, boot_server));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_once() {
        let mut cfg = AddressConfig::default();
        assert!(!cfg.is_set());
        assert_eq!(cfg.host(), None);

        let host = Ipv4Addr::new(192, 168, 0, 17);
        let server = Ipv4Addr::new(192, 168, 0, 1);
        cfg.set(host, server).unwrap();
        assert_eq!(cfg.host(), Some(host));
        assert_eq!(cfg.boot_server(), Some(server));

        assert!(cfg.set(Ipv4Addr::new(10, 0, 0, 2), server).is_err());
        assert_eq!(cfg.host(), Some(host));
    }

    #[test]
    fn unspecified_host_is_rejected() {
        let mut cfg = AddressConfig::default();
        assert!(cfg.set(Ipv4Addr::UNSPECIFIED, Ipv4Addr::new(10, 0, 0, 1)).is_err());
        assert!(!cfg.is_set());
    }
}
