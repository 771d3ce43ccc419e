use zxboot_net::FrameIo;
use zxboot_packet::Checksum;
use zxboot_snapshot::StagingArea;

/// The network controller's spare SRAM, reached through the frame driver.
pub struct NicStaging<'a, F: ?Sized> {
    io: &'a mut F,
}

impl<'a, F: FrameIo + ?Sized> NicStaging<'a, F> {
    pub fn new(io: &'a mut F) -> Self {
        Self { io }
    }
}

impl<F: FrameIo + ?Sized> StagingArea for NicStaging<'_, F> {
    fn write_staging(&mut self, offset: u16, bytes: &[u8]) {
        self.io.write_bytes(offset, bytes);
    }

    fn read_staging(&mut self, offset: u16, buf: &mut [u8]) -> Checksum {
        self.io.read_bytes(offset, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zxboot_net::{NetConfig, SramFrameIo};

    #[test]
    fn staged_bytes_land_in_sram() {
        let mut io = SramFrameIo::new(NetConfig::DEFAULT_MAC);
        let mut staging = NicStaging::new(&mut io);
        staging.write_staging(0x1800, &[1, 2, 3, 4]);
        let mut buf = [0u8; 4];
        let sum = staging.read_staging(0x1800, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(sum.fold(), 0x0102 + 0x0304);
        assert_eq!(&io.sram()[0x1800..0x1804], &[1, 2, 3, 4]);
    }
}
