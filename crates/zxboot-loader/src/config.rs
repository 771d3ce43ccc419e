use zxboot_net::NetConfig;
use zxboot_snapshot::EvacuationRegion;

/// Everything the boot sequence needs besides the machine itself.
#[derive(Debug, Clone)]
pub struct BootConfig {
    pub net: NetConfig,
    /// Added to the refresh register before it is loaded, to cancel out the instruction fetches
    /// of the final register-load sequence.
    pub r_adjust: u8,
    pub evacuation: EvacuationRegion,
    /// Bytes copied per staging read during the restore step.
    pub restore_chunk: u16,
}

impl BootConfig {
    /// R adjustment for the ROM trampoline on real hardware.
    pub const HARDWARE_R_ADJUST: u8 = 0xef;
    pub const DEFAULT_RESTORE_CHUNK: u16 = 256;

    /// Settings for the ROM running on a real machine.
    pub fn hardware() -> Self {
        Self {
            r_adjust: Self::HARDWARE_R_ADJUST,
            ..Self::default()
        }
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            net: NetConfig::default(),
            r_adjust: 0,
            evacuation: EvacuationRegion::FIRMWARE,
            restore_chunk: Self::DEFAULT_RESTORE_CHUNK,
        }
    }
}
