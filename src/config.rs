use crate::consts::{
    BOOTLOADER_SIZE,
    DEFAULT_TIMEOUT_TICKS,
    DEVICE_ID,
    FLASH_BASE,
    FLASH_SIZE,
};

/// Memory map and protocol parameters for one bootloader session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    pub flash_base: u32,
    pub flash_size: u32,
    pub bootloader_size: u32,
    pub device_id: u8,
    /// Budget for every state that waits on the host, in timer ticks
    pub response_timeout: u32,
}

impl BootConfig {
    pub const fn new() -> Self {
        Self {
            flash_base: FLASH_BASE,
            flash_size: FLASH_SIZE,
            bootloader_size: BOOTLOADER_SIZE,
            device_id: DEVICE_ID,
            response_timeout: DEFAULT_TIMEOUT_TICKS,
        }
    }

    /// First address of the application image.
    pub const fn app_base(&self) -> u32 {
        self.flash_base + self.bootloader_size
    }

    /// Largest image the host may announce.
    pub const fn max_fw_length(&self) -> u32 {
        self.flash_size - self.bootloader_size
    }
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::new()
    }
}
