pub const SKIP_FLASH: bool = cfg!(feature = "skip-flash");
pub const FAIL_CLOSED: bool = cfg!(feature = "fail-closed");
pub const VERIFY_WRITES: bool = cfg!(feature = "verify-writes");

// NOTE: Make sure these are in sync with memory.x! The bootloader
// owns the first BOOTLOADER_SIZE bytes, the application gets the rest.
pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FLASH_SIZE: u32 = 64 * 1024;
pub const BOOTLOADER_SIZE: u32 = 0x8000;

pub const DEVICE_ID: u8 = 0x42;

/// The SysTick driver ticks once per millisecond
pub const TICKS_PER_SECOND: u32 = 1_000;
pub const DEFAULT_TIMEOUT_TICKS: u32 = 5 * TICKS_PER_SECOND;

pub const SHUTDOWN_DELAY_MS: u32 = 500;

pub const BAUD_RATE: u32 = 115_200;
pub const CORE_CLOCK_HZ: u32 = 64_000_000;

/// Frames the link layer will hold before the state machine reads them
pub const RX_QUEUE_DEPTH: usize = 8;
