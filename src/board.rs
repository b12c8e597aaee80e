//! `embedded-storage` glue over the STM32G0 HAL's flash driver.

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use sprocket_uartboot::{consts::FLASH_SIZE, sprkt_log};
use stm32g0xx_hal::flash::{self, Error as FlashError, FlashPage, Read, UnlockedFlash, WriteErase};

/// The unlocked internal flash, addressed by offset from `FLASH_START`.
pub struct G0Flash(UnlockedFlash);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct G0FlashError(NorFlashErrorKind);

impl NorFlashError for G0FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        self.0
    }
}

impl From<FlashError> for G0FlashError {
    fn from(e: FlashError) -> Self {
        match e {
            FlashError::Busy => sprkt_log!(info, "busy."),
            FlashError::Illegal => sprkt_log!(info, "illegal."),
            FlashError::EccError => sprkt_log!(info, "ecc err."),
            FlashError::PageOutOfRange => sprkt_log!(info, "page oor."),
            FlashError::Failure => sprkt_log!(info, "failure."),
        };

        match e {
            FlashError::PageOutOfRange => G0FlashError(NorFlashErrorKind::OutOfBounds),
            _ => G0FlashError(NorFlashErrorKind::Other),
        }
    }
}

impl G0Flash {
    pub fn new(flash: UnlockedFlash) -> Self {
        Self(flash)
    }

    fn check(&self, offset: u32, len: usize, align: usize) -> Result<(), G0FlashError> {
        if (offset as usize) % align != 0 || len % align != 0 {
            return Err(G0FlashError(NorFlashErrorKind::NotAligned));
        }
        if offset as usize + len > self.capacity() {
            return Err(G0FlashError(NorFlashErrorKind::OutOfBounds));
        }
        Ok(())
    }
}

impl ErrorType for G0Flash {
    type Error = G0FlashError;
}

impl ReadNorFlash for G0Flash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), G0FlashError> {
        self.check(offset, bytes.len(), Self::READ_SIZE)?;
        Read::read(&self.0, flash::FLASH_START + offset as usize, bytes);
        Ok(())
    }

    fn capacity(&self) -> usize {
        FLASH_SIZE as usize
    }
}

impl NorFlash for G0Flash {
    // Double word programming
    const WRITE_SIZE: usize = 8;
    const ERASE_SIZE: usize = flash::PAGE_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), G0FlashError> {
        if to < from {
            return Err(G0FlashError(NorFlashErrorKind::OutOfBounds));
        }
        self.check(from, (to - from) as usize, Self::ERASE_SIZE)?;

        let first = from as usize / Self::ERASE_SIZE;
        let last = to as usize / Self::ERASE_SIZE;
        for page in first..last {
            self.0.erase_page(FlashPage(page))?;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), G0FlashError> {
        self.check(offset, bytes.len(), Self::WRITE_SIZE)?;
        WriteErase::write(&mut self.0, flash::FLASH_START + offset as usize, bytes)?;
        Ok(())
    }
}

impl G0Flash {
    pub fn release(self) -> UnlockedFlash {
        self.0
    }
}
