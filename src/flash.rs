use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

use crate::{
    boot_machine::BootError,
    config::BootConfig,
    consts::{SKIP_FLASH, VERIFY_WRITES},
    packet::{PACKET_DATA_BYTES, PADDING_BYTE},
};

/// Largest program unit we can pad a short write up to.
const TAIL_BYTES: usize = 16;

/// Erases and programs the application region, addressed absolutely.
///
/// Holds no state between calls beyond the medium and the memory map.
pub struct AppFlash<F: NorFlash> {
    flash: F,
    flash_base: u32,
    app_base: u32,
    region_len: u32,
}

fn log_kind(kind: NorFlashErrorKind) {
    match kind {
        NorFlashErrorKind::NotAligned => sprkt_log!(info, "not aligned."),
        NorFlashErrorKind::OutOfBounds => sprkt_log!(info, "out of bounds."),
        _ => sprkt_log!(info, "failure."),
    }
}

impl<F: NorFlash> AppFlash<F> {
    pub fn new(flash: F, config: &BootConfig) -> Self {
        Self {
            flash,
            flash_base: config.flash_base,
            app_base: config.app_base(),
            region_len: config.max_fw_length(),
        }
    }

    /// Erase every sector of `[app_base, app_base + max_fw_length)`.
    pub fn erase_application_region(&mut self) -> Result<(), BootError> {
        let sector = F::ERASE_SIZE as u32;
        let start = self.app_base - self.flash_base;

        if start % sector != 0 {
            sprkt_log!(error, "Application base is not sector aligned!");
            return Err(BootError::EraseFailure);
        }

        let sectors = (self.region_len + sector - 1) / sector;

        for idx in 0..sectors {
            let from = start + (idx * sector);

            sprkt_log!(info, "erasing sector {=u32}...", from / sector);

            if SKIP_FLASH {
                sprkt_log!(warn, "Skipped actual erase! Pretend it's good.");
                continue;
            }

            if let Err(e) = self.flash.erase(from, from + sector) {
                sprkt_log!(error, "Erase failed:");
                log_kind(e.kind());
                return Err(BootError::EraseFailure);
            }
        }

        Ok(())
    }

    /// Program `data` at the absolute `address`.
    ///
    /// The range must already be erased. A tail shorter than the medium's
    /// write unit is padded with `0xFF`.
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), BootError> {
        if address < self.app_base {
            sprkt_log!(error, "Refusing to write below the application base!");
            return Err(BootError::WriteFailure);
        }

        let offset = address - self.flash_base;
        let unit = F::WRITE_SIZE;

        sprkt_log!(debug, "Writing {=usize} bytes at {=u32:X}...", data.len(), address);

        if SKIP_FLASH {
            sprkt_log!(warn, "Skipped actual write! Pretend it's good.");
            return Ok(());
        }

        if (offset as usize) % unit != 0 || unit > TAIL_BYTES {
            sprkt_log!(error, "Write is not aligned to the program unit!");
            return Err(BootError::WriteFailure);
        }

        let whole = data.len() - (data.len() % unit);
        let (body, rest) = data.split_at(whole);

        if !body.is_empty() {
            self.flash.write(offset, body).map_err(|e| {
                sprkt_log!(error, "Write failed!");
                log_kind(e.kind());
                BootError::WriteFailure
            })?;
        }

        if !rest.is_empty() {
            let mut tail = [PADDING_BYTE; TAIL_BYTES];
            tail[..rest.len()].copy_from_slice(rest);

            self.flash
                .write(offset + whole as u32, &tail[..unit])
                .map_err(|e| {
                    sprkt_log!(error, "Tail write failed!");
                    log_kind(e.kind());
                    BootError::WriteFailure
                })?;
        }

        if VERIFY_WRITES {
            self.verify(offset, data)?;
        }

        Ok(())
    }

    fn verify(&mut self, offset: u32, data: &[u8]) -> Result<(), BootError> {
        let mut readback = [0u8; PACKET_DATA_BYTES];

        for (idx, chunk) in data.chunks(PACKET_DATA_BYTES).enumerate() {
            let at = offset + (idx * PACKET_DATA_BYTES) as u32;
            let readback = &mut readback[..chunk.len()];

            self.flash.read(at, readback).map_err(|e| {
                sprkt_log!(error, "Readback failed!");
                log_kind(e.kind());
                BootError::WriteFailure
            })?;

            if readback[..] != chunk[..] {
                sprkt_log!(error, "Readback mismatch at offset {=u32:X}!", at);
                return Err(BootError::WriteFailure);
            }
        }

        Ok(())
    }

    pub fn release(self) -> F {
        self.flash
    }
}
