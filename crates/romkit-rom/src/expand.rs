//! Growing a cartridge image.
//!
//! New bytes are zero-filled and handed to the free-space tracker. Crossing
//! the 4 MiB boundary switches the cartridge to the extended HiROM map, which
//! needs the internal header bank mirrored into the extended area.

use tracing::info;

use crate::address::{EXHIROM_BASE, EXHIROM_END};
use crate::error::{RomError, RomResult};
use crate::image::RomImage;

/// Offset of the bank holding the internal cartridge header.
const HEADER_BANK: usize = 0x8000;
const HEADER_BANK_LEN: usize = 0x8000;
/// Where the header bank is mirrored in an extended HiROM image.
const HEADER_MIRROR: usize = EXHIROM_BASE as usize + HEADER_BANK;

/// Internal header: map mode and ROM size bytes.
const MAP_MODE_OFFSET: usize = 0xFFD5;
const ROM_SIZE_OFFSET: usize = 0xFFD7;
const EXHIROM_MAP_MODE: u8 = 0x25;
const EXHIROM_SIZE_CODE: u8 = 0x0D;

impl RomImage {
    /// Grow the image to `target` bytes and release the new area.
    pub fn expand_to(&mut self, target: usize) -> RomResult<()> {
        let from = self.len();
        if target <= from || target > EXHIROM_END as usize {
            return Err(RomError::InvalidExpansion { from, to: target });
        }

        self.data_mut().resize(target, 0);
        self.free_mut().release(from, target - from)?;

        let crosses_4mib = from <= EXHIROM_BASE as usize
            && target >= HEADER_MIRROR + HEADER_BANK_LEN
            && from >= HEADER_BANK + HEADER_BANK_LEN;
        if crosses_4mib {
            let bank = self.read(HEADER_BANK, HEADER_BANK_LEN)?.to_vec();
            self.write(HEADER_MIRROR, &bank)?;
            self.write_u8(MAP_MODE_OFFSET, EXHIROM_MAP_MODE)?;
            self.write_u8(ROM_SIZE_OFFSET, EXHIROM_SIZE_CODE)?;
            self.free_mut().reserve(HEADER_MIRROR, HEADER_BANK_LEN);
        }

        info!(from, to = target, extended = crosses_4mib, "expanded ROM image");
        Ok(())
    }

    /// Release everything past `base`, the size of the unexpanded image.
    ///
    /// Used on images that were expanded and saved earlier, whose padding
    /// is not known to the tracker after a reload. In an extended HiROM
    /// image the header mirror stays reserved. Returns the bytes released.
    pub fn release_expansion(&mut self, base: usize) -> RomResult<usize> {
        let len = self.len();
        if base >= len {
            return Ok(0);
        }
        self.free(base, len - base)?;
        let mut released = len - base;
        if base <= EXHIROM_BASE as usize && len >= HEADER_MIRROR + HEADER_BANK_LEN {
            self.free_mut().reserve(HEADER_MIRROR, HEADER_BANK_LEN);
            released -= HEADER_BANK_LEN;
        }
        info!(base, len, released, "released expansion area");
        Ok(released)
    }
}
