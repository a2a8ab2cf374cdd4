//! SNES HiROM / extended HiROM address mapping.
//!
//! Pointers stored inside the cartridge are 24-bit bus addresses. The first
//! 4 MiB of ROM is visible at banks `$C0-$FF`; the extended area (4..6 MiB)
//! at banks `$40-$5F`.

use crate::error::{RomError, RomResult};

/// Bus address of ROM offset 0 in the HiROM banks.
pub const HIROM_BASE: u32 = 0xC0_0000;

/// Start of the extended HiROM area, both as offset and as bus address.
pub const EXHIROM_BASE: u32 = 0x40_0000;

/// End (exclusive) of the extended HiROM area.
pub const EXHIROM_END: u32 = 0x60_0000;

/// Convert a ROM offset to the bus address used by in-ROM pointers.
pub fn to_snes_address(offset: usize) -> RomResult<u32> {
    let offset = u32::try_from(offset).map_err(|_| RomError::UnmappedAddress(u32::MAX))?;
    if offset < EXHIROM_BASE {
        Ok(HIROM_BASE + offset)
    } else if offset < EXHIROM_END {
        Ok(offset)
    } else {
        Err(RomError::UnmappedAddress(offset))
    }
}

/// Convert a bus address back to a ROM offset.
pub fn from_snes_address(address: u32) -> RomResult<usize> {
    match address {
        a if (HIROM_BASE..=0xFF_FFFF).contains(&a) => Ok((a - HIROM_BASE) as usize),
        a if (EXHIROM_BASE..EXHIROM_END).contains(&a) => Ok(a as usize),
        a => Err(RomError::UnmappedAddress(a)),
    }
}
