//! Copier header transforms.
//!
//! Some dump tools prefix the cartridge with a 512-byte header. Adding and
//! stripping it is a pure byte transform that never touches cartridge data.

use crate::error::{RomError, RomResult};

/// Size of a copier header in bytes.
pub const COPIER_HEADER_SIZE: usize = 512;

/// Cartridge images are always a whole number of 32 KiB banks.
const BANK_SIZE: usize = 0x8000;

/// Returns `true` if a file of `len` bytes carries a copier header.
pub fn has_copier_header(len: usize) -> bool {
    len % BANK_SIZE == COPIER_HEADER_SIZE
}

/// Build the header a copier would write for an image of `image_len` bytes.
///
/// Only the size field (8 KiB units, little-endian) is populated.
pub fn copier_header_for(image_len: usize) -> [u8; COPIER_HEADER_SIZE] {
    let mut header = [0u8; COPIER_HEADER_SIZE];
    let units = (image_len / 0x2000) as u16;
    header[0..2].copy_from_slice(&units.to_le_bytes());
    header
}

/// Prepend a copier header. Fails if the image already has one.
pub fn add_header(image: &[u8]) -> RomResult<Vec<u8>> {
    if has_copier_header(image.len()) {
        return Err(RomError::Header("image already has a copier header".into()));
    }
    let mut out = Vec::with_capacity(image.len() + COPIER_HEADER_SIZE);
    out.extend_from_slice(&copier_header_for(image.len()));
    out.extend_from_slice(image);
    Ok(out)
}

/// Remove a copier header. Fails if the length does not indicate one.
pub fn strip_header(image: &[u8]) -> RomResult<Vec<u8>> {
    if !has_copier_header(image.len()) {
        return Err(RomError::Header(format!(
            "image of {:#x} bytes has no copier header",
            image.len()
        )));
    }
    Ok(image[COPIER_HEADER_SIZE..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_header_by_length() {
        assert!(has_copier_header(0x300200));
        assert!(!has_copier_header(0x300000));
        assert!(!has_copier_header(0x300100));
    }

    #[test]
    fn add_then_strip_restores_image() {
        let image: Vec<u8> = (0..0x10000u32).map(|i| (i % 251) as u8).collect();
        let with = add_header(&image).unwrap();
        assert_eq!(with.len(), image.len() + COPIER_HEADER_SIZE);
        assert_eq!(u16::from_le_bytes([with[0], with[1]]), 8);
        assert_eq!(strip_header(&with).unwrap(), image);
    }

    #[test]
    fn refuses_double_header_and_missing_header() {
        let image = vec![0u8; 0x8000];
        let with = add_header(&image).unwrap();
        assert!(matches!(add_header(&with), Err(RomError::Header(_))));
        assert!(matches!(strip_header(&image), Err(RomError::Header(_))));
    }
}
