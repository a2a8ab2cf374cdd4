//! The in-memory cartridge image.
//!
//! A [`RomImage`] always works in logical (headerless) offsets. If the file
//! it was loaded from carried a copier header, the header bytes are kept
//! aside and re-attached by [`RomImage::to_file_bytes`].

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{RomError, RomResult};
use crate::free_space::FreeSpace;
use crate::header::{has_copier_header, COPIER_HEADER_SIZE};

/// Addressable cartridge bytes plus the free-space tracker for one operation.
pub struct RomImage {
    data: Vec<u8>,
    header: Option<Vec<u8>>,
    free: FreeSpace,
    /// Sizes the image may grow to when an allocation cannot be satisfied.
    growth: Vec<usize>,
}

impl std::fmt::Debug for RomImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RomImage")
            .field("len", &self.data.len())
            .field("header_present", &self.header.is_some())
            .field("free_bytes", &self.free.total())
            .field("growth", &self.growth)
            .finish()
    }
}

impl RomImage {
    /// Allocate an empty (zero-filled) image with nothing marked free.
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0; len],
            header: None,
            free: FreeSpace::new(),
            growth: Vec::new(),
        }
    }

    /// Build an image from file bytes, splitting off a copier header if the
    /// length indicates one.
    pub fn from_bytes(mut bytes: Vec<u8>) -> Self {
        let header = if has_copier_header(bytes.len()) {
            let rest = bytes.split_off(COPIER_HEADER_SIZE);
            Some(std::mem::replace(&mut bytes, rest))
        } else {
            None
        };
        Self {
            data: bytes,
            header,
            free: FreeSpace::new(),
            growth: Vec::new(),
        }
    }

    /// Read an image file from disk.
    pub fn load(path: &Path) -> RomResult<Self> {
        let bytes = std::fs::read(path)?;
        let image = Self::from_bytes(bytes);
        debug!(
            path = %path.display(),
            len = image.len(),
            header = image.header_present(),
            "loaded ROM image"
        );
        Ok(image)
    }

    /// Check the headerless size against the sizes a ROM type accepts.
    pub fn check_size(&self, accepted: &[usize]) -> RomResult<()> {
        if accepted.contains(&self.data.len()) {
            return Ok(());
        }
        let expected = accepted
            .iter()
            .map(|s| format!("{s:#x}"))
            .collect::<Vec<_>>()
            .join(", ");
        Err(RomError::UnexpectedSize {
            actual: self.data.len(),
            expected,
        })
    }

    /// Headerless length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the image has no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether a 512-byte copier header was present on load.
    pub fn header_present(&self) -> bool {
        self.header.is_some()
    }

    /// The headerless cartridge bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// BLAKE3 fingerprint (hex) of the headerless cartridge bytes.
    pub fn fingerprint(&self) -> String {
        hex::encode(blake3::hash(&self.data).as_bytes())
    }

    /// File bytes: the original copier header (if any) followed by the image.
    pub fn to_file_bytes(&self) -> Vec<u8> {
        match &self.header {
            Some(header) => {
                let mut out = Vec::with_capacity(header.len() + self.data.len());
                out.extend_from_slice(header);
                out.extend_from_slice(&self.data);
                out
            }
            None => self.data.clone(),
        }
    }

    fn check_range(&self, offset: usize, length: usize) -> RomResult<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(RomError::OutOfBounds {
                offset,
                length,
                size: self.data.len(),
            }),
        }
    }

    // ---------------------------------------------------------------
    // Byte access
    // ---------------------------------------------------------------

    /// Borrow `length` bytes starting at `offset`.
    pub fn read(&self, offset: usize, length: usize) -> RomResult<&[u8]> {
        self.check_range(offset, length)?;
        Ok(&self.data[offset..offset + length])
    }

    /// Overwrite bytes starting at `offset`.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> RomResult<()> {
        self.check_range(offset, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Borrow everything from `offset` to the end of the image.
    pub fn tail(&self, offset: usize) -> RomResult<&[u8]> {
        if offset > self.data.len() {
            return Err(RomError::OutOfBounds {
                offset,
                length: 0,
                size: self.data.len(),
            });
        }
        Ok(&self.data[offset..])
    }

    pub fn read_u8(&self, offset: usize) -> RomResult<u8> {
        Ok(self.read(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: usize) -> RomResult<u16> {
        let b = self.read(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Little-endian 24-bit value, the width of an in-ROM pointer.
    pub fn read_u24(&self, offset: usize) -> RomResult<u32> {
        let b = self.read(offset, 3)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn write_u8(&mut self, offset: usize, value: u8) -> RomResult<()> {
        self.write(offset, &[value])
    }

    pub fn write_u16(&mut self, offset: usize, value: u16) -> RomResult<()> {
        self.write(offset, &value.to_le_bytes())
    }

    pub fn write_u24(&mut self, offset: usize, value: u32) -> RomResult<()> {
        self.write(offset, &value.to_le_bytes()[..3])
    }

    // ---------------------------------------------------------------
    // Free space
    // ---------------------------------------------------------------

    /// Read-only view of the free-space tracker.
    pub fn free_space(&self) -> &FreeSpace {
        &self.free
    }

    /// Release `[offset, offset + length)` for allocation.
    pub fn free(&mut self, offset: usize, length: usize) -> RomResult<()> {
        if self.check_range(offset, length).is_err() {
            return Err(RomError::InvalidFree {
                offset,
                length,
                reason: format!("outside image of {:#x} bytes", self.data.len()),
            });
        }
        self.free.release(offset, length)?;
        debug!(offset, length, "released ROM region");
        Ok(())
    }

    /// Take `[offset, offset + length)` out of the free pool wherever it is
    /// free. Bytes that are not free are left alone.
    pub fn reserve(&mut self, offset: usize, length: usize) {
        self.free.reserve(offset, length);
    }

    /// Allow [`Self::allocate`] to grow the image through the given sizes.
    ///
    /// Sizes not larger than the current image are ignored.
    pub fn set_growth(&mut self, mut sizes: Vec<usize>) {
        sizes.sort_unstable();
        sizes.dedup();
        self.growth = sizes;
    }

    /// Reserve `length` bytes using best fit and return their offset.
    ///
    /// When nothing fits and growth is armed, the image is expanded to the
    /// next allowed size and the request retried.
    pub fn allocate(&mut self, length: usize) -> RomResult<usize> {
        if length == 0 {
            return Err(RomError::ZeroLengthAllocation);
        }
        loop {
            if let Some(offset) = self.free.take(length) {
                return Ok(offset);
            }
            let current = self.data.len();
            let Some(next) = self.growth.iter().copied().find(|&s| s > current) else {
                return Err(RomError::FreeSpaceExhausted {
                    requested: length,
                    largest: self.free.largest(),
                });
            };
            warn!(from = current, to = next, requested = length, "free space exhausted; expanding image");
            self.expand_to(next)?;
        }
    }

    pub(crate) fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub(crate) fn free_mut(&mut self) -> &mut FreeSpace {
        &mut self.free
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::add_header;

    #[test]
    fn header_is_split_and_restored() {
        let body: Vec<u8> = (0..0x8000u32).map(|i| i as u8).collect();
        let file = add_header(&body).unwrap();
        let image = RomImage::from_bytes(file.clone());
        assert!(image.header_present());
        assert_eq!(image.len(), 0x8000);
        assert_eq!(image.read_u8(0x10).unwrap(), 0x10);
        assert_eq!(image.to_file_bytes(), file);
    }

    #[test]
    fn reads_and_writes_are_bounds_checked() {
        let mut image = RomImage::new(0x100);
        image.write(0xFC, &[1, 2, 3, 4]).unwrap();
        assert_eq!(image.read(0xFC, 4).unwrap(), &[1, 2, 3, 4]);
        assert!(matches!(
            image.write(0xFD, &[0; 4]),
            Err(RomError::OutOfBounds { offset: 0xFD, length: 4, size: 0x100 })
        ));
        assert!(image.read(usize::MAX, 2).is_err());
    }

    #[test]
    fn u24_is_little_endian() {
        let mut image = RomImage::new(8);
        image.write_u24(2, 0xC12345).unwrap();
        assert_eq!(image.read(2, 3).unwrap(), &[0x45, 0x23, 0xC1]);
        assert_eq!(image.read_u24(2).unwrap(), 0xC12345);
    }

    #[test]
    fn allocated_block_is_not_free_until_released() {
        let mut image = RomImage::new(0x1000);
        image.free(0x800, 0x100).unwrap();
        let at = image.allocate(0x40).unwrap();
        assert_eq!(at, 0x800);
        assert!(!image.free_space().overlaps(at, 0x40));
        image.free(at, 0x40).unwrap();
        assert_eq!(image.free_space().total(), 0x100);
    }

    #[test]
    fn allocate_fails_without_growth() {
        let mut image = RomImage::new(0x1000);
        image.free(0x800, 0x10).unwrap();
        let err = image.allocate(0x20).unwrap_err();
        assert!(matches!(
            err,
            RomError::FreeSpaceExhausted { requested: 0x20, largest: 0x10 }
        ));
        assert!(matches!(image.allocate(0), Err(RomError::ZeroLengthAllocation)));
    }

    #[test]
    fn allocate_grows_when_armed() {
        let mut image = RomImage::new(0x1000);
        image.set_growth(vec![0x2000]);
        let at = image.allocate(0x100).unwrap();
        assert_eq!(at, 0x1000);
        assert_eq!(image.len(), 0x2000);
        assert_eq!(image.free_space().total(), 0x1000 - 0x100);
    }

    #[test]
    fn free_outside_image_is_rejected() {
        let mut image = RomImage::new(0x100);
        assert!(matches!(image.free(0xF0, 0x20), Err(RomError::InvalidFree { .. })));
    }

    #[test]
    fn check_size_lists_expected_sizes() {
        let image = RomImage::new(0x1000);
        assert!(image.check_size(&[0x1000]).is_ok());
        let err = image.check_size(&[0x2000, 0x4000]).unwrap_err();
        assert!(err.to_string().contains("0x2000, 0x4000"));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.sfc");
        std::fs::write(&path, vec![0xAB; 0x8000]).unwrap();
        let image = RomImage::load(&path).unwrap();
        assert!(!image.header_present());
        assert_eq!(image.fingerprint().len(), 64);
    }
}
