//! Pointer tables and region bookkeeping shared by relocating modules.

use romkit_rom::{from_snes_address, to_snes_address, RomImage, RomResult};
use tracing::debug;

/// A pointer that must be rewritten after a resource moved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerUpdate {
    /// ROM offset of the 3-byte pointer.
    pub pointer_offset: usize,
    /// New ROM offset of the referenced data.
    pub target_offset: usize,
    /// `table/index` of the relocated resource.
    pub resource_id: String,
}

impl PointerUpdate {
    /// Store the target as a little-endian SNES address.
    pub fn apply(&self, rom: &mut RomImage) -> RomResult<()> {
        let address = to_snes_address(self.target_offset)?;
        rom.write_u24(self.pointer_offset, address)?;
        debug!(
            pointer = self.pointer_offset,
            target = self.target_offset,
            resource = %self.resource_id,
            "rewrote pointer"
        );
        Ok(())
    }
}

/// ROM offset referenced by the pointer stored at `pointer_offset`.
pub fn read_pointer(rom: &RomImage, pointer_offset: usize) -> RomResult<usize> {
    from_snes_address(rom.read_u24(pointer_offset)?)
}

/// Half-open byte range `[start, end)`.
pub type Region = (usize, usize);

fn merge(mut regions: Vec<Region>) -> Vec<Region> {
    regions.retain(|&(s, e)| e > s);
    regions.sort_unstable();
    let mut merged: Vec<Region> = Vec::with_capacity(regions.len());
    for (s, e) in regions {
        match merged.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => merged.push((s, e)),
        }
    }
    merged
}

/// Parts of `released` not covered by any of `kept`, merged and sorted.
pub(crate) fn subtract(released: Vec<Region>, kept: &[Region]) -> Vec<Region> {
    let kept = merge(kept.to_vec());
    let mut out = Vec::new();
    for (mut s, e) in merge(released) {
        for &(ks, ke) in &kept {
            if ke <= s || ks >= e {
                continue;
            }
            if ks > s {
                out.push((s, ks));
            }
            s = s.max(ke);
            if s >= e {
                break;
            }
        }
        if s < e {
            out.push((s, e));
        }
    }
    out
}

/// Release the storage of relocated entries, except bytes still used by
/// entries that stay put. Returns the number of bytes released.
pub(crate) fn release_regions(
    rom: &mut RomImage,
    released: Vec<Region>,
    kept: &[Region],
) -> RomResult<usize> {
    let mut total = 0;
    for (s, e) in subtract(released, kept) {
        rom.free(s, e - s)?;
        total += e - s;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_writes_hirom_address() {
        let mut rom = RomImage::new(0x2_0000);
        let update = PointerUpdate {
            pointer_offset: 0x100,
            target_offset: 0x1_2345,
            resource_id: "t/000".into(),
        };
        update.apply(&mut rom).unwrap();
        assert_eq!(rom.read(0x100, 3).unwrap(), [0x45, 0x23, 0xC1]);
        assert_eq!(read_pointer(&rom, 0x100).unwrap(), 0x1_2345);
    }

    #[test]
    fn pointer_outside_rom_map_is_rejected() {
        let mut rom = RomImage::new(0x1000);
        rom.write_u24(0, 0x7E_0000).unwrap();
        assert!(read_pointer(&rom, 0).is_err());
    }

    #[test]
    fn subtract_keeps_shared_bytes() {
        // Two relocated entries overlap; a kept entry shares the tail of one.
        let out = subtract(vec![(10, 20), (15, 30), (40, 50)], &[(25, 35), (40, 42)]);
        assert_eq!(out, [(10, 25), (42, 50)]);
    }

    #[test]
    fn subtract_with_nothing_kept_merges() {
        assert_eq!(subtract(vec![(5, 8), (0, 5)], &[]), [(0, 8)]);
        assert!(subtract(vec![(0, 4)], &[(0, 4)]).is_empty());
    }

    #[test]
    fn release_frees_each_piece_once() {
        let mut rom = RomImage::new(0x100);
        let freed = release_regions(&mut rom, vec![(0x10, 0x20), (0x10, 0x20)], &[]).unwrap();
        assert_eq!(freed, 0x10);
        assert_eq!(rom.free_space().total(), 0x10);
    }
}
