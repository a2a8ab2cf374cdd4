//! Free-space tracking for a fixed address space.
//!
//! [`FreeSpace`] keeps a `BTreeMap` of block start to block length. Blocks
//! never overlap and adjacent blocks are always coalesced, so the map is the
//! canonical description of which ROM bytes may be handed out.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{RomError, RomResult};

/// A contiguous free region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeBlock {
    pub start: usize,
    pub len: usize,
}

impl FreeBlock {
    /// One past the last byte of the block.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Ordered, non-overlapping set of free blocks.
#[derive(Clone, Debug, Default)]
pub struct FreeSpace {
    blocks: BTreeMap<usize, usize>,
}

impl FreeSpace {
    /// Create an empty tracker (nothing is free).
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct free blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if no byte is free.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total number of free bytes.
    pub fn total(&self) -> usize {
        self.blocks.values().sum()
    }

    /// Length of the largest free block, or 0.
    pub fn largest(&self) -> usize {
        self.blocks.values().copied().max().unwrap_or(0)
    }

    /// Snapshot of all blocks in address order.
    pub fn blocks(&self) -> Vec<FreeBlock> {
        self.blocks
            .iter()
            .map(|(&start, &len)| FreeBlock { start, len })
            .collect()
    }

    /// Returns `true` if any byte of `[offset, offset + len)` is free.
    pub fn overlaps(&self, offset: usize, len: usize) -> bool {
        let end = offset + len;
        // The only candidates are the last block starting before `end`.
        self.blocks
            .range(..end)
            .next_back()
            .is_some_and(|(&start, &blen)| start + blen > offset)
    }

    /// Return `[offset, offset + len)` to the pool, merging with neighbours.
    pub fn release(&mut self, offset: usize, len: usize) -> RomResult<()> {
        if len == 0 {
            return Err(RomError::InvalidFree {
                offset,
                length: len,
                reason: "zero-length region".into(),
            });
        }
        if self.overlaps(offset, len) {
            return Err(RomError::InvalidFree {
                offset,
                length: len,
                reason: "region is already free".into(),
            });
        }

        let mut start = offset;
        let mut length = len;

        // Merge with the block ending exactly at `offset`.
        if let Some((&prev_start, &prev_len)) = self.blocks.range(..offset).next_back() {
            if prev_start + prev_len == offset {
                self.blocks.remove(&prev_start);
                start = prev_start;
                length += prev_len;
            }
        }

        // Merge with the block starting exactly at the end.
        if let Some(next_len) = self.blocks.remove(&(offset + len)) {
            length += next_len;
        }

        self.blocks.insert(start, length);
        Ok(())
    }

    /// Best-fit allocation: the smallest block that fits, lowest start on ties.
    ///
    /// Returns `None` when nothing fits; the caller decides whether to grow.
    pub fn take(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }

        let (start, block_len) = self
            .blocks
            .iter()
            .filter(|&(_, &blen)| blen >= len)
            .min_by_key(|&(&start, &blen)| (blen, start))
            .map(|(&s, &l)| (s, l))?;

        self.blocks.remove(&start);
        if block_len > len {
            self.blocks.insert(start + len, block_len - len);
        }

        debug!(offset = start, len, block_len, "best-fit allocation");
        Some(start)
    }

    /// Remove `[offset, offset + len)` from the pool wherever it is free.
    ///
    /// Used when a region is claimed by something other than `take`, such as
    /// the header mirror written during expansion.
    pub fn reserve(&mut self, offset: usize, len: usize) {
        let end = offset + len;
        let touched: Vec<(usize, usize)> = self
            .blocks
            .range(..end)
            .filter(|&(&s, &l)| s + l > offset)
            .map(|(&s, &l)| (s, l))
            .collect();

        for (s, l) in touched {
            self.blocks.remove(&s);
            if s < offset {
                self.blocks.insert(s, offset - s);
            }
            if s + l > end {
                self.blocks.insert(end, s + l - end);
            }
        }
    }
}
