//! Control-byte grammar shared by the decoder and the encoder.
//!
//! ```text
//! short:     [ccc lllll]                 len = l + 1      (1..=32)
//! extended:  [111 ccc ll] [llllllll]     len = l + 1      (1..=1024)
//! end:       [0xFF]
//! ```
//!
//! Commands 4-6 are followed by a big-endian 16-bit absolute output offset.

/// End-of-stream marker.
pub const END_MARKER: u8 = 0xFF;

/// Longest run expressible with a one-byte control.
pub const MAX_SHORT_LEN: usize = 32;

/// Longest run expressible at all.
pub const MAX_LEN: usize = 1024;

/// Highest output position a copy command can reference.
pub const MAX_REFERENCE: usize = u16::MAX as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// `len` raw bytes follow.
    Literal,
    /// One operand byte repeated `len` times.
    ByteFill,
    /// Two operand bytes repeated `len` times (`2 * len` output bytes).
    WordFill,
    /// One operand byte `b`, producing `b, b+1, ...` (wrapping).
    IncreasingFill,
    /// Copy `len` bytes forward from an earlier output position.
    Copy,
    /// Like [`Command::Copy`] with each byte's bit order reversed.
    BitReversedCopy,
    /// Copy `len` bytes walking backwards from an earlier output position.
    BackwardCopy,
}

impl Command {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Literal),
            1 => Some(Self::ByteFill),
            2 => Some(Self::WordFill),
            3 => Some(Self::IncreasingFill),
            4 => Some(Self::Copy),
            5 => Some(Self::BitReversedCopy),
            6 => Some(Self::BackwardCopy),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Literal => 0,
            Self::ByteFill => 1,
            Self::WordFill => 2,
            Self::IncreasingFill => 3,
            Self::Copy => 4,
            Self::BitReversedCopy => 5,
            Self::BackwardCopy => 6,
        }
    }

    /// Whether a 16-bit output offset follows the control byte(s).
    pub fn takes_reference(self) -> bool {
        matches!(self, Self::Copy | Self::BitReversedCopy | Self::BackwardCopy)
    }

    /// Operand bytes after the control byte(s), excluding literal payload.
    pub fn operand_len(self) -> usize {
        match self {
            Self::Literal => 0,
            Self::ByteFill | Self::IncreasingFill => 1,
            Self::WordFill | Self::Copy | Self::BitReversedCopy | Self::BackwardCopy => 2,
        }
    }
}

/// Number of control bytes needed for a run of `len`.
pub fn control_len(len: usize) -> usize {
    if len <= MAX_SHORT_LEN {
        1
    } else {
        2
    }
}

/// Append the control byte(s) for `command` with run length `len`.
pub fn write_control(out: &mut Vec<u8>, command: Command, len: usize) {
    debug_assert!((1..=MAX_LEN).contains(&len), "run length {len} out of range");
    let n = len - 1;
    if len <= MAX_SHORT_LEN {
        out.push(command.code() << 5 | n as u8);
    } else {
        out.push(0xE0 | command.code() << 2 | (n >> 8) as u8);
        out.push(n as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_and_extended_controls() {
        let mut out = Vec::new();
        write_control(&mut out, Command::ByteFill, 3);
        assert_eq!(out, [0x22]);

        out.clear();
        write_control(&mut out, Command::ByteFill, 10 + MAX_SHORT_LEN);
        assert_eq!(out, [0xE4, 41]);

        out.clear();
        write_control(&mut out, Command::BackwardCopy, MAX_LEN);
        assert_eq!(out, [0xFB, 0xFF]);
    }

    #[test]
    fn no_control_collides_with_end_marker() {
        for code in 0..7u8 {
            let command = Command::from_code(code).unwrap();
            for len in [1, MAX_SHORT_LEN, MAX_SHORT_LEN + 1, MAX_LEN] {
                let mut out = Vec::new();
                write_control(&mut out, command, len);
                assert_ne!(out[0], END_MARKER);
            }
        }
        assert!(Command::from_code(7).is_none());
    }
}
