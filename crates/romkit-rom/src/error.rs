//! Error types for the ROM crate.

/// Errors that can occur while loading, addressing, or allocating inside a
/// cartridge image.
#[derive(Debug, thiserror::Error)]
pub enum RomError {
    /// A read or write reached past the end of the image.
    #[error("out of bounds: {length} bytes at {offset:#08x} exceed image size {size:#08x}")]
    OutOfBounds {
        offset: usize,
        length: usize,
        size: usize,
    },

    /// The image (after header handling) has a size the ROM type does not accept.
    #[error("unexpected ROM size {actual:#x}; expected one of {expected}")]
    UnexpectedSize { actual: usize, expected: String },

    /// The copier header is missing, malformed, or unexpected.
    #[error("copier header error: {0}")]
    Header(String),

    /// No free block is large enough and the image may not grow.
    #[error("free space exhausted: requested {requested:#x} bytes, largest free block is {largest:#x}")]
    FreeSpaceExhausted { requested: usize, largest: usize },

    /// Allocation requests must ask for at least one byte.
    #[error("cannot allocate zero bytes")]
    ZeroLengthAllocation,

    /// A release overlapped free space or fell outside the image.
    #[error("invalid free of {length:#x} bytes at {offset:#08x}: {reason}")]
    InvalidFree {
        offset: usize,
        length: usize,
        reason: String,
    },

    /// The requested expansion is not larger than the image or not allowed.
    #[error("cannot expand image from {from:#x} to {to:#x}")]
    InvalidExpansion { from: usize, to: usize },

    /// An SNES bus address that maps to no ROM offset.
    #[error("address {0:#08x} does not map into ROM")]
    UnmappedAddress(u32),

    /// I/O error while reading or writing an image file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for ROM results.
pub type RomResult<T> = Result<T, RomError>;
