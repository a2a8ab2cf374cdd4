use thiserror::Error;

/// Errors raised while decoding a compressed stream.
///
/// Offsets are relative to the start of the compressed stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown command in control byte {control:#04x} at offset {offset}")]
    UnknownCommand { offset: usize, control: u8 },

    #[error("truncated stream at offset {offset}: expected {expected}")]
    Truncated { offset: usize, expected: &'static str },

    #[error(
        "reference out of range at offset {offset}: {length} bytes from output position {from} with {produced} bytes decoded"
    )]
    ReferenceOutOfRange {
        offset: usize,
        from: usize,
        length: usize,
        produced: usize,
    },

    #[error("decompressed output would exceed limit of {limit} bytes")]
    OutputLimitExceeded { limit: usize },
}

pub type CodecResult<T> = Result<T, CodecError>;
