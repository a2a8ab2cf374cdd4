//! Legacy cartridge compression codec.
//!
//! A compressed block is a stream of tokens terminated by `0xFF`. Each token
//! starts with a control byte carrying a 3-bit command and a run length;
//! see [`command`] for the exact grammar.
//!
//! # Key Types
//!
//! - [`Decoder`] / [`decompress_block`] -- decode a block in place inside a
//!   larger buffer and report its [`CompressionBlock`] extent
//! - [`compress`] -- greedy encoder, never worse than [`compress_literal`]
//! - [`CodecError`] -- malformed-stream diagnostics with stream offsets

pub mod command;
pub mod decode;
pub mod encode;
pub mod error;

pub use command::{Command, END_MARKER, MAX_LEN};
pub use decode::{decompress, decompress_block, CompressionBlock, DecodedBlock, Decoder};
pub use encode::{compress, compress_literal, literal_encoding_len};
pub use error::{CodecError, CodecResult};
