//! Cartridge image handling for romkit.
//!
//! Everything that touches raw ROM bytes goes through a [`RomImage`]:
//! bounds-checked reads and writes, best-fit allocation out of the
//! [`FreeSpace`] tracker, and transparent copier-header handling.
//!
//! # Key Types
//!
//! - [`RomImage`] -- headerless cartridge bytes plus free-space state
//! - [`FreeSpace`] / [`FreeBlock`] -- ordered, coalescing free-block list
//! - [`RomError`] -- out-of-bounds, size, header, and allocation failures
//!
//! Header add/strip ([`add_header`], [`strip_header`]) and bus-address
//! mapping ([`to_snes_address`], [`from_snes_address`]) are pure helpers.

pub mod address;
pub mod error;
pub mod expand;
pub mod free_space;
pub mod header;
pub mod image;

pub use address::{from_snes_address, to_snes_address};
pub use error::{RomError, RomResult};
pub use free_space::{FreeBlock, FreeSpace};
pub use header::{add_header, has_copier_header, strip_header, COPIER_HEADER_SIZE};
pub use image::RomImage;
