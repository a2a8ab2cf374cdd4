//! Resource modules for romkit.
//!
//! Each [`Module`] owns one resource domain and knows how to move it
//! between a [`romkit_rom::RomImage`] and a [`romkit_project::Project`].
//! Which bytes belong to which module is described by a [`RomLayout`].
//!
//! # Key Types
//!
//! - [`Module`] -- read/write a [`Resource`] from ROM and from project files
//! - [`ModuleRegistry`] -- fixed execution order built from a layout
//! - [`PointerUpdate`] -- pointer rewrite requested after a relocation
//! - [`RomLayout`] -- TOML description of a ROM type
//!
//! # Modules
//!
//! | id           | project files                     |
//! |--------------|-----------------------------------|
//! | `title`      | `title.toml`                      |
//! | `maps`       | `maps/<name>.toml`                |
//! | `compressed` | `compressed/<table>/<index>.bin`  |
//! | `text`       | `text/<table>.toml`               |

pub mod compressed;
pub mod error;
pub mod layout;
pub mod maps;
pub mod pointer;
pub mod registry;
pub mod resource;
pub mod text;
pub mod title;
pub mod traits;

pub use compressed::{CompressedModule, COMPRESSED_MODULE};
pub use error::{ModuleError, ModuleResult};
pub use layout::{FreeRange, MapSpec, RomLayout, TableSpec, TextTableSpec, TitleField};
pub use maps::{map_file_path, MapsModule, MAPS_MODULE};
pub use pointer::{read_pointer, PointerUpdate, Region};
pub use registry::ModuleRegistry;
pub use resource::{BlobTable, Resource, RomTitle, TextTable, TileMap};
pub use text::{encode_text, parse_text, TextModule, TEXT_MODULE};
pub use title::{TitleModule, TITLE_MODULE};
pub use traits::Module;
