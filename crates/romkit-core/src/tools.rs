//! Whole-file ROM utilities behind the `expand`, `add-header`,
//! `strip-header` and `info` commands.

use std::path::Path;

use romkit_modules::{Module, Resource, RomLayout, TitleModule};
use romkit_project::write_atomic;
use romkit_rom::{add_header, strip_header, RomImage};
use tracing::info;

use crate::error::{CoreError, CoreResult};

fn read(path: &Path) -> CoreResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Grow the ROM at `input` to `target` bytes (headerless) and write it to
/// `output`. The copier header, if any, is kept.
pub fn expand_rom(input: &Path, output: &Path, target: usize) -> CoreResult<usize> {
    let mut rom = RomImage::from_bytes(read(input)?);
    let from = rom.len();
    rom.expand_to(target)?;
    write_atomic(output, &rom.to_file_bytes())?;
    info!(from, to = target, path = %output.display(), "expanded ROM");
    Ok(rom.len())
}

pub fn add_header_file(input: &Path, output: &Path) -> CoreResult<()> {
    let bytes = add_header(&read(input)?)?;
    write_atomic(output, &bytes)?;
    Ok(())
}

pub fn strip_header_file(input: &Path, output: &Path) -> CoreResult<()> {
    let bytes = strip_header(&read(input)?)?;
    write_atomic(output, &bytes)?;
    Ok(())
}

/// Facts about a ROM file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RomInfo {
    pub size: usize,
    pub header_present: bool,
    pub fingerprint: String,
    /// Whether the size is one the layout accepts.
    pub size_accepted: bool,
    pub title: Option<String>,
}

pub fn rom_info(path: &Path, layout: &RomLayout) -> CoreResult<RomInfo> {
    let rom = RomImage::from_bytes(read(path)?);
    let title = match layout.title {
        Some(field) => match TitleModule::new(field).read_from_rom(&rom) {
            Ok(Resource::Title(t)) => Some(t.title),
            _ => None,
        },
        None => None,
    };
    Ok(RomInfo {
        size: rom.len(),
        header_present: rom.header_present(),
        fingerprint: rom.fingerprint(),
        size_accepted: rom.check_size(&layout.accepted_sizes()).is_ok(),
        title,
    })
}
