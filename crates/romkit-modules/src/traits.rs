use romkit_project::Project;
use romkit_rom::RomImage;

use crate::error::ModuleResult;
use crate::pointer::{PointerUpdate, Region};
use crate::resource::Resource;

/// A handler owning one resource domain.
///
/// Modules are stateless apart from the layout they were built from; the
/// orchestrator calls them strictly in registration order.
pub trait Module: Send + Sync {
    /// Stable identifier used in manifests and module selection.
    fn id(&self) -> &'static str;

    /// One-line human-readable summary.
    fn description(&self) -> &'static str;

    /// Extract this module's resource from a ROM image.
    fn read_from_rom(&self, rom: &RomImage) -> ModuleResult<Resource>;

    /// Insert `resource` into `rom`.
    ///
    /// Variable-size data is placed with [`RomImage::allocate`]; the returned
    /// updates name every pointer that must be rebased onto it. Values equal
    /// to what `rom` already holds are left untouched.
    fn write_to_rom(&self, rom: &mut RomImage, resource: &Resource) -> ModuleResult<Vec<PointerUpdate>>;

    /// ROM regions currently holding this module's relocatable data.
    ///
    /// Compile keeps these out of the free pool, so payloads an earlier
    /// compile placed in free space are never allocated over. Modules that
    /// only write in place have none.
    fn stored_regions(&self, _rom: &RomImage) -> ModuleResult<Vec<Region>> {
        Ok(Vec::new())
    }

    /// Load this module's resource from project files.
    fn read_from_project(&self, project: &Project) -> ModuleResult<Resource>;

    /// Write `resource` to project files and record them in the manifest.
    fn write_to_project(&self, project: &mut Project, resource: &Resource) -> ModuleResult<()>;
}
