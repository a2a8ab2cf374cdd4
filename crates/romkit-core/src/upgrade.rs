//! Project schema migrations.
//!
//! Each [`Migration`] lifts a project from one schema version to the next.
//! Steps never drop a resource unless they replace it with a converted one.

use romkit_modules::{
    map_file_path, MapsModule, Module, Resource, RomLayout, TitleModule, MAPS_MODULE, TITLE_MODULE,
};
use romkit_project::Project;
use romkit_rom::RomImage;
use tracing::info;

use crate::error::{CoreError, CoreResult};

/// What a migration step may consult besides the project itself.
pub struct MigrationContext<'a> {
    pub layout: &'a RomLayout,
    pub rom: &'a RomImage,
}

pub trait Migration: Send + Sync {
    /// Schema version this step upgrades from; it produces `from_version() + 1`.
    fn from_version(&self) -> u32;

    fn description(&self) -> &'static str;

    fn apply(&self, project: &mut Project, ctx: &MigrationContext<'_>) -> CoreResult<()>;
}

/// v1 stored maps as raw `maps/<name>.bin`; v2 stores TOML with hex rows.
pub struct MapsToToml;

impl Migration for MapsToToml {
    fn from_version(&self) -> u32 {
        1
    }

    fn description(&self) -> &'static str {
        "convert raw map files to TOML"
    }

    fn apply(&self, project: &mut Project, ctx: &MigrationContext<'_>) -> CoreResult<()> {
        let module = MapsModule::new(ctx.layout.maps.clone());
        let raw: Vec<(String, String)> = project
            .manifest()
            .entries_for(MAPS_MODULE)
            .filter(|e| e.file_path.ends_with(".bin"))
            .map(|e| (e.resource_id.clone(), e.file_path.clone()))
            .collect();

        for (name, old_path) in raw {
            let bytes = project.read_file(&old_path)?;
            let map = module
                .map_from_raw(&name, bytes)
                .map_err(|e| CoreError::module(MAPS_MODULE, e))?;
            module
                .write_to_project(project, &Resource::Maps(vec![map]))
                .map_err(|e| CoreError::module(MAPS_MODULE, e))?;
            // The manifest now points at the TOML file.
            if old_path != map_file_path(&name) {
                project.remove_file(&old_path)?;
            }
            info!(map = %name, from = %old_path, "converted map");
        }
        Ok(())
    }
}

/// v3 added the title resource, taken from the base ROM.
pub struct ExtractTitle;

impl Migration for ExtractTitle {
    fn from_version(&self) -> u32 {
        2
    }

    fn description(&self) -> &'static str {
        "extract the cartridge title from the base ROM"
    }

    fn apply(&self, project: &mut Project, ctx: &MigrationContext<'_>) -> CoreResult<()> {
        let Some(field) = ctx.layout.title else {
            return Ok(());
        };
        if project.manifest().find(TITLE_MODULE, TITLE_MODULE).is_some() {
            return Ok(());
        }
        let module = TitleModule::new(field);
        let title = module
            .read_from_rom(ctx.rom)
            .map_err(|e| CoreError::module(TITLE_MODULE, e))?;
        module
            .write_to_project(project, &title)
            .map_err(|e| CoreError::module(TITLE_MODULE, e))?;
        Ok(())
    }
}

/// All known steps, oldest first.
pub fn migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(MapsToToml), Box::new(ExtractTitle)]
}
