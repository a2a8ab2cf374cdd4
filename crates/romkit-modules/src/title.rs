use romkit_project::Project;
use romkit_rom::RomImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModuleError, ModuleResult};
use crate::layout::TitleField;
use crate::pointer::PointerUpdate;
use crate::resource::{Resource, RomTitle};
use crate::traits::Module;

pub const TITLE_MODULE: &str = "title";
const TITLE_FILE: &str = "title.toml";
const PAD: u8 = b' ';

#[derive(Debug, Serialize, Deserialize)]
struct TitleFile {
    title: String,
}

/// The internal cartridge title.
pub struct TitleModule {
    field: TitleField,
}

impl TitleModule {
    pub fn new(field: TitleField) -> Self {
        Self { field }
    }

    /// Field bytes for `title`, space padded.
    fn encode(&self, title: &str) -> ModuleResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(self.field.length);
        for c in title.chars() {
            let b = u8::try_from(u32::from(c)).map_err(|_| {
                ModuleError::resource(TITLE_MODULE, TITLE_MODULE, format!("character {c:?} cannot be stored"))
            })?;
            bytes.push(b);
        }
        if bytes.len() > self.field.length {
            return Err(ModuleError::resource(
                TITLE_MODULE,
                TITLE_MODULE,
                format!("title is {} bytes, field holds {}", bytes.len(), self.field.length),
            ));
        }
        bytes.resize(self.field.length, PAD);
        Ok(bytes)
    }

    fn as_title<'r>(&self, resource: &'r Resource) -> ModuleResult<&'r RomTitle> {
        match resource {
            Resource::Title(t) => Ok(t),
            other => Err(ModuleError::WrongResource {
                module: TITLE_MODULE,
                found: other.kind(),
            }),
        }
    }
}

impl Module for TitleModule {
    fn id(&self) -> &'static str {
        TITLE_MODULE
    }

    fn description(&self) -> &'static str {
        "internal cartridge title"
    }

    fn read_from_rom(&self, rom: &RomImage) -> ModuleResult<Resource> {
        let bytes = rom.read(self.field.offset, self.field.length)?;
        let title: String = bytes.iter().map(|&b| char::from(b)).collect();
        Ok(Resource::Title(RomTitle {
            title: title.trim_end_matches(char::from(PAD)).to_string(),
        }))
    }

    fn write_to_rom(&self, rom: &mut RomImage, resource: &Resource) -> ModuleResult<Vec<PointerUpdate>> {
        let title = self.as_title(resource)?;
        let bytes = self.encode(&title.title)?;
        if rom.read(self.field.offset, self.field.length)? != bytes.as_slice() {
            rom.write(self.field.offset, &bytes)?;
            debug!(title = %title.title, "wrote title");
        }
        Ok(Vec::new())
    }

    fn read_from_project(&self, project: &Project) -> ModuleResult<Resource> {
        let file: TitleFile = project
            .read_resource_toml(TITLE_MODULE, TITLE_MODULE)
            .map_err(|e| ModuleError::resource(TITLE_MODULE, TITLE_MODULE, e))?;
        // Validate now so a bad title fails before anything is written.
        self.encode(&file.title)?;
        Ok(Resource::Title(RomTitle { title: file.title }))
    }

    fn write_to_project(&self, project: &mut Project, resource: &Resource) -> ModuleResult<()> {
        let title = self.as_title(resource)?;
        let file = TitleFile {
            title: title.title.clone(),
        };
        project.write_resource_toml(TITLE_MODULE, TITLE_MODULE, TITLE_FILE, &file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_title(title: &[u8]) -> RomImage {
        let mut rom = RomImage::new(0x10000);
        rom.write(0xFFC0, title).unwrap();
        rom
    }

    #[test]
    fn reads_trimmed_title() {
        let rom = rom_with_title(b"EARTH BOUND          ");
        let module = TitleModule::new(TitleField::default());
        assert_eq!(
            module.read_from_rom(&rom).unwrap(),
            Resource::Title(RomTitle { title: "EARTH BOUND".into() })
        );
    }

    #[test]
    fn unchanged_title_is_not_rewritten() {
        let mut rom = rom_with_title(b"EARTH BOUND          ");
        let before = rom.as_bytes().to_vec();
        let module = TitleModule::new(TitleField::default());
        let title = module.read_from_rom(&rom).unwrap();
        module.write_to_rom(&mut rom, &title).unwrap();
        assert_eq!(rom.as_bytes(), before.as_slice());
    }

    #[test]
    fn writes_padded_title() {
        let mut rom = rom_with_title(&[0; 21]);
        let module = TitleModule::new(TitleField::default());
        let title = Resource::Title(RomTitle { title: "MOTHER 2".into() });
        assert!(module.write_to_rom(&mut rom, &title).unwrap().is_empty());
        assert_eq!(rom.read(0xFFC0, 21).unwrap(), b"MOTHER 2             ");
    }

    #[test]
    fn rejects_long_or_wide_titles() {
        let module = TitleModule::new(TitleField::default());
        assert!(module.encode(&"X".repeat(22)).is_err());
        assert!(matches!(
            module.encode("\u{3042}"),
            Err(ModuleError::Resource { .. })
        ));
    }

    #[test]
    fn project_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::create(dir.path(), "test").unwrap();
        let module = TitleModule::new(TitleField::default());
        let title = Resource::Title(RomTitle { title: "HELLO".into() });
        module.write_to_project(&mut project, &title).unwrap();
        assert_eq!(module.read_from_project(&project).unwrap(), title);
    }

    #[test]
    fn missing_title_file_names_module() {
        let dir = tempfile::tempdir().unwrap();
        let project = Project::create(dir.path(), "test").unwrap();
        let err = TitleModule::new(TitleField::default())
            .read_from_project(&project)
            .unwrap_err();
        assert!(matches!(err, ModuleError::Resource { ref module, .. } if module == "title"));
    }

    #[test]
    fn wrong_resource_kind() {
        let mut rom = RomImage::new(0x10000);
        let err = TitleModule::new(TitleField::default())
            .write_to_rom(&mut rom, &Resource::Maps(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, ModuleError::WrongResource { found: "maps", .. }));
    }
}
