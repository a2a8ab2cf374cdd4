use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

use romkit_modules::{Module, ModuleRegistry, RomLayout, TEXT_MODULE};
use romkit_project::{write_atomic, Project, CURRENT_SCHEMA_VERSION};
use romkit_rom::RomImage;
use tracing::{info, warn};

use crate::config::ToolConfig;
use crate::error::{CoreError, CoreResult};
use crate::progress::{Progress, ProgressObserver};
use crate::report::{ModuleReport, OperationKind, OperationReport};
use crate::upgrade::{migrations, MigrationContext};

/// Lifecycle of the most recent operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OperationState {
    Idle = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
}

impl OperationState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Succeeded,
            3 => Self::Failed,
            _ => Self::Idle,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Clears the running flag when an operation ends, however it ends.
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Runs decompile, compile and upgrade over one layout's modules.
///
/// Only one operation may run at a time; a second call while one is in
/// flight fails with [`CoreError::AlreadyRunning`].
pub struct Orchestrator {
    layout: RomLayout,
    registry: ModuleRegistry,
    auto_expand: bool,
    running: AtomicBool,
    state: AtomicU8,
}

impl Orchestrator {
    pub fn new(layout: RomLayout, config: &ToolConfig) -> Self {
        let registry = ModuleRegistry::from_layout(&layout);
        Self::with_registry(layout, registry, config.auto_expand)
    }

    /// Use a custom module set instead of the layout's standard one.
    pub fn with_registry(layout: RomLayout, registry: ModuleRegistry, auto_expand: bool) -> Self {
        Self {
            layout,
            registry,
            auto_expand,
            running: AtomicBool::new(false),
            state: AtomicU8::new(OperationState::Idle as u8),
        }
    }

    pub fn layout(&self) -> &RomLayout {
        &self.layout
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// State of the most recent operation.
    pub fn state(&self) -> OperationState {
        OperationState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn run<T>(&self, kind: OperationKind, body: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(operation = %kind, "rejected: another operation is running");
            return Err(CoreError::AlreadyRunning);
        }
        let _guard = RunGuard {
            running: &self.running,
        };
        self.state.store(OperationState::Running as u8, Ordering::Release);
        info!(operation = %kind, layout = %self.layout.name, "operation started");

        let result = body();
        let end = if result.is_ok() {
            OperationState::Succeeded
        } else {
            OperationState::Failed
        };
        self.state.store(end as u8, Ordering::Release);
        match &result {
            Ok(_) => info!(operation = %kind, "operation succeeded"),
            Err(e) => warn!(operation = %kind, error = %e, "operation failed"),
        }
        result
    }

    /// Load a ROM and check its size against the layout.
    pub fn load_rom(&self, path: &Path) -> CoreResult<RomImage> {
        let rom = RomImage::load(path)?;
        rom.check_size(&self.layout.accepted_sizes())?;
        Ok(rom)
    }

    // ---------------------------------------------------------------
    // Decompile
    // ---------------------------------------------------------------

    /// Extract every module's resources from `rom_path` into a project.
    ///
    /// The manifest is written last; a failed run leaves no manifest behind.
    pub fn decompile(
        &self,
        rom_path: &Path,
        project_path: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> CoreResult<OperationReport> {
        self.run(OperationKind::Decompile, || {
            let modules: Vec<&dyn Module> = self.registry.iter().collect();
            let project = Project::create(project_path, &self.layout.name)?;
            self.decompile_into(OperationKind::Decompile, rom_path, project, &modules, observer)
        })
    }

    /// Decompile only the text module, merging into an existing project.
    pub fn decompile_partial(
        &self,
        rom_path: &Path,
        project_path: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> CoreResult<OperationReport> {
        self.decompile_selected(rom_path, project_path, &[TEXT_MODULE], observer)
    }

    /// Decompile the modules named in `ids`, replacing only their manifest
    /// entries in an existing project.
    pub fn decompile_selected(
        &self,
        rom_path: &Path,
        project_path: &Path,
        ids: &[&str],
        observer: &mut dyn ProgressObserver,
    ) -> CoreResult<OperationReport> {
        self.run(OperationKind::DecompilePartial, || {
            let modules = self.registry.select(ids).map_err(CoreError::Layout)?;
            let mut project = Project::open_or_create(project_path, &self.layout.name)?;
            self.check_schema(&project)?;
            for module in &modules {
                project.manifest_mut().remove_module(module.id());
            }
            self.decompile_into(OperationKind::DecompilePartial, rom_path, project, &modules, observer)
        })
    }

    fn decompile_into(
        &self,
        kind: OperationKind,
        rom_path: &Path,
        mut project: Project,
        modules: &[&dyn Module],
        observer: &mut dyn ProgressObserver,
    ) -> CoreResult<OperationReport> {
        let started = Instant::now();
        let mut progress = Progress::new(observer);
        let mut report = OperationReport::new(kind);

        progress.begin_indeterminate();
        let rom = self.load_rom(rom_path)?;
        progress.end_indeterminate();
        progress.set(0.0);

        for (i, module) in modules.iter().enumerate() {
            let module_start = Instant::now();
            let resource = module
                .read_from_rom(&rom)
                .map_err(|e| CoreError::module(module.id(), e))?;
            module
                .write_to_project(&mut project, &resource)
                .map_err(|e| CoreError::module(module.id(), e))?;
            info!(module = module.id(), items = resource.item_count(), "decompiled module");
            report.modules.push(ModuleReport {
                module: module.id().to_string(),
                resources: resource.item_count(),
                pointer_updates: 0,
                elapsed: module_start.elapsed(),
            });
            progress.step(i + 1, modules.len());
        }

        // A partial decompile merges into a project that keeps its identity.
        let merging = kind == OperationKind::DecompilePartial;
        let fingerprint = rom.fingerprint();
        let manifest = project.manifest_mut();
        manifest.schema_version = CURRENT_SCHEMA_VERSION;
        if merging && manifest.rom_type != self.layout.name {
            warn!(project = %manifest.rom_type, layout = %self.layout.name, "merging into a project decompiled with a different layout");
        } else {
            manifest.rom_type = self.layout.name.clone();
        }
        let recorded_differs = manifest
            .base_rom_hash
            .as_ref()
            .is_some_and(|recorded| *recorded != fingerprint);
        if merging && recorded_differs {
            warn!(actual = %fingerprint, "merging from a different ROM than the project was decompiled from");
        } else {
            manifest.base_rom_hash = Some(fingerprint);
        }
        project.save()?;

        progress.set(1.0);
        report.rom_size = rom.len();
        report.elapsed = started.elapsed();
        Ok(report)
    }

    // ---------------------------------------------------------------
    // Compile
    // ---------------------------------------------------------------

    /// Rebuild a ROM from `project_path` on top of `base_rom_path`.
    ///
    /// Allocations come from the layout's free ranges and, for an image that
    /// was expanded earlier, everything past the base size; data the base
    /// image's tables still point at is never handed out. The output file is
    /// replaced only after every module succeeded.
    pub fn compile(
        &self,
        project_path: &Path,
        base_rom_path: &Path,
        output_rom_path: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> CoreResult<OperationReport> {
        self.run(OperationKind::Compile, || {
            let started = Instant::now();
            let mut progress = Progress::new(observer);
            let mut report = OperationReport::new(OperationKind::Compile);

            let project = Project::open(project_path)?;
            self.check_schema(&project)?;

            progress.begin_indeterminate();
            let mut rom = self.load_rom(base_rom_path)?;
            progress.end_indeterminate();
            progress.set(0.0);

            let manifest = project.manifest();
            if manifest.rom_type != self.layout.name {
                warn!(project = %manifest.rom_type, layout = %self.layout.name, "project was decompiled with a different layout");
            }
            if let Some(expected) = &manifest.base_rom_hash {
                let actual = rom.fingerprint();
                if *expected != actual {
                    warn!(%expected, %actual, "base ROM differs from the one the project was decompiled from");
                }
            }

            for range in &self.layout.free_ranges {
                rom.free(range.offset, range.length)?;
            }
            rom.release_expansion(self.layout.size)?;
            // Data an earlier compile relocated into free space is still live.
            for module in self.registry.iter() {
                let regions = module
                    .stored_regions(&rom)
                    .map_err(|e| CoreError::module(module.id(), e))?;
                for (start, end) in regions {
                    rom.reserve(start, end - start);
                }
            }
            if self.auto_expand {
                rom.set_growth(self.layout.expansions.clone());
            }

            let total = self.registry.len();
            for (i, module) in self.registry.iter().enumerate() {
                let module_start = Instant::now();
                let resource = module
                    .read_from_project(&project)
                    .map_err(|e| CoreError::module(module.id(), e))?;
                let updates = module
                    .write_to_rom(&mut rom, &resource)
                    .map_err(|e| CoreError::module(module.id(), e))?;
                for update in &updates {
                    update
                        .apply(&mut rom)
                        .map_err(|e| CoreError::module(module.id(), e))?;
                }
                info!(
                    module = module.id(),
                    items = resource.item_count(),
                    pointers = updates.len(),
                    "compiled module"
                );
                report.modules.push(ModuleReport {
                    module: module.id().to_string(),
                    resources: resource.item_count(),
                    pointer_updates: updates.len(),
                    elapsed: module_start.elapsed(),
                });
                progress.step(i + 1, total);
            }

            progress.begin_indeterminate();
            write_atomic(output_rom_path, &rom.to_file_bytes())?;
            progress.end_indeterminate();
            info!(path = %output_rom_path.display(), size = rom.len(), "wrote ROM");

            progress.set(1.0);
            report.rom_size = rom.len();
            report.elapsed = started.elapsed();
            Ok(report)
        })
    }

    fn check_schema(&self, project: &Project) -> CoreResult<()> {
        let found = project.manifest().schema_version;
        if found > CURRENT_SCHEMA_VERSION {
            Err(CoreError::ProjectVersion {
                found,
                supported: CURRENT_SCHEMA_VERSION,
            })
        } else if found < CURRENT_SCHEMA_VERSION {
            Err(CoreError::NeedsUpgrade { found })
        } else {
            Ok(())
        }
    }

    // ---------------------------------------------------------------
    // Upgrade
    // ---------------------------------------------------------------

    /// Migrate `project_path` to the current schema version, saving the
    /// manifest after every step.
    pub fn upgrade(
        &self,
        project_path: &Path,
        base_rom_path: &Path,
        observer: &mut dyn ProgressObserver,
    ) -> CoreResult<OperationReport> {
        self.run(OperationKind::Upgrade, || {
            let started = Instant::now();
            let mut progress = Progress::new(observer);
            let mut report = OperationReport::new(OperationKind::Upgrade);

            let mut project = Project::open(project_path)?;
            let found = project.manifest().schema_version;
            if found > CURRENT_SCHEMA_VERSION {
                return Err(CoreError::ProjectVersion {
                    found,
                    supported: CURRENT_SCHEMA_VERSION,
                });
            }

            let rom = self.load_rom(base_rom_path)?;
            report.rom_size = rom.len();
            let ctx = MigrationContext {
                layout: &self.layout,
                rom: &rom,
            };
            let steps = migrations();
            let pending = (CURRENT_SCHEMA_VERSION - found) as usize;

            let mut version = found;
            while version < CURRENT_SCHEMA_VERSION {
                let step = steps
                    .iter()
                    .find(|m| m.from_version() == version)
                    .ok_or(CoreError::MissingMigration { from: version })?;
                step.apply(&mut project, &ctx)?;
                project.manifest_mut().schema_version = version + 1;
                project.save()?;
                info!(from = version, to = version + 1, step = step.description(), "migrated project");
                report.migrations.push((version, version + 1));
                version += 1;
                progress.step(report.migrations.len(), pending);
            }

            progress.set(1.0);
            report.elapsed = started.elapsed();
            Ok(report)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::tests::{Recorder, Seen};
    use crate::progress::NoProgress;
    use romkit_modules::{ModuleError, ModuleResult, PointerUpdate, Resource, RomTitle};

    fn small_layout() -> RomLayout {
        RomLayout {
            name: "unit".into(),
            size: 0x10000,
            expansions: vec![],
            ..Default::default()
        }
    }

    fn write_rom(dir: &Path, title: &[u8]) -> std::path::PathBuf {
        let mut rom = RomImage::new(0x10000);
        rom.write(0xFFC0, title).unwrap();
        let path = dir.join("base.sfc");
        std::fs::write(&path, rom.to_file_bytes()).unwrap();
        path
    }

    /// Fails on every ROM read.
    struct Broken;

    impl Module for Broken {
        fn id(&self) -> &'static str {
            "broken"
        }
        fn description(&self) -> &'static str {
            "always fails"
        }
        fn read_from_rom(&self, _rom: &RomImage) -> ModuleResult<Resource> {
            Err(ModuleError::resource("broken", "everything", "cannot read"))
        }
        fn write_to_rom(&self, _rom: &mut RomImage, _r: &Resource) -> ModuleResult<Vec<PointerUpdate>> {
            Ok(Vec::new())
        }
        fn read_from_project(&self, _p: &Project) -> ModuleResult<Resource> {
            Ok(Resource::Title(RomTitle { title: String::new() }))
        }
        fn write_to_project(&self, _p: &mut Project, _r: &Resource) -> ModuleResult<()> {
            Ok(())
        }
    }

    #[test]
    fn decompile_then_compile_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = write_rom(dir.path(), b"UNIT TEST CART       ");
        let orch = Orchestrator::new(small_layout(), &ToolConfig::default());
        assert_eq!(orch.state(), OperationState::Idle);

        let mut rec = Recorder::default();
        let report = orch.decompile(&rom_path, &dir.path().join("proj"), &mut rec).unwrap();
        assert_eq!(orch.state(), OperationState::Succeeded);
        assert_eq!(report.modules.len(), 4);
        assert_eq!(rec.0.first(), Some(&Seen::Begin));
        assert_eq!(rec.0.last(), Some(&Seen::Fraction(1.0)));

        let out = dir.path().join("out.sfc");
        orch.compile(&dir.path().join("proj"), &rom_path, &out, &mut NoProgress).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&rom_path).unwrap());
    }

    #[test]
    fn failing_module_fails_fast_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = write_rom(dir.path(), b"X");
        let mut registry = ModuleRegistry::from_layout(&small_layout());
        registry.register(Box::new(Broken));
        let orch = Orchestrator::with_registry(small_layout(), registry, false);

        let err = orch
            .decompile(&rom_path, &dir.path().join("proj"), &mut NoProgress)
            .unwrap_err();
        assert_eq!(err.module_id(), Some("broken"));
        assert_eq!(orch.state(), OperationState::Failed);
        assert!(!Project::exists(&dir.path().join("proj")));
        // Earlier modules already wrote their files.
        assert!(dir.path().join("proj/title.toml").exists());
    }

    #[test]
    fn wrong_rom_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.sfc");
        std::fs::write(&path, vec![0u8; 0x8000]).unwrap();
        let orch = Orchestrator::new(small_layout(), &ToolConfig::default());
        let err = orch
            .decompile(&path, &dir.path().join("proj"), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, CoreError::Rom(romkit_rom::RomError::UnexpectedSize { .. })));
    }

    #[test]
    fn compile_rejects_old_and_new_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = write_rom(dir.path(), b"X");
        let orch = Orchestrator::new(small_layout(), &ToolConfig::default());
        let proj = dir.path().join("proj");
        orch.decompile(&rom_path, &proj, &mut NoProgress).unwrap();

        for (version, newer) in [(2, false), (CURRENT_SCHEMA_VERSION + 1, true)] {
            let mut project = Project::open(&proj).unwrap();
            project.manifest_mut().schema_version = version;
            project.save().unwrap();
            let err = orch
                .compile(&proj, &rom_path, &dir.path().join("out.sfc"), &mut NoProgress)
                .unwrap_err();
            if newer {
                assert!(matches!(err, CoreError::ProjectVersion { .. }));
            } else {
                assert!(matches!(err, CoreError::NeedsUpgrade { found: 2 }));
            }
        }
        assert!(!dir.path().join("out.sfc").exists());
    }

    #[test]
    fn upgrade_rejects_newer_projects() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = write_rom(dir.path(), b"X");
        let proj = dir.path().join("proj");
        let mut project = Project::create(&proj, "unit").unwrap();
        project.manifest_mut().schema_version = 9;
        project.save().unwrap();

        let orch = Orchestrator::new(small_layout(), &ToolConfig::default());
        let err = orch.upgrade(&proj, &rom_path, &mut NoProgress).unwrap_err();
        assert!(matches!(err, CoreError::ProjectVersion { found: 9, supported: 3 }));
    }

    #[test]
    fn upgrade_of_current_project_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let rom_path = write_rom(dir.path(), b"X");
        let proj = dir.path().join("proj");
        let orch = Orchestrator::new(small_layout(), &ToolConfig::default());
        orch.decompile(&rom_path, &proj, &mut NoProgress).unwrap();
        let report = orch.upgrade(&proj, &rom_path, &mut NoProgress).unwrap();
        assert!(report.migrations.is_empty());
    }

    #[test]
    fn state_values_roundtrip() {
        for s in [
            OperationState::Idle,
            OperationState::Running,
            OperationState::Succeeded,
            OperationState::Failed,
        ] {
            assert_eq!(OperationState::from_u8(s as u8), s);
        }
        assert!(OperationState::Failed.is_terminal());
        assert!(!OperationState::Running.is_terminal());
    }
}
