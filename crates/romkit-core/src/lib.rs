//! The romkit pipeline.
//!
//! [`Orchestrator`] drives the registered modules over a ROM image and a
//! project directory:
//!
//! - **decompile**: ROM -> every module's `read_from_rom` -> project files
//! - **compile**: project files -> every module's `write_to_rom` -> new ROM
//! - **upgrade**: migrate an old project to the current schema
//! - **decompile_partial**: decompile a subset into an existing project
//!
//! Progress is reported through a [`ProgressObserver`]; [`background::spawn`]
//! moves a job to a worker thread and turns progress into channel events.
//!
//! # Key Types
//!
//! - [`Orchestrator`] -- operations, run lock, and [`OperationState`]
//! - [`OperationReport`] -- per-module summary of a successful run
//! - [`ToolConfig`] -- user settings passed into every operation
//! - [`CoreError`] -- failures, module failures tagged with the module id

pub mod background;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod tools;
pub mod upgrade;

pub use background::{spawn, BackgroundRun, Job, ProgressEvent};
pub use config::ToolConfig;
pub use error::{CoreError, CoreResult};
pub use orchestrator::{OperationState, Orchestrator};
pub use progress::{NoProgress, ProgressObserver};
pub use report::{ModuleReport, OperationKind, OperationReport};
pub use tools::{add_header_file, expand_rom, rom_info, strip_header_file, RomInfo};
pub use upgrade::{migrations, Migration, MigrationContext};
