//! Project directories for romkit.
//!
//! A project is a directory holding `project.toml` plus one file per
//! resource. The manifest maps `(module_id, resource_id)` pairs to files
//! relative to the project root and records the schema version and the
//! fingerprint of the base image it was decompiled from.
//!
//! # Key Types
//!
//! - [`Project`] -- root directory plus in-memory [`Manifest`]
//! - [`Manifest`] / [`ResourceEntry`] -- serde model of `project.toml`
//! - [`ProjectError`] -- I/O, parse, and path-safety failures

pub mod error;
pub mod manifest;
pub mod project;

pub use error::{ProjectError, ProjectResult};
pub use manifest::{Manifest, ResourceEntry, CURRENT_SCHEMA_VERSION, MANIFEST_FILE};
pub use project::{write_atomic, Project};
