use tracing::debug;

use crate::compressed::CompressedModule;
use crate::error::{ModuleError, ModuleResult};
use crate::layout::RomLayout;
use crate::maps::MapsModule;
use crate::text::TextModule;
use crate::title::TitleModule;
use crate::traits::Module;

/// Ordered, fixed set of modules for one layout.
///
/// Order is title, maps, compressed, text. Compile and decompile always
/// walk it front to back.
pub struct ModuleRegistry {
    modules: Vec<Box<dyn Module>>,
}

impl ModuleRegistry {
    /// An empty registry; use [`ModuleRegistry::from_layout`] for the
    /// standard set.
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Register the built-in modules for `layout`.
    ///
    /// The title module is only present when the layout names a title field.
    pub fn from_layout(layout: &RomLayout) -> Self {
        let mut registry = Self::new();
        if let Some(field) = layout.title {
            registry.register(Box::new(TitleModule::new(field)));
        }
        registry.register(Box::new(MapsModule::new(layout.maps.clone())));
        registry.register(Box::new(CompressedModule::new(layout.compressed_tables.clone())));
        registry.register(Box::new(TextModule::new(layout.text_tables.clone())));
        debug!(layout = %layout.name, modules = ?registry.ids(), "built module registry");
        registry
    }

    /// Append a module. Registration order is execution order.
    pub fn register(&mut self, module: Box<dyn Module>) {
        self.modules.push(module);
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.id()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&dyn Module> {
        self.modules.iter().find(|m| m.id() == id).map(|m| m.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Module> {
        self.modules.iter().map(|m| m.as_ref())
    }

    /// The modules named in `ids`, in registration order.
    ///
    /// Fails on the first id that is not registered.
    pub fn select(&self, ids: &[&str]) -> ModuleResult<Vec<&dyn Module>> {
        if let Some(unknown) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(ModuleError::UnknownModule(unknown.to_string()));
        }
        Ok(self.iter().filter(|m| ids.contains(&m.id())).collect())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
