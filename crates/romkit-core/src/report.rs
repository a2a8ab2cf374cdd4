use std::fmt;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Decompile,
    DecompilePartial,
    Compile,
    Upgrade,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Decompile => "decompile",
            Self::DecompilePartial => "partial decompile",
            Self::Compile => "compile",
            Self::Upgrade => "upgrade",
        };
        f.write_str(name)
    }
}

/// What one module did during an operation.
#[derive(Clone, Debug)]
pub struct ModuleReport {
    pub module: String,
    /// Items read or written (maps, blocks, strings, ...).
    pub resources: usize,
    pub pointer_updates: usize,
    pub elapsed: Duration,
}

/// Summary of a successful operation.
#[derive(Clone, Debug)]
pub struct OperationReport {
    pub operation: OperationKind,
    pub modules: Vec<ModuleReport>,
    /// Migration steps applied, as `(from, to)` schema versions.
    pub migrations: Vec<(u32, u32)>,
    /// Headerless size of the ROM the operation read or produced.
    pub rom_size: usize,
    pub elapsed: Duration,
}

impl OperationReport {
    pub(crate) fn new(operation: OperationKind) -> Self {
        Self {
            operation,
            modules: Vec::new(),
            migrations: Vec::new(),
            rom_size: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn total_resources(&self) -> usize {
        self.modules.iter().map(|m| m.resources).sum()
    }

    pub fn total_pointer_updates(&self) -> usize {
        self.modules.iter().map(|m| m.pointer_updates).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals() {
        let mut report = OperationReport::new(OperationKind::Compile);
        for (module, resources, pointer_updates) in [("maps", 2, 0), ("text", 5, 3)] {
            report.modules.push(ModuleReport {
                module: module.into(),
                resources,
                pointer_updates,
                elapsed: Duration::from_millis(1),
            });
        }
        assert_eq!(report.total_resources(), 7);
        assert_eq!(report.total_pointer_updates(), 3);
        assert_eq!(report.operation.to_string(), "compile");
    }
}
