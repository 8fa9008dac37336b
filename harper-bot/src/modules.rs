//! Named command groups that can be switched on and off at runtime.

use std::collections::BTreeMap;

/// A group of related commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Module {
    Meta,
    Homework,
    Errors,
}

impl Module {
    pub const ALL: [Module; 3] = [Module::Meta, Module::Homework, Module::Errors];

    pub fn name(&self) -> &'static str {
        match self {
            Module::Meta => "Meta",
            Module::Homework => "Homework",
            Module::Errors => "Errors",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Module::Meta => "About the bot",
            Module::Homework => "Homework",
            Module::Errors => "Error handling module",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Module> {
        Module::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Shown in the module list of `help`.
    pub fn listed_in_help(&self) -> bool {
        !matches!(self, Module::Errors)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("No module named '{0}'")]
    NotFound(String),
    #[error("Module '{0}' is already loaded")]
    AlreadyLoaded(&'static str),
    #[error("Module '{0}' is not loaded")]
    NotLoaded(&'static str),
    #[error("Module '{0}' hosts the loader and cannot be unloaded")]
    Core(&'static str),
}

/// Which modules are currently loaded.
#[derive(Debug, Clone)]
pub struct Modules {
    loaded: BTreeMap<Module, bool>,
}

impl Default for Modules {
    fn default() -> Self {
        Self {
            loaded: Module::ALL.into_iter().map(|m| (m, true)).collect(),
        }
    }
}

impl Modules {
    pub fn is_loaded(&self, module: Module) -> bool {
        self.loaded.get(&module).copied().unwrap_or(false)
    }

    pub fn loaded(&self) -> impl Iterator<Item = Module> + '_ {
        self.loaded.iter().filter(|(_, on)| **on).map(|(m, _)| *m)
    }

    pub fn load(&mut self, name: &str) -> Result<Module, ModuleError> {
        let module = Module::from_name(name).ok_or_else(|| ModuleError::NotFound(name.to_string()))?;
        if self.is_loaded(module) {
            return Err(ModuleError::AlreadyLoaded(module.name()));
        }
        self.loaded.insert(module, true);
        tracing::info!(module = module.name(), "Module loaded");
        Ok(module)
    }

    pub fn unload(&mut self, name: &str) -> Result<Module, ModuleError> {
        let module = Module::from_name(name).ok_or_else(|| ModuleError::NotFound(name.to_string()))?;
        if module == Module::Meta {
            return Err(ModuleError::Core(module.name()));
        }
        if !self.is_loaded(module) {
            return Err(ModuleError::NotLoaded(module.name()));
        }
        self.loaded.insert(module, false);
        tracing::info!(module = module.name(), "Module unloaded");
        Ok(module)
    }

    /// Unload then load again. A module that was not loaded is just loaded.
    pub fn reload(&mut self, name: &str) -> Result<Module, ModuleError> {
        match self.unload(name) {
            Ok(_) | Err(ModuleError::NotLoaded(_)) => self.load(name),
            Err(ModuleError::Core(_)) => Module::from_name(name)
                .ok_or_else(|| ModuleError::NotFound(name.to_string())),
            Err(e) => Err(e),
        }
    }
}
