//! Module registry: an import-once map keyed by normalized bytecode path,
//! with ordered two-pass teardown.
//!
//! A `BTreeMap` keyed by the normalized path string gives the same lookup
//! asymptotics as a hand-rolled balanced tree, with none of the manual
//! rotation bookkeeping.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::bytecode::Code;
use crate::heap::Heap;
use crate::scope::Scope;
use crate::types::Type;

/// Normalizes a bytecode path for use as a registry key: lowercased (the
/// common case is a case-insensitive filesystem) and with `.` components
/// collapsed via `Path::components`.
#[must_use]
pub fn normalize_path(path: &Path) -> String {
    let collapsed: PathBuf = path.components().collect();
    collapsed.to_string_lossy().to_lowercase()
}

/// A single imported module: its scope (the outer scope of every function
/// defined in it), its code, and the types it declared.
pub struct Module {
    pub path: PathBuf,
    pub scope: Scope,
    pub main: Rc<Code>,
    pub functions: Vec<Rc<Code>>,
    pub types: Vec<Rc<Type>>,
}

/// Import-once registry, keyed by [`normalize_path`].
#[derive(Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Module>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `get(path)`: a lookup miss is not an error.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&Module> {
        self.modules.get(&normalize_path(path))
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.modules.contains_key(&normalize_path(path))
    }

    /// `add(module)`: inserts, asserting uniqueness.
    ///
    /// # Panics
    /// Panics if a module is already registered at the same normalized path
    /// — the driver's import-once/cycle-detection logic (`driver.rs`) is
    /// responsible for never calling this twice for the same path.
    pub fn add(&mut self, module: Module) {
        let key = normalize_path(&module.path);
        let prior = self.modules.insert(key, module);
        assert!(prior.is_none(), "ModuleRegistry::add: module already registered");
    }

    /// Two-pass teardown: Pass A breaks class/method/instance cycles across
    /// every module before Pass B decrefs each module's exported top-level
    /// variables, since a class's method may itself be an instance of
    /// another module's class.
    pub fn teardown(mut self, heap: &mut Heap) {
        for module in self.modules.values() {
            for ty in &module.types {
                ty.clear_methods(heap);
            }
        }
        for module in self.modules.values() {
            module.scope.clear_locals(heap);
        }
        self.modules.clear();
    }
}
