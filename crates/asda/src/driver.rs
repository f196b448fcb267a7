//! Import driver: resolves a bytecode file's import graph, runs each
//! module's top-level body exactly once, and tears everything down in
//! dependency order at the end.

use std::fs;
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use tracing::{debug, instrument};

use crate::bytecode::{decode_file, DecodedFile};
use crate::exceptions::RunError;
use crate::heap::Heap;
use crate::module::{normalize_path, Module, ModuleRegistry};
use crate::scope::Scope;
use crate::types::BuiltinTypes;
use crate::vm::{Builtins, Vm};

/// Everything that can go wrong resolving and running an import graph, on
/// top of the catchable `RunError`s a module's own body can raise.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("cannot read bytecode file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("import cycle detected: {path} imports itself, directly or indirectly")]
    Cycle { path: PathBuf },
    #[error(transparent)]
    Run(#[from] RunError),
}

/// Owns the heap and module registry for one program run: every module
/// imported through it shares the same heap and builtin tables, and
/// `teardown` tears the whole graph down together at the end — no single
/// module can be torn down in isolation, since one module's class may be
/// instantiated by another.
pub struct Driver {
    base_dir: PathBuf,
    registry: ModuleRegistry,
    /// Paths currently being imported, used to reject import cycles. Marks
    /// a path in-progress and rejects on revisit — the simplest cycle policy
    /// that still catches every cycle, at the cost of rejecting the
    /// mutually-recursive-module pattern some languages allow.
    in_progress: AHashSet<String>,
    heap: Heap,
    builtins: Builtins,
    builtin_types: BuiltinTypes,
}

impl Driver {
    #[must_use]
    pub fn new(base_dir: PathBuf, builtins: Builtins) -> Self {
        Self {
            base_dir,
            registry: ModuleRegistry::new(),
            in_progress: AHashSet::new(),
            heap: Heap::new(),
            builtins,
            builtin_types: BuiltinTypes::new(),
        }
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Imports `path` (relative to this driver's base directory) and every
    /// module it transitively imports, running each one's top-level body
    /// exactly once. A path already present in the registry is a no-op.
    ///
    /// # Errors
    /// Propagates a read/decode failure, an import cycle, or any unmatched
    /// error raised while running a module's body.
    #[instrument(level = "debug", skip(self))]
    pub fn import(&mut self, path: &Path) -> Result<(), ImportError> {
        let resolved = self.base_dir.join(path);
        let key = normalize_path(&resolved);
        if self.registry.contains(&resolved) {
            return Ok(());
        }
        if !self.in_progress.insert(key.clone()) {
            return Err(ImportError::Cycle { path: resolved });
        }

        let bytes = fs::read(&resolved).map_err(|source| ImportError::Io {
            path: resolved.clone(),
            source,
        })?;
        let relative_to = resolved.parent().unwrap_or(&self.base_dir);
        let decoded = decode_file(&bytes, relative_to)?;
        let DecodedFile {
            source_path,
            types,
            imports,
            functions,
            main_index,
        } = decoded;

        for import_path in &imports {
            self.import(Path::new(import_path))?;
        }

        let main_code = functions[main_index].clone();
        let module_scope = Scope::new_global(main_code.nlocals);
        let types_rc: std::rc::Rc<[_]> = types.clone().into();
        let functions_rc: std::rc::Rc<[_]> = functions.clone().into();

        let mut vm = Vm {
            heap: &mut self.heap,
            modules: &self.registry,
            builtins: &self.builtins,
            builtin_types: &self.builtin_types,
        };
        vm.run_call(main_code.clone(), module_scope.clone(), types_rc, functions_rc)?;

        debug!(path = %source_path.display(), "module imported");
        self.registry.add(Module {
            path: source_path,
            scope: module_scope,
            main: main_code,
            functions,
            types,
        });
        self.in_progress.remove(&key);
        Ok(())
    }

    /// Tears the whole import graph down, consuming the driver. Returns the
    /// number of objects still live afterward — nonzero indicates a
    /// reference-counting leak.
    #[must_use]
    pub fn teardown(mut self) -> usize {
        self.registry.teardown(&mut self.heap);
        self.heap.live_count()
    }
}

/// Convenience entry point: imports `entry` (relative to `base_dir`) into a
/// fresh [`Driver`] and returns it for the caller to inspect or tear down.
///
/// # Errors
/// See [`Driver::import`].
pub fn import(base_dir: PathBuf, entry: &Path, builtins: Builtins) -> Result<Driver, ImportError> {
    let mut driver = Driver::new(base_dir, builtins);
    driver.import(entry)?;
    Ok(driver)
}
