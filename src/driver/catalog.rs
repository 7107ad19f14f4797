//! Process-wide table of driver constructors.
//!
//! Driver crates linked into the process register their constructors here.
//! Builtin classes are visible from the root environment by class name.
//! Bundled constructors are only reachable through an artifact bundle whose
//! manifest binds a class name to their symbol, so several versions of one
//! driver can be linked side by side and each library picks its own.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::driver::capability::ClassFactory;

/// Registered constructors, keyed by class name (builtin) or symbol (bundled).
#[derive(Default)]
pub struct DriverCatalog {
    builtin: RwLock<HashMap<String, Arc<dyn ClassFactory>>>,
    bundled: RwLock<HashMap<String, Arc<dyn ClassFactory>>>,
}

impl DriverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog shared by the whole process.
    pub fn global() -> Arc<DriverCatalog> {
        static GLOBAL: OnceLock<Arc<DriverCatalog>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(DriverCatalog::new())))
    }

    /// Register a class resolvable from the root environment.
    pub fn register_builtin(&self, class_name: impl Into<String>, factory: impl ClassFactory + 'static) {
        let class_name = class_name.into();
        tracing::debug!(class = %class_name, "Registered builtin driver class");
        self.builtin
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(class_name, Arc::new(factory));
    }

    /// Register a constructor that artifact manifests can bind to.
    pub fn register_bundled(&self, symbol: impl Into<String>, factory: impl ClassFactory + 'static) {
        let symbol = symbol.into();
        tracing::debug!(symbol = %symbol, "Registered bundled driver symbol");
        self.bundled
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(symbol, Arc::new(factory));
    }

    pub fn bundled(&self, symbol: &str) -> Option<Arc<dyn ClassFactory>> {
        self.bundled
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(symbol)
            .cloned()
    }

    /// Copy of every builtin binding.
    pub fn builtin_classes(&self) -> HashMap<String, Arc<dyn ClassFactory>> {
        self.builtin
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl std::fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let builtin = self
            .builtin
            .read()
            .map(|m| m.len())
            .unwrap_or_default();
        let bundled = self
            .bundled
            .read()
            .map(|m| m.len())
            .unwrap_or_default();
        f.debug_struct("DriverCatalog")
            .field("builtin", &builtin)
            .field("bundled", &bundled)
            .finish()
    }
}
