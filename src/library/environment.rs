//! Isolated class-resolution environments.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::configuration::Configuration;
use crate::driver::{ClassFactory, DriverError, Instance};
use crate::registry::Library;

static NEXT_ENVIRONMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvironmentId(u64);

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env-{}", self.0)
    }
}

/// A class as defined by one environment.
///
/// Identity matters: the same class name loaded by two environments gives
/// two distinct `LoadedClass` values. Compare with [`LoadedClass::same_class`].
pub struct LoadedClass {
    name: String,
    defined_by: EnvironmentId,
    factory: Arc<dyn ClassFactory>,
}

impl LoadedClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The environment that defined this class.
    pub fn defined_by(&self) -> EnvironmentId {
        self.defined_by
    }

    pub fn new_instance(&self, conf: &Configuration) -> Result<Instance, DriverError> {
        self.factory.new_instance(conf)
    }

    pub fn same_class(a: &Arc<LoadedClass>, b: &Arc<LoadedClass>) -> bool {
        Arc::ptr_eq(a, b)
    }
}

impl fmt::Debug for LoadedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedClass")
            .field("name", &self.name)
            .field("defined_by", &self.defined_by)
            .finish()
    }
}

/// Resolves class names for one library, child first.
///
/// Resolution order for a name:
/// 1. a class this environment already defined;
/// 2. unless the name is shared, a binding from this environment's own bundles;
/// 3. the parent environment.
///
/// The root environment has no parent and binds the catalog's builtin classes.
pub struct IsolatedEnvironment {
    id: EnvironmentId,
    library: Option<Library>,
    bindings: HashMap<String, Arc<dyn ClassFactory>>,
    parent: Option<Arc<IsolatedEnvironment>>,
    shared: Arc<BTreeSet<String>>,
    defined: Mutex<HashMap<String, Arc<LoadedClass>>>,
}

impl IsolatedEnvironment {
    pub(crate) fn root(bindings: HashMap<String, Arc<dyn ClassFactory>>) -> Self {
        Self::build(None, bindings, None, Arc::new(BTreeSet::new()))
    }

    pub(crate) fn isolated(
        library: Library,
        bindings: HashMap<String, Arc<dyn ClassFactory>>,
        parent: Arc<IsolatedEnvironment>,
        shared: Arc<BTreeSet<String>>,
    ) -> Self {
        Self::build(Some(library), bindings, Some(parent), shared)
    }

    fn build(
        library: Option<Library>,
        bindings: HashMap<String, Arc<dyn ClassFactory>>,
        parent: Option<Arc<IsolatedEnvironment>>,
        shared: Arc<BTreeSet<String>>,
    ) -> Self {
        Self {
            id: EnvironmentId(NEXT_ENVIRONMENT_ID.fetch_add(1, Ordering::Relaxed)),
            library,
            bindings,
            parent,
            shared,
            defined: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> EnvironmentId {
        self.id
    }

    /// The library this environment isolates; `None` for the root.
    pub fn library(&self) -> Option<&Library> {
        self.library.as_ref()
    }

    pub fn is_isolated(&self) -> bool {
        self.library.is_some()
    }

    pub fn parent(&self) -> Option<&Arc<IsolatedEnvironment>> {
        self.parent.as_ref()
    }

    /// Whether this environment's own bundles bind `name`.
    pub fn binds(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Class names bound by this environment's own bundles.
    pub fn bound_classes(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Resolve `name`, or `None` if neither this environment nor any parent
    /// can provide it.
    pub fn load_class(&self, name: &str) -> Option<Arc<LoadedClass>> {
        if let Some(class) = self.find_defined(name) {
            return Some(class);
        }

        if !self.shared.contains(name) {
            if let Some(factory) = self.bindings.get(name) {
                return Some(self.define(name, factory));
            }
        }

        match &self.parent {
            Some(parent) => parent.load_class(name),
            None => None,
        }
    }

    fn find_defined(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.defined
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    fn define(&self, name: &str, factory: &Arc<dyn ClassFactory>) -> Arc<LoadedClass> {
        let mut defined = self
            .defined
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let class = defined.entry(name.to_string()).or_insert_with(|| {
            tracing::trace!(class = name, environment = %self.id, "Defined class");
            Arc::new(LoadedClass {
                name: name.to_string(),
                defined_by: self.id,
                factory: Arc::clone(factory),
            })
        });
        Arc::clone(class)
    }
}

impl fmt::Display for IsolatedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.library {
            Some(library) => write!(f, "{} (library {})", self.id, library.id()),
            None => write!(f, "{} (root)", self.id),
        }
    }
}

impl fmt::Debug for IsolatedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedEnvironment")
            .field("id", &self.id)
            .field("library", &self.library.as_ref().map(Library::id))
            .field("bindings", &self.bindings.len())
            .field("shared", &self.shared)
            .finish()
    }
}
