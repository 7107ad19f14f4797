//! Memoized environments, one per distinct library.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use crate::driver::{ClassFactory, DriverCatalog};
use crate::error::{IsolationError, Result};
use crate::library::artifact::{ArtifactManifest, ArtifactStager, LocalStager, validate_artifact};
use crate::library::environment::IsolatedEnvironment;
use crate::registry::Library;
use crate::settings::IsolationSettings;

/// Hands out the environment for a library.
///
/// Equal libraries always get the identical environment; a second
/// environment for the same library would define a second, incompatible copy
/// of each of its classes. Environments live as long as the manager.
pub struct LibraryManager {
    settings: IsolationSettings,
    catalog: Arc<DriverCatalog>,
    stager: Arc<dyn ArtifactStager>,
    shared: Arc<BTreeSet<String>>,
    root: OnceLock<Arc<IsolatedEnvironment>>,
    environments: Mutex<HashMap<Library, Arc<EnvironmentSlot>>>,
}

/// Cache entry for one library. `building` serialises construction of this
/// library only; finished environments are read without locking.
#[derive(Default)]
struct EnvironmentSlot {
    environment: OnceLock<Arc<IsolatedEnvironment>>,
    building: Mutex<()>,
}

impl LibraryManager {
    /// Create a manager staging artifacts with [`LocalStager`].
    pub fn new(settings: IsolationSettings, catalog: Arc<DriverCatalog>) -> Self {
        Self::with_stager(settings, catalog, Arc::new(LocalStager))
    }

    pub fn with_stager(
        settings: IsolationSettings,
        catalog: Arc<DriverCatalog>,
        stager: Arc<dyn ArtifactStager>,
    ) -> Self {
        let shared = Arc::new(settings.shared_classes.clone());
        Self {
            settings,
            catalog,
            stager,
            shared,
            root: OnceLock::new(),
            environments: Mutex::new(HashMap::new()),
        }
    }

    /// The manager shared by the whole process, using the global catalog and
    /// settings from the environment.
    pub fn global() -> Arc<LibraryManager> {
        static GLOBAL: OnceLock<Arc<LibraryManager>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| {
            Arc::new(LibraryManager::new(
                IsolationSettings::from_env(),
                DriverCatalog::global(),
            ))
        }))
    }

    pub fn settings(&self) -> &IsolationSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Arc<DriverCatalog> {
        &self.catalog
    }

    /// The enclosing, non-isolated environment.
    ///
    /// It binds the catalog's builtin classes as registered at first use.
    pub fn root(&self) -> Arc<IsolatedEnvironment> {
        Arc::clone(self.root.get_or_init(|| {
            let root = IsolatedEnvironment::root(self.catalog.builtin_classes());
            tracing::debug!(environment = %root, "Created root environment");
            Arc::new(root)
        }))
    }

    /// The environment for `library`, creating it on first use.
    ///
    /// `None` maps to the root environment.
    pub fn environment(&self, library: Option<&Library>) -> Result<Arc<IsolatedEnvironment>> {
        let Some(library) = library else {
            return Ok(self.root());
        };

        let slot = {
            let mut environments = self
                .environments
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(environments.entry(library.clone()).or_default())
        };

        if let Some(environment) = slot.environment.get() {
            return Ok(Arc::clone(environment));
        }

        let _building = slot
            .building
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(environment) = slot.environment.get() {
            return Ok(Arc::clone(environment));
        }

        let environment = Arc::new(self.build(library)?);
        tracing::info!(
            library = library.id(),
            environment = %environment.id(),
            artifacts = library.artifacts().len(),
            classes = environment.bound_classes().count(),
            "Created isolated environment"
        );
        Ok(Arc::clone(slot.environment.get_or_init(|| environment)))
    }

    /// Number of isolated environments created so far.
    pub fn environment_count(&self) -> usize {
        self.environments
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|slot| slot.environment.get().is_some())
            .count()
    }

    fn build(&self, library: &Library) -> Result<IsolatedEnvironment> {
        let mut bindings: HashMap<String, Arc<dyn ClassFactory>> = HashMap::new();

        for location in library.artifacts() {
            let path = self.stager.stage(location)?;
            validate_artifact(location, &path)?;
            let manifest = ArtifactManifest::read(location, &path)?;

            for (class_name, symbol) in manifest.classes {
                let factory = self.catalog.bundled(&symbol).ok_or_else(|| {
                    IsolationError::invalid_artifact(
                        location.as_str(),
                        format!("class {} is bound to unknown symbol {}", class_name, symbol),
                    )
                })?;
                // earlier artifacts win, like a search path
                bindings.entry(class_name).or_insert(factory);
            }
        }

        Ok(IsolatedEnvironment::isolated(
            library.clone(),
            bindings,
            self.root(),
            Arc::clone(&self.shared),
        ))
    }
}

impl std::fmt::Debug for LibraryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryManager")
            .field("settings", &self.settings)
            .field("catalog", &self.catalog)
            .field("environments", &self.environment_count())
            .finish()
    }
}
