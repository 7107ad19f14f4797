//! Validated, immutable registries built from a snapshot.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::configuration::Configuration;
use crate::error::{IsolationError, Result};
use crate::registry::declarations::{DriverDefinition, Library, Spec};
use crate::registry::snapshot::Snapshot;

fn lookup<'a, T>(map: &'a BTreeMap<String, T>, kind: &'static str, key: &str) -> Result<&'a T> {
    map.get(key).ok_or_else(|| IsolationError::NotFound {
        kind,
        key: key.to_string(),
        known: map.keys().cloned().collect(),
    })
}

/// A registered spec whose overlay grows as calls persist configuration.
#[derive(Debug)]
pub struct RegisteredSpec {
    id: String,
    driver: String,
    overlay: RwLock<BTreeMap<String, String>>,
}

impl RegisteredSpec {
    fn new(spec: Spec) -> Self {
        Self {
            id: spec.id().to_string(),
            driver: spec.driver().to_string(),
            overlay: RwLock::new(spec.overlay().clone()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Current overlay. Concurrent calls may observe it before or after a
    /// pending update.
    pub fn overlay(&self) -> BTreeMap<String, String> {
        self.overlay
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Merge `changes` into the overlay.
    pub(crate) fn record(&self, changes: &BTreeMap<String, String>) {
        let mut overlay = self
            .overlay
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for (key, value) in changes {
            overlay.insert(key.clone(), value.clone());
        }
    }

    pub fn to_spec(&self) -> Spec {
        Spec::from_parts(self.id.clone(), self.driver.clone(), self.overlay())
    }
}

/// Libraries, driver definitions and specs with every reference resolved.
#[derive(Debug)]
pub struct Registries {
    libraries: BTreeMap<String, Library>,
    drivers: BTreeMap<String, DriverDefinition>,
    specs: BTreeMap<String, Arc<RegisteredSpec>>,
    input_specs: Vec<String>,
    output_spec: Option<String>,
}

impl Registries {
    /// Validate `snapshot` and build the registries.
    ///
    /// Fails on duplicate ids and on any dangling reference, naming the
    /// missing id and the known ones.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let mut libraries = BTreeMap::new();
        for library in snapshot.libraries {
            library.validate()?;
            if libraries.contains_key(library.id()) {
                return Err(IsolationError::config(format!(
                    "library {} is declared twice",
                    library.id()
                )));
            }
            libraries.insert(library.id().to_string(), library);
        }

        let mut drivers = BTreeMap::new();
        for driver in snapshot.drivers {
            driver.validate()?;
            if let Some(library) = driver.library() {
                lookup(&libraries, "library", library)?;
            }
            if drivers.contains_key(driver.id()) {
                return Err(IsolationError::config(format!(
                    "driver definition {} is declared twice",
                    driver.id()
                )));
            }
            drivers.insert(driver.id().to_string(), driver);
        }

        let mut specs = BTreeMap::new();
        for spec in snapshot.specs {
            spec.validate()?;
            lookup(&drivers, "driver definition", spec.driver())?;
            if specs.contains_key(spec.id()) {
                return Err(IsolationError::config(format!(
                    "spec {} is declared twice",
                    spec.id()
                )));
            }
            specs.insert(spec.id().to_string(), Arc::new(RegisteredSpec::new(spec)));
        }

        for id in &snapshot.input_specs {
            lookup(&specs, "spec", id)?;
        }
        if let Some(id) = &snapshot.output_spec {
            lookup(&specs, "spec", id)?;
        }

        Ok(Self {
            libraries,
            drivers,
            specs,
            input_specs: snapshot.input_specs,
            output_spec: snapshot.output_spec,
        })
    }

    pub fn library(&self, id: &str) -> Result<&Library> {
        lookup(&self.libraries, "library", id)
    }

    pub fn driver(&self, id: &str) -> Result<&DriverDefinition> {
        lookup(&self.drivers, "driver definition", id)
    }

    pub fn spec(&self, id: &str) -> Result<Arc<RegisteredSpec>> {
        lookup(&self.specs, "spec", id).cloned()
    }

    /// The library owning `driver`, if it has one.
    pub fn library_of(&self, driver: &DriverDefinition) -> Result<Option<&Library>> {
        driver.library().map(|id| self.library(id)).transpose()
    }

    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        self.libraries.values()
    }

    pub fn drivers(&self) -> impl Iterator<Item = &DriverDefinition> {
        self.drivers.values()
    }

    pub fn specs(&self) -> impl Iterator<Item = &Arc<RegisteredSpec>> {
        self.specs.values()
    }

    pub fn input_spec_ids(&self) -> &[String] {
        &self.input_specs
    }

    pub fn output_spec_id(&self) -> Option<&str> {
        self.output_spec.as_deref()
    }

    /// The single output spec.
    pub fn output_spec(&self) -> Result<Arc<RegisteredSpec>> {
        match &self.output_spec {
            Some(id) => self.spec(id),
            None => Err(IsolationError::NotFound {
                kind: "output spec",
                key: "<unset>".to_string(),
                known: self.specs.keys().cloned().collect(),
            }),
        }
    }

    /// `global`, then the driver's defaults, then the spec's overlay.
    pub fn merged_configuration(&self, global: &Configuration, spec: &RegisteredSpec) -> Result<Configuration> {
        let driver = self.driver(spec.driver())?;
        let overlay = spec.overlay();
        Ok(Configuration::layered(global, [driver.defaults(), &overlay]))
    }

    /// Current declarations, including overlays persisted by calls so far.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            libraries: self.libraries.values().cloned().collect(),
            drivers: self.drivers.values().cloned().collect(),
            specs: self.specs.values().map(|spec| spec.to_spec()).collect(),
            input_specs: self.input_specs.clone(),
            output_spec: self.output_spec.clone(),
        }
    }
}
