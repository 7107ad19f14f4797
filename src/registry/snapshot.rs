//! Declarative job snapshot and its flat key/value encoding.
//!
//! The snapshot travels with the job inside the host's configuration. Keys:
//!
//! ```text
//! <prefix>.library.<id>.paths        space separated artifact locations
//! <prefix>.class.<id>.name           implementation class name
//! <prefix>.class.<id>.library        owning library (optional)
//! <prefix>.class.<id>.conf.<key>     driver default configuration
//! <prefix>.spec.<id>.class           driver definition id
//! <prefix>.spec.<id>.conf.<key>      spec overlay configuration
//! <prefix>.inputspecs                comma separated input spec ids
//! <prefix>.outputspec                output spec id
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::configuration::Configuration;
use crate::error::{IsolationError, Result};
use crate::registry::declarations::{DriverDefinition, Library, Location, Spec};

/// Every declaration a job needs, independent of any live process state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub libraries: Vec<Library>,
    #[serde(default)]
    pub drivers: Vec<DriverDefinition>,
    #[serde(default)]
    pub specs: Vec<Spec>,
    #[serde(default)]
    pub input_specs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_spec: Option<String>,
}

impl Snapshot {
    /// Declarations sorted by id; input order is kept.
    pub fn normalized(&self) -> Snapshot {
        let mut normalized = self.clone();
        normalized.libraries.sort_by(|a, b| a.id().cmp(b.id()));
        normalized.drivers.sort_by(|a, b| a.id().cmp(b.id()));
        normalized.specs.sort_by(|a, b| a.id().cmp(b.id()));
        normalized
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.normalized(), other.normalized());
        a.libraries == b.libraries
            && a.drivers == b.drivers
            && a.specs == b.specs
            && a.input_specs == b.input_specs
            && a.output_spec == b.output_spec
    }
}

impl Eq for Snapshot {}

/// Builds and parses keys of the flat snapshot namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotKeys {
    prefix: String,
}

impl SnapshotKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, parts: &[&str]) -> String {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push('.');
            key.push_str(part);
        }
        key
    }

    pub fn library_paths(&self, id: &str) -> String {
        self.key(&["library", id, "paths"])
    }

    pub fn driver_class(&self, id: &str) -> String {
        self.key(&["class", id, "name"])
    }

    pub fn driver_library(&self, id: &str) -> String {
        self.key(&["class", id, "library"])
    }

    pub fn driver_conf(&self, id: &str, key: &str) -> String {
        self.key(&["class", id, "conf", key])
    }

    pub fn spec_driver(&self, id: &str) -> String {
        self.key(&["spec", id, "class"])
    }

    pub fn spec_conf(&self, id: &str, key: &str) -> String {
        self.key(&["spec", id, "conf", key])
    }

    pub fn input_specs(&self) -> String {
        self.key(&["inputspecs"])
    }

    pub fn output_spec(&self) -> String {
        self.key(&["outputspec"])
    }

    /// Write every declaration of `snapshot` into `conf`.
    pub fn write(&self, snapshot: &Snapshot, conf: &mut Configuration) {
        for library in &snapshot.libraries {
            let paths = library
                .artifacts()
                .iter()
                .map(Location::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            conf.set(self.library_paths(library.id()), paths);
        }

        for driver in &snapshot.drivers {
            conf.set(self.driver_class(driver.id()), driver.class_name());
            if let Some(library) = driver.library() {
                conf.set(self.driver_library(driver.id()), library);
            }
            for (key, value) in driver.defaults() {
                conf.set(self.driver_conf(driver.id(), key), value.as_str());
            }
        }

        for spec in &snapshot.specs {
            self.write_spec(spec, conf);
        }

        conf.set(self.input_specs(), snapshot.input_specs.join(","));
        if let Some(output) = &snapshot.output_spec {
            conf.set(self.output_spec(), output.as_str());
        }
    }

    /// Write one spec, used when a spec's overlay changed.
    pub fn write_spec(&self, spec: &Spec, conf: &mut Configuration) {
        conf.set(self.spec_driver(spec.id()), spec.driver());
        self.write_spec_conf(spec.id(), spec.overlay(), conf);
    }

    pub fn write_spec_conf(&self, id: &str, entries: &BTreeMap<String, String>, conf: &mut Configuration) {
        for (key, value) in entries {
            conf.set(self.spec_conf(id, key), value.as_str());
        }
    }

    /// Read every declaration back out of `conf`.
    pub fn read(&self, conf: &Configuration) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();

        for id in self.ids(conf, "library") {
            let paths = conf.get(&self.library_paths(&id)).unwrap_or_default();
            let library = Library::new(id.as_str(), paths.split_whitespace())?;
            snapshot.libraries.push(library);
        }

        for id in self.ids(conf, "class") {
            let class_name = conf.get(&self.driver_class(&id)).ok_or_else(|| {
                IsolationError::config(format!(
                    "{} is not set",
                    self.driver_class(&id)
                ))
            })?;
            let library = conf.get(&self.driver_library(&id));
            let mut driver = DriverDefinition::new(id.as_str(), library, class_name)?;
            for (key, value) in self.conf_entries(conf, &["class", &id]) {
                driver = driver.with_default(key, value);
            }
            snapshot.drivers.push(driver);
        }

        for id in self.ids(conf, "spec") {
            let driver = conf.get(&self.spec_driver(&id)).ok_or_else(|| {
                IsolationError::config(format!("{} is not set", self.spec_driver(&id)))
            })?;
            let spec = Spec::from_parts(
                id.clone(),
                driver.to_string(),
                self.conf_entries(conf, &["spec", &id]),
            );
            spec.validate()?;
            snapshot.specs.push(spec);
        }

        snapshot.input_specs = conf
            .get(&self.input_specs())
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        snapshot.output_spec = conf
            .get(&self.output_spec())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Ok(snapshot)
    }

    /// Ids declared under `<prefix>.<kind>.<id>.<...>`.
    fn ids(&self, conf: &Configuration, kind: &str) -> BTreeSet<String> {
        let base = self.key(&[kind, ""]);
        conf.with_prefix(&base)
            .filter_map(|(rest, _)| rest.split_once('.').map(|(id, _)| id.to_string()))
            .filter(|id| !id.is_empty())
            .collect()
    }

    fn conf_entries(&self, conf: &Configuration, parts: &[&str]) -> BTreeMap<String, String> {
        let mut base_parts = parts.to_vec();
        base_parts.extend(["conf", ""]);
        let base = self.key(&base_parts);
        conf.with_prefix(&base)
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

impl Default for SnapshotKeys {
    fn default() -> Self {
        Self::new(crate::settings::DEFAULT_KEY_PREFIX)
    }
}
