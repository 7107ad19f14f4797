//! Library, driver definition and spec declarations.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{IsolationError, Result};

/// Ids become segments of the flat key namespace and entries of the
/// comma separated input spec list.
pub(crate) fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(IsolationError::config(format!("{} id is empty", kind)));
    }
    if id.contains(['.', ',']) || id.chars().any(char::is_whitespace) {
        return Err(IsolationError::config(format!(
            "{} id '{}' must not contain '.', ',' or whitespace",
            kind, id
        )));
    }
    Ok(())
}

/// Location of one artifact bundle (a local path or a URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URI scheme, if the location has one.
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once(':')?;
        let valid = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.');
        // a single letter is a windows drive, not a scheme
        (valid && scheme.len() > 1).then_some(scheme)
    }

    /// Path on the local filesystem, for plain paths and `file:` URIs.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self.scheme() {
            None => Some(PathBuf::from(&self.0)),
            Some("file") => {
                let rest = &self.0["file:".len()..];
                let rest = rest.strip_prefix("//").unwrap_or(rest);
                Some(PathBuf::from(rest))
            }
            Some(_) => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<PathBuf> for Location {
    fn from(value: PathBuf) -> Self {
        Self::new(value.to_string_lossy().into_owned())
    }
}

/// A named, ordered set of artifact bundles forming one isolated environment.
///
/// Two libraries with the same id and artifacts are interchangeable: they map
/// to the same environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Library {
    id: String,
    artifacts: Vec<Location>,
}

impl Library {
    pub fn new<I, L>(id: impl Into<String>, artifacts: I) -> Result<Self>
    where
        I: IntoIterator<Item = L>,
        L: Into<Location>,
    {
        let library = Self {
            id: id.into(),
            artifacts: artifacts.into_iter().map(Into::into).collect(),
        };
        library.validate()?;
        Ok(library)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_id("library", &self.id)?;
        if self.artifacts.is_empty() {
            return Err(IsolationError::config(format!(
                "the library {} has no artifacts defined",
                self.id
            )));
        }
        for artifact in &self.artifacts {
            if artifact.as_str().is_empty() || artifact.as_str().chars().any(char::is_whitespace) {
                return Err(IsolationError::config(format!(
                    "library {} has an invalid artifact location '{}'",
                    self.id, artifact
                )));
            }
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn artifacts(&self) -> &[Location] {
        &self.artifacts
    }
}

/// Binds a logical driver name to an implementation class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDefinition {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    library: Option<String>,
    class_name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    defaults: BTreeMap<String, String>,
}

impl DriverDefinition {
    pub fn new(
        id: impl Into<String>,
        library: Option<&str>,
        class_name: impl Into<String>,
    ) -> Result<Self> {
        let definition = Self {
            id: id.into(),
            library: library.map(str::to_string),
            class_name: class_name.into(),
            defaults: BTreeMap::new(),
        };
        definition.validate()?;
        Ok(definition)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_id("driver definition", &self.id)?;
        if self.class_name.trim().is_empty() {
            return Err(IsolationError::config(format!(
                "driver definition {} has no class name",
                self.id
            )));
        }
        Ok(())
    }

    /// Add one default configuration entry.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Add default configuration entries given as `key=value` strings.
    pub fn with_properties<S: AsRef<str>>(mut self, properties: &[S]) -> Result<Self> {
        self.defaults.extend(parse_properties(properties)?);
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn library(&self) -> Option<&str> {
        self.library.as_deref()
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn defaults(&self) -> &BTreeMap<String, String> {
        &self.defaults
    }
}

/// A named call site: a driver definition plus instance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    id: String,
    driver: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    overlay: BTreeMap<String, String>,
}

impl Spec {
    pub fn new(id: impl Into<String>, driver: impl Into<String>) -> Result<Self> {
        let spec = Self {
            id: id.into(),
            driver: driver.into(),
            overlay: BTreeMap::new(),
        };
        spec.validate()?;
        Ok(spec)
    }

    pub(crate) fn from_parts(id: String, driver: String, overlay: BTreeMap<String, String>) -> Self {
        Self {
            id,
            driver,
            overlay,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        validate_id("spec", &self.id)?;
        if self.driver.is_empty() {
            return Err(IsolationError::config(format!(
                "spec {} references no driver definition",
                self.id
            )));
        }
        Ok(())
    }

    pub fn with_conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overlay.insert(key.into(), value.into());
        self
    }

    /// Add overlay entries given as `key=value` strings.
    pub fn with_properties<S: AsRef<str>>(mut self, properties: &[S]) -> Result<Self> {
        self.overlay.extend(parse_properties(properties)?);
        Ok(self)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn overlay(&self) -> &BTreeMap<String, String> {
        &self.overlay
    }
}

/// Parse `key=value` strings, splitting on the first `=`.
pub fn parse_properties<S: AsRef<str>>(properties: &[S]) -> Result<BTreeMap<String, String>> {
    properties
        .iter()
        .map(|property| {
            let property = property.as_ref();
            property
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| IsolationError::config(format!("{} should be key=value", property)))
        })
        .collect()
}
