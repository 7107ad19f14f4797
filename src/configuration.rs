//! Flat string key/value configuration.
//!
//! This is the only configuration surface drivers see. Merged configurations
//! are layered from the global configuration, a driver's defaults and a spec's
//! overlay, with later layers winning.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A flat, ordered mapping of string keys to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    entries: BTreeMap<String, String>,
}

impl Configuration {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Layer `overlays` on top of `base`, last write per key wins.
    pub fn layered<'a, I>(base: &Configuration, overlays: I) -> Self
    where
        I: IntoIterator<Item = &'a BTreeMap<String, String>>,
    {
        let mut merged = base.clone();
        for overlay in overlays {
            merged.apply(overlay);
        }
        merged
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Get a value or fall back to `default`.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn unset(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Write every entry of `overlay` into this configuration.
    pub fn apply(&mut self, overlay: &BTreeMap<String, String>) {
        for (key, value) in overlay {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Entries whose key starts with `prefix`, with the prefix stripped.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.entries
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(move |(k, v)| (&k[prefix.len()..], v.as_str()))
    }

    /// Entries that are new or hold a different value compared to `before`.
    ///
    /// Keys removed since `before` are not reported.
    pub fn changed_since(&self, before: &Configuration) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter(|(key, value)| before.entries.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn into_map(self) -> BTreeMap<String, String> {
        self.entries
    }
}

impl From<BTreeMap<String, String>> for Configuration {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Configuration {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.entries.insert(k.into(), v.into());
        }
    }
}
