//! Process-wide isolation settings.

use std::collections::BTreeSet;

/// Default prefix of the flat snapshot namespace.
pub const DEFAULT_KEY_PREFIX: &str = "isolated";

/// Settings shared by every context manager in the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationSettings {
    /// Prefix of the flat snapshot namespace (`<prefix>.spec.<id>.class`, ...).
    pub key_prefix: String,
    /// Class names that must exist exactly once per process.
    ///
    /// Isolated environments never define these; they always resolve them
    /// through the root environment.
    pub shared_classes: BTreeSet<String>,
}

impl Default for IsolationSettings {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            shared_classes: BTreeSet::new(),
        }
    }
}

impl IsolationSettings {
    /// Load settings from `ISOLATED_KEY_PREFIX` and `ISOLATED_SHARED_CLASSES`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(prefix) = lookup("ISOLATED_KEY_PREFIX") {
            let prefix = prefix.trim().trim_end_matches('.');
            if !prefix.is_empty() {
                settings.key_prefix = prefix.to_string();
            }
        }

        if let Some(shared) = lookup("ISOLATED_SHARED_CLASSES") {
            settings.shared_classes = shared
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        settings
    }

    /// Declare a shared class name.
    pub fn with_shared_class(mut self, name: impl Into<String>) -> Self {
        self.shared_classes.insert(name.into());
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = IsolationSettings::default();
        assert_eq!(settings.key_prefix, "isolated");
        assert!(settings.shared_classes.is_empty());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ISOLATED_KEY_PREFIX", "com.acme.isolated."),
            ("ISOLATED_SHARED_CLASSES", " log.Facade, ,metrics.Registry"),
        ]);
        let settings = IsolationSettings::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.key_prefix, "com.acme.isolated");
        assert_eq!(
            settings.shared_classes.into_iter().collect::<Vec<_>>(),
            vec!["log.Facade".to_string(), "metrics.Registry".to_string()]
        );
    }

    #[test]
    fn test_blank_prefix_keeps_default() {
        let settings = IsolationSettings::from_lookup(|key| {
            (key == "ISOLATED_KEY_PREFIX").then(|| "  ".to_string())
        });
        assert_eq!(settings.key_prefix, DEFAULT_KEY_PREFIX);
    }
}
