//! Context manager: resolves a spec to its environment and merged
//! configuration, runs an operation inside that context, and persists the
//! configuration the operation changed back into the spec.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::configuration::Configuration;
use crate::context::cancel::CancellationToken;
use crate::context::scope;
use crate::driver::{Capability, DriverError};
use crate::error::{IsolationError, Result};
use crate::library::{IsolatedEnvironment, LibraryManager};
use crate::registry::{DriverDefinition, RegisteredSpec, Registries, Snapshot, SnapshotKeys};

/// Runs driver operations inside the context of a spec.
///
/// Registries are fixed at construction. The only state that changes
/// afterwards is each spec's overlay and the global configuration it is
/// published into.
pub struct ContextManager {
    global: RwLock<Configuration>,
    keys: SnapshotKeys,
    registries: Registries,
    libraries: Arc<LibraryManager>,
    cancellation: CancellationToken,
}

impl ContextManager {
    /// Build from a host configuration carrying a flat snapshot under the
    /// library manager's key prefix.
    pub fn from_configuration(global: Configuration, libraries: Arc<LibraryManager>) -> Result<Self> {
        let keys = SnapshotKeys::new(libraries.settings().key_prefix.clone());
        let snapshot = keys.read(&global)?;
        Self::build(global, keys, snapshot, libraries)
    }

    /// Build from declarations, writing them into `global` so the snapshot
    /// travels with the configuration.
    pub fn from_snapshot(
        mut global: Configuration,
        snapshot: Snapshot,
        libraries: Arc<LibraryManager>,
    ) -> Result<Self> {
        let keys = SnapshotKeys::new(libraries.settings().key_prefix.clone());
        keys.write(&snapshot, &mut global);
        Self::build(global, keys, snapshot, libraries)
    }

    fn build(
        global: Configuration,
        keys: SnapshotKeys,
        snapshot: Snapshot,
        libraries: Arc<LibraryManager>,
    ) -> Result<Self> {
        let registries = Registries::from_snapshot(snapshot)?;
        tracing::debug!(
            libraries = registries.libraries().count(),
            drivers = registries.drivers().count(),
            specs = registries.specs().count(),
            "Built registries"
        );
        Ok(Self {
            global: RwLock::new(global),
            keys,
            registries,
            libraries,
            cancellation: CancellationToken::new(),
        })
    }

    /// Observe `token` in every call made through this manager.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn libraries(&self) -> &Arc<LibraryManager> {
        &self.libraries
    }

    pub fn keys(&self) -> &SnapshotKeys {
        &self.keys
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Global configuration, including every overlay persisted so far.
    pub fn configuration(&self) -> Configuration {
        self.global
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Declarations with their current overlays.
    pub fn snapshot(&self) -> Snapshot {
        self.registries.snapshot()
    }

    pub fn input_specs(&self) -> &[String] {
        self.registries.input_spec_ids()
    }

    pub fn output_spec(&self) -> Result<Arc<RegisteredSpec>> {
        self.registries.output_spec()
    }

    /// The configuration a call for `spec_id` would receive right now.
    pub fn merged_configuration(&self, spec_id: &str) -> Result<Configuration> {
        let spec = self.registries.spec(spec_id)?;
        self.registries
            .merged_configuration(&self.configuration(), &spec)
    }

    /// Resolve the environment of every declared library, failing on the
    /// first invalid artifact.
    pub fn load_libraries(&self) -> Result<()> {
        for library in self.registries.libraries() {
            self.libraries.environment(Some(library))?;
        }
        Ok(())
    }

    /// Run `op` in the context of `spec_id`.
    ///
    /// `op` receives a fresh merged configuration (global, then driver
    /// defaults, then the spec's overlay) while the spec's environment is
    /// current on this thread. Keys `op` adds or changes are recorded into the
    /// spec's overlay whether `op` succeeds or fails. The previous
    /// environment is restored on every exit path, including panics.
    pub fn run_in_context<T, F>(&self, spec_id: &str, op: F) -> Result<T>
    where
        F: FnOnce(&mut Configuration, &CallContext<'_>) -> Result<T>,
    {
        let spec = self.registries.spec(spec_id)?;
        let driver = self.registries.driver(spec.driver())?;
        let environment = self
            .libraries
            .environment(self.registries.library_of(driver)?)?;

        let span = tracing::debug_span!(
            "run_in_context",
            spec = %spec.id(),
            driver = %driver.id(),
            environment = %environment.id()
        );
        let _entered = span.enter();

        if self.cancellation.is_cancelled() {
            return Err(IsolationError::Cancelled {
                spec_id: spec_id.to_string(),
            });
        }

        let before = self
            .registries
            .merged_configuration(&self.configuration(), &spec)?;
        let mut conf = before.clone();

        let call = CallContext {
            manager: self,
            spec: &spec,
            driver,
            environment: Arc::clone(&environment),
        };

        let result = {
            let _guard = scope::enter(environment);
            op(&mut conf, &call)
        };

        let changes = conf.changed_since(&before);
        if !changes.is_empty() {
            spec.record(&changes);
            self.publish(spec.id(), &changes);
            tracing::debug!(
                keys = ?changes.keys().collect::<Vec<_>>(),
                "Persisted configuration changes"
            );
        }

        match result {
            Err(IsolationError::Driver(DriverError::Interrupted)) => {
                tracing::warn!("Driver call interrupted");
                Err(IsolationError::Cancelled {
                    spec_id: spec_id.to_string(),
                })
            }
            Ok(_) if self.cancellation.is_cancelled() => {
                tracing::warn!("Cancelled while driver call was running");
                Err(IsolationError::Cancelled {
                    spec_id: spec_id.to_string(),
                })
            }
            other => other,
        }
    }

    /// Run `op` against a narrower view of the merged configuration.
    ///
    /// `narrow` builds the view (a job or task context) from the merged
    /// configuration; converting the view back after `op` returns is what
    /// lets mutations made through it propagate into the spec.
    pub fn run_in_scope<S, T, N, F>(&self, spec_id: &str, narrow: N, op: F) -> Result<T>
    where
        S: Into<Configuration>,
        N: FnOnce(Configuration) -> S,
        F: FnOnce(&mut S, &CallContext<'_>) -> Result<T>,
    {
        self.run_in_context(spec_id, |conf, call| {
            let mut scoped = narrow(std::mem::take(conf));
            let result = op(&mut scoped, call);
            *conf = scoped.into();
            result
        })
    }

    /// Instantiate an arbitrary class by name inside the context of
    /// `spec_id`.
    pub fn new_instance<T: Capability>(&self, spec_id: &str, class_name: &str) -> Result<T> {
        self.run_in_context(spec_id, |conf, call| call.load_instance(class_name, conf))
    }

    fn publish(&self, spec_id: &str, changes: &BTreeMap<String, String>) {
        let mut global = self
            .global
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.keys.write_spec_conf(spec_id, changes, &mut global);
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("prefix", &self.keys.prefix())
            .field("registries", &self.registries)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// What an operation running in context knows about its call.
pub struct CallContext<'a> {
    manager: &'a ContextManager,
    spec: &'a RegisteredSpec,
    driver: &'a DriverDefinition,
    environment: Arc<IsolatedEnvironment>,
}

impl<'a> CallContext<'a> {
    pub fn spec_id(&self) -> &'a str {
        self.spec.id()
    }

    pub fn driver(&self) -> &'a DriverDefinition {
        self.driver
    }

    pub fn environment(&self) -> &Arc<IsolatedEnvironment> {
        &self.environment
    }

    pub fn manager(&self) -> &'a ContextManager {
        self.manager
    }

    pub fn is_cancelled(&self) -> bool {
        self.manager.cancellation.is_cancelled()
    }

    /// Fail with a cancellation error if cancellation was requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(IsolationError::Cancelled {
                spec_id: self.spec.id().to_string(),
            });
        }
        Ok(())
    }

    /// Instantiate the driver's implementation class.
    pub fn new_instance<T: Capability>(&self, conf: &Configuration) -> Result<T> {
        self.load_instance(self.driver.class_name(), conf)
    }

    /// Instantiate `class_name` through the thread's current environment and
    /// check it provides capability `T`.
    pub fn load_instance<T: Capability>(&self, class_name: &str, conf: &Configuration) -> Result<T> {
        let environment =
            scope::current_environment().unwrap_or_else(|| self.manager.libraries.root());

        let class = environment
            .load_class(class_name)
            .ok_or_else(|| self.resolution_error(class_name, format!("not found in {}", environment)))?;

        let instance = class.new_instance(conf)?;
        T::from_instance(instance).map_err(|other| {
            self.resolution_error(
                class_name,
                format!("expected {}, found {}", T::NAME, other.kind()),
            )
        })
    }

    fn resolution_error(&self, class_name: &str, reason: String) -> IsolationError {
        IsolationError::ClassResolution {
            class_name: class_name.to_string(),
            spec_id: self.spec.id().to_string(),
            reason,
        }
    }
}

impl std::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("spec", &self.spec.id())
            .field("driver", &self.driver.id())
            .field("environment", &self.environment.id())
            .finish()
    }
}
