//! Binds adapter calls to a context manager built from the host's
//! configuration.

use std::sync::Arc;

use crate::adapter::job::{JobContext, TaskAttemptContext};
use crate::configuration::Configuration;
use crate::context::{CallContext, CancellationToken, ContextManager};
use crate::error::Result;
use crate::library::LibraryManager;

/// What every adapter needs to rebuild its context manager per call.
///
/// The host hands each call only its job or task configuration, so the
/// registries are rebuilt from the snapshot carried inside it. Whatever the
/// call persists is copied back into that configuration afterwards.
#[derive(Debug, Clone)]
pub(crate) struct HostBinding {
    libraries: Arc<LibraryManager>,
    cancellation: CancellationToken,
}

impl HostBinding {
    pub(crate) fn new(libraries: Arc<LibraryManager>) -> Self {
        Self {
            libraries,
            cancellation: CancellationToken::new(),
        }
    }

    pub(crate) fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancellation = token;
    }

    pub(crate) fn libraries(&self) -> &Arc<LibraryManager> {
        &self.libraries
    }

    pub(crate) fn manager(&self, conf: &Configuration) -> Result<ContextManager> {
        Ok(
            ContextManager::from_configuration(conf.clone(), Arc::clone(&self.libraries))?
                .with_cancellation(self.cancellation.clone()),
        )
    }

    /// Run `op` for `spec_id` with a job context narrowed to the spec's
    /// merged configuration.
    pub(crate) fn in_job<T, F>(
        &self,
        manager: &ContextManager,
        job: &mut JobContext,
        spec_id: &str,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut JobContext, &CallContext<'_>) -> Result<T>,
    {
        let result = manager.run_in_scope(spec_id, |conf| job.with_configuration(conf), op);
        *job.configuration_mut() = manager.configuration();
        result
    }

    /// Run `op` for `spec_id` with a task context narrowed to the spec's
    /// merged configuration.
    pub(crate) fn in_task<T, F>(
        &self,
        manager: &ContextManager,
        task: &mut TaskAttemptContext,
        spec_id: &str,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut TaskAttemptContext, &CallContext<'_>) -> Result<T>,
    {
        let result = manager.run_in_scope(spec_id, |conf| task.with_configuration(conf), op);
        *task.configuration_mut() = manager.configuration();
        result
    }
}
