//! Output side: output checks, record writers and the commit protocol, each
//! dispatched to the driver of the job's output spec.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::binding::HostBinding;
use crate::adapter::job::{JobContext, TaskAttemptContext, TaskAttemptId};
use crate::configuration::Configuration;
use crate::context::{CallContext, CancellationToken, ContextManager};
use crate::driver::{DriverError, OutputCommitter, OutputFormat, RecordWriter};
use crate::error::Result;
use crate::library::LibraryManager;

/// The output format the host engine sees.
#[derive(Debug, Clone)]
pub struct IsolatedOutputFormat {
    binding: HostBinding,
}

impl IsolatedOutputFormat {
    pub fn new(libraries: Arc<LibraryManager>) -> Self {
        Self {
            binding: HostBinding::new(libraries),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.binding.set_cancellation(token);
        self
    }

    pub fn check_output_specs(&self, job: &mut JobContext) -> Result<()> {
        let manager = self.binding.manager(job.configuration())?;
        let spec_id = output_spec_id(&manager)?;
        self.binding.in_job(&manager, job, &spec_id, |scoped, call| {
            Ok(output_format(scoped.configuration(), call)?.check_output_specs(scoped)?)
        })
    }

    /// The driver's writer. Writes are not context-switched.
    pub fn get_record_writer(&self, task: &mut TaskAttemptContext) -> Result<Box<dyn RecordWriter>> {
        let manager = self.binding.manager(task.configuration())?;
        let spec_id = output_spec_id(&manager)?;
        self.binding.in_task(&manager, task, &spec_id, |scoped, call| {
            Ok(output_format(scoped.configuration(), call)?.get_record_writer(scoped)?)
        })
    }

    pub fn get_output_committer(&self, task: &mut TaskAttemptContext) -> Result<IsolatedOutputCommitter> {
        let manager = self.binding.manager(task.configuration())?;
        let spec_id = output_spec_id(&manager)?;
        let inner = self.binding.in_task(&manager, task, &spec_id, |scoped, call| {
            Ok(output_format(scoped.configuration(), call)?.get_output_committer(scoped)?)
        })?;

        Ok(IsolatedOutputCommitter {
            spec_id,
            inner,
            binding: self.binding.clone(),
            job_setup: false,
            phases: HashMap::new(),
        })
    }
}

fn output_spec_id(manager: &ContextManager) -> Result<String> {
    Ok(manager.output_spec()?.id().to_string())
}

fn output_format(
    conf: &Configuration,
    call: &CallContext<'_>,
) -> Result<Box<dyn OutputFormat>> {
    call.new_instance(conf)
}

/// Where one task attempt stands in the commit protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Setup,
    Committed,
    Aborted,
}

impl TaskPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskPhase::Committed | TaskPhase::Aborted)
    }
}

/// Runs every commit stage in the output spec's context.
///
/// Stage ordering is the host's responsibility. Out-of-order calls are
/// logged and still forwarded to the driver. Only attempts between setup and
/// commit or abort are tracked, so one committer can serve any number of
/// attempts.
pub struct IsolatedOutputCommitter {
    spec_id: String,
    inner: Box<dyn OutputCommitter>,
    binding: HostBinding,
    job_setup: bool,
    phases: HashMap<TaskAttemptId, TaskPhase>,
}

impl IsolatedOutputCommitter {
    pub fn spec_id(&self) -> &str {
        &self.spec_id
    }

    /// Last completed stage of an attempt that is still in progress.
    pub fn phase(&self, attempt: &TaskAttemptId) -> Option<TaskPhase> {
        self.phases.get(attempt).copied()
    }

    /// Attempts set up and not yet committed or aborted.
    pub fn active_attempts(&self) -> usize {
        self.phases.len()
    }

    pub fn setup_job(&mut self, job: &mut JobContext) -> Result<()> {
        if self.job_setup {
            tracing::warn!(job = %job.job_id(), "Job set up twice");
        }
        let manager = self.binding.manager(job.configuration())?;
        let inner = &mut self.inner;
        self.binding
            .in_job(&manager, job, &self.spec_id, |scoped, _call| {
                Ok(inner.setup_job(scoped)?)
            })?;
        self.job_setup = true;
        Ok(())
    }

    pub fn setup_task(&mut self, task: &mut TaskAttemptContext) -> Result<()> {
        if !self.job_setup {
            tracing::warn!(attempt = %task.attempt_id(), "Task set up before job");
        }
        if let Some(phase) = self.phase(task.attempt_id()) {
            tracing::warn!(attempt = %task.attempt_id(), ?phase, "Task set up again");
        }
        self.run_task(task, |committer, scoped| committer.setup_task(scoped))?;
        self.phases.insert(task.attempt_id().clone(), TaskPhase::Setup);
        Ok(())
    }

    pub fn needs_task_commit(&mut self, task: &mut TaskAttemptContext) -> Result<bool> {
        self.expect_setup(task, "needs_task_commit");
        self.run_task(task, |committer, scoped| committer.needs_task_commit(scoped))
    }

    pub fn commit_task(&mut self, task: &mut TaskAttemptContext) -> Result<()> {
        self.expect_setup(task, "commit_task");
        self.run_task(task, |committer, scoped| committer.commit_task(scoped))?;
        self.finish(task.attempt_id(), TaskPhase::Committed);
        Ok(())
    }

    /// Abort `task`. The attempt stops being tracked even if the driver fails.
    pub fn abort_task(&mut self, task: &mut TaskAttemptContext) -> Result<()> {
        if self.phase(task.attempt_id()).is_none() {
            tracing::warn!(attempt = %task.attempt_id(), "Aborting a task that is not set up");
        }
        let result = self.run_task(task, |committer, scoped| committer.abort_task(scoped));
        self.finish(task.attempt_id(), TaskPhase::Aborted);
        result
    }

    fn finish(&mut self, attempt: &TaskAttemptId, phase: TaskPhase) {
        debug_assert!(phase.is_terminal());
        self.phases.remove(attempt);
        tracing::debug!(%attempt, ?phase, "Finished task");
    }

    fn expect_setup(&self, task: &TaskAttemptContext, stage: &str) {
        let phase = self.phase(task.attempt_id());
        if phase != Some(TaskPhase::Setup) {
            tracing::warn!(attempt = %task.attempt_id(), ?phase, stage, "Out-of-order commit stage");
        }
    }

    fn run_task<T, F>(&mut self, task: &mut TaskAttemptContext, stage: F) -> Result<T>
    where
        F: FnOnce(&mut dyn OutputCommitter, &mut TaskAttemptContext) -> std::result::Result<T, DriverError>,
    {
        let manager = self.binding.manager(task.configuration())?;
        let inner = &mut self.inner;
        self.binding
            .in_task(&manager, task, &self.spec_id, |scoped, _call| {
                Ok(stage(inner.as_mut(), scoped)?)
            })
    }
}

impl std::fmt::Debug for IsolatedOutputCommitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedOutputCommitter")
            .field("spec_id", &self.spec_id)
            .field("job_setup", &self.job_setup)
            .field("phases", &self.phases)
            .finish()
    }
}
