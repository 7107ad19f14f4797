//! Input side: split enumeration across every input spec, and record readers
//! bound to the spec each split came from.

use std::sync::Arc;

use crate::adapter::binding::HostBinding;
use crate::adapter::job::{JobContext, TaskAttemptContext};
use crate::adapter::split::IsolatedSplit;
use crate::context::CancellationToken;
use crate::driver::{Datum, InputFormat, RecordReader};
use crate::error::Result;
use crate::library::LibraryManager;

/// The input format the host engine sees.
///
/// Dispatches to the driver of each input spec declared in the job's
/// configuration.
#[derive(Debug, Clone)]
pub struct IsolatedInputFormat {
    binding: HostBinding,
}

impl IsolatedInputFormat {
    pub fn new(libraries: Arc<LibraryManager>) -> Self {
        Self {
            binding: HostBinding::new(libraries),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.binding.set_cancellation(token);
        self
    }

    /// Enumerate the splits of every input spec, in declaration order.
    pub fn get_splits(&self, job: &mut JobContext) -> Result<Vec<IsolatedSplit>> {
        let manager = self.binding.manager(job.configuration())?;
        let mut splits = Vec::new();

        for spec_id in manager.input_specs() {
            let native = self.binding.in_job(&manager, job, spec_id, |scoped, call| {
                let format: Box<dyn InputFormat> = call.new_instance(scoped.configuration())?;
                Ok(format.get_splits(scoped)?)
            })?;

            tracing::info!(spec = %spec_id, splits = native.len(), "Enumerated splits");
            splits.extend(
                native
                    .into_iter()
                    .map(|split| IsolatedSplit::new(spec_id.as_str(), split)),
            );
        }

        Ok(splits)
    }

    /// Build a reader for `split` with its spec's driver.
    ///
    /// Only construction and [`IsolatedRecordReader::initialize`] run in
    /// context; the reader's other calls go straight to the driver.
    pub fn create_record_reader(
        &self,
        split: &IsolatedSplit,
        task: &mut TaskAttemptContext,
    ) -> Result<IsolatedRecordReader> {
        let manager = self.binding.manager(task.configuration())?;
        let inner = self
            .binding
            .in_task(&manager, task, split.spec_id(), |scoped, call| {
                let format: Box<dyn InputFormat> = call.new_instance(scoped.configuration())?;
                Ok(format.create_record_reader(split.native(), scoped)?)
            })?;

        Ok(IsolatedRecordReader {
            spec_id: split.spec_id().to_string(),
            inner,
            binding: self.binding.clone(),
        })
    }

    pub fn libraries(&self) -> &Arc<LibraryManager> {
        self.binding.libraries()
    }
}

/// A driver's record reader plus the spec it belongs to.
pub struct IsolatedRecordReader {
    spec_id: String,
    inner: Box<dyn RecordReader>,
    binding: HostBinding,
}

impl IsolatedRecordReader {
    pub fn spec_id(&self) -> &str {
        &self.spec_id
    }

    pub fn initialize(&mut self, split: &IsolatedSplit, task: &mut TaskAttemptContext) -> Result<()> {
        let manager = self.binding.manager(task.configuration())?;
        let inner = &mut self.inner;
        self.binding
            .in_task(&manager, task, &self.spec_id, |scoped, _call| {
                Ok(inner.initialize(split.native(), scoped)?)
            })
    }

    pub fn next_key_value(&mut self) -> Result<bool> {
        Ok(self.inner.next_key_value()?)
    }

    pub fn current_key(&self) -> Result<Datum> {
        Ok(self.inner.current_key()?)
    }

    pub fn current_value(&self) -> Result<Datum> {
        Ok(self.inner.current_value()?)
    }

    pub fn progress(&self) -> Result<f32> {
        Ok(self.inner.progress()?)
    }

    pub fn close(&mut self) -> Result<()> {
        Ok(self.inner.close()?)
    }
}

impl std::fmt::Debug for IsolatedRecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedRecordReader")
            .field("spec_id", &self.spec_id)
            .finish()
    }
}
