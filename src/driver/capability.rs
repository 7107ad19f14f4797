//! Capability traits every data format driver implements.
//!
//! The core never implements driver logic. It only instantiates drivers by
//! class name inside the right environment and dispatches to these traits.

use std::any::Any;
use std::fmt;
use std::io::{Read, Write};

use crate::adapter::{JobContext, TaskAttemptContext};
use crate::configuration::Configuration;

/// A record key or value as exchanged with the host engine.
pub type Datum = serde_json::Value;

/// Error raised by driver code.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unexpected split type: expected {expected}, found {found}")]
    UnexpectedSplit { expected: String, found: String },

    #[error("Driver failed: {0}")]
    Failed(String),

    /// The driver observed a cancellation request.
    #[error("Interrupted")]
    Interrupted,
}

/// Enumerates splits and builds record readers.
pub trait InputFormat: Send + Sync {
    /// Enumerate the units of work for this input.
    ///
    /// The job's configuration is the merged configuration of the spec; keys
    /// set here are persisted into the spec's overlay.
    fn get_splits(&self, job: &mut JobContext) -> Result<Vec<Box<dyn InputSplit>>, DriverError>;

    /// Build a reader for one of this format's splits.
    fn create_record_reader(
        &self,
        split: &dyn InputSplit,
        task: &mut TaskAttemptContext,
    ) -> Result<Box<dyn RecordReader>, DriverError>;
}

/// Driver-owned description of a unit of work.
pub trait InputSplit: fmt::Debug + Send + Sync {
    /// Class name this split is registered under, used to rehydrate it.
    fn class_name(&self) -> &str;

    /// Size of the split, in bytes or records.
    fn length(&self) -> u64;

    /// Hosts where the split's data is local.
    fn locations(&self) -> Vec<String> {
        Vec::new()
    }

    /// Serialize this split's own fields.
    fn write(&self, out: &mut dyn Write) -> std::io::Result<()>;

    /// Restore fields written by [`InputSplit::write`] into a fresh instance.
    fn read_fields(&mut self, input: &mut dyn Read) -> std::io::Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Reads key/value records from one split.
pub trait RecordReader: Send {
    fn initialize(
        &mut self,
        split: &dyn InputSplit,
        task: &mut TaskAttemptContext,
    ) -> Result<(), DriverError>;

    fn next_key_value(&mut self) -> Result<bool, DriverError>;

    fn current_key(&self) -> Result<Datum, DriverError>;

    fn current_value(&self) -> Result<Datum, DriverError>;

    /// Fraction of the split consumed, from 0.0 to 1.0.
    fn progress(&self) -> Result<f32, DriverError>;

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Validates output, builds record writers and commits output.
pub trait OutputFormat: Send + Sync {
    fn check_output_specs(&self, job: &mut JobContext) -> Result<(), DriverError>;

    fn get_record_writer(
        &self,
        task: &mut TaskAttemptContext,
    ) -> Result<Box<dyn RecordWriter>, DriverError>;

    fn get_output_committer(
        &self,
        task: &mut TaskAttemptContext,
    ) -> Result<Box<dyn OutputCommitter>, DriverError>;
}

/// Writes key/value records for one task attempt.
pub trait RecordWriter: Send {
    fn write(&mut self, key: &Datum, value: &Datum) -> Result<(), DriverError>;

    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Job and task commit protocol.
///
/// The host calls `setup_job` once before any task runs, then per task
/// attempt `setup_task` followed by `commit_task` (when `needs_task_commit`
/// says so) or `abort_task`.
pub trait OutputCommitter: Send {
    fn setup_job(&mut self, job: &mut JobContext) -> Result<(), DriverError>;

    fn setup_task(&mut self, task: &mut TaskAttemptContext) -> Result<(), DriverError>;

    fn needs_task_commit(&mut self, task: &mut TaskAttemptContext) -> Result<bool, DriverError>;

    fn commit_task(&mut self, task: &mut TaskAttemptContext) -> Result<(), DriverError>;

    fn abort_task(&mut self, task: &mut TaskAttemptContext) -> Result<(), DriverError>;
}

/// A freshly constructed driver object.
pub enum Instance {
    InputFormat(Box<dyn InputFormat>),
    OutputFormat(Box<dyn OutputFormat>),
    Split(Box<dyn InputSplit>),
}

impl Instance {
    /// Capability name of the wrapped object.
    pub fn kind(&self) -> &'static str {
        match self {
            Instance::InputFormat(_) => <Box<dyn InputFormat> as Capability>::NAME,
            Instance::OutputFormat(_) => <Box<dyn OutputFormat> as Capability>::NAME,
            Instance::Split(_) => <Box<dyn InputSplit> as Capability>::NAME,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance").field(&self.kind()).finish()
    }
}

/// A capability an [`Instance`] can be checked against.
pub trait Capability: Sized {
    const NAME: &'static str;

    /// Take the capability out of `instance`, or hand it back unchanged.
    fn from_instance(instance: Instance) -> Result<Self, Instance>;
}

impl Capability for Box<dyn InputFormat> {
    const NAME: &'static str = "input format";

    fn from_instance(instance: Instance) -> Result<Self, Instance> {
        match instance {
            Instance::InputFormat(format) => Ok(format),
            other => Err(other),
        }
    }
}

impl Capability for Box<dyn OutputFormat> {
    const NAME: &'static str = "output format";

    fn from_instance(instance: Instance) -> Result<Self, Instance> {
        match instance {
            Instance::OutputFormat(format) => Ok(format),
            other => Err(other),
        }
    }
}

impl Capability for Box<dyn InputSplit> {
    const NAME: &'static str = "input split";

    fn from_instance(instance: Instance) -> Result<Self, Instance> {
        match instance {
            Instance::Split(split) => Ok(split),
            other => Err(other),
        }
    }
}

/// Constructs driver objects from a configuration.
pub trait ClassFactory: Send + Sync {
    fn new_instance(&self, conf: &Configuration) -> Result<Instance, DriverError>;
}

impl<F> ClassFactory for F
where
    F: Fn(&Configuration) -> Result<Instance, DriverError> + Send + Sync,
{
    fn new_instance(&self, conf: &Configuration) -> Result<Instance, DriverError> {
        self(conf)
    }
}

/// Downcast a split to the driver's own concrete type.
///
/// A split produced by another version of the driver is a different type
/// and fails here.
pub fn downcast_split<'a, S: Any>(split: &'a dyn InputSplit, expected: &str) -> Result<&'a S, DriverError> {
    split
        .as_any()
        .downcast_ref::<S>()
        .ok_or_else(|| DriverError::UnexpectedSplit {
            expected: expected.to_string(),
            found: split.class_name().to_string(),
        })
}
