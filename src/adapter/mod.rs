//! Host-facing adapters.
//!
//! The host engine talks to these as if they were a single input and output
//! format. Each call rebuilds the context manager from the snapshot carried
//! in the job or task configuration, dispatches to the right spec's driver
//! inside its context, and copies persisted overlays back into the host's
//! configuration.

mod binding;
mod input;
mod job;
mod output;
mod split;

pub use input::{IsolatedInputFormat, IsolatedRecordReader};
pub use job::{JobContext, JobId, TaskAttemptContext, TaskAttemptId};
pub use output::{IsolatedOutputCommitter, IsolatedOutputFormat, TaskPhase};
pub use split::IsolatedSplit;
