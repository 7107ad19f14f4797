//! Run several data format drivers, each shipped with its own and possibly
//! conflicting dependencies, side by side in one process.
//!
//! Every driver call is bound to a *spec*: a driver definition plus instance
//! configuration. The [`ContextManager`] resolves the spec to the isolated
//! environment of the driver's library and a merged configuration, runs the
//! call with that environment current, and records any configuration the
//! driver changed back into the spec so the call can be replayed in another
//! process from the same declarative snapshot.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use isolated::{Configuration, ContextManager, LibraryManager};
//!
//! # fn main() -> isolated::Result<()> {
//! let conf = Configuration::from_iter([
//!     ("isolated.library.parquet.paths", "/jars/parquet-1.4.zip"),
//!     ("isolated.class.pq.name", "parquet.hadoop.ParquetInputFormat"),
//!     ("isolated.class.pq.library", "parquet"),
//!     ("isolated.spec.events.class", "pq"),
//!     ("isolated.spec.events.conf.path", "/data/events"),
//!     ("isolated.inputspecs", "events"),
//! ]);
//! let manager = ContextManager::from_configuration(conf, LibraryManager::global())?;
//! let path = manager.run_in_context("events", |conf, _call| {
//!     Ok(conf.get("path").map(str::to_string))
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cli;
pub mod configuration;
pub mod context;
pub mod driver;
pub mod error;
pub mod library;
pub mod registry;
pub mod settings;

pub use adapter::{
    IsolatedInputFormat, IsolatedOutputCommitter, IsolatedOutputFormat, IsolatedRecordReader,
    IsolatedSplit, JobContext, JobId, TaskAttemptContext, TaskAttemptId, TaskPhase,
};
pub use configuration::Configuration;
pub use context::{CallContext, CancellationToken, ContextManager, current_environment};
pub use driver::{
    Capability, ClassFactory, Datum, DriverCatalog, DriverError, InputFormat, InputSplit, Instance,
    OutputCommitter, OutputFormat, RecordReader, RecordWriter, downcast_split,
};
pub use error::{ErrorKind, IsolationError, Result};
pub use library::{IsolatedEnvironment, LibraryManager, LoadedClass};
pub use registry::{DriverDefinition, Library, Location, Registries, Snapshot, SnapshotKeys, Spec};
pub use settings::IsolationSettings;
