//! Driver capability interfaces and the constructor catalog.

mod capability;
mod catalog;

pub use capability::{
    Capability, ClassFactory, Datum, DriverError, InputFormat, InputSplit, Instance,
    OutputCommitter, OutputFormat, RecordReader, RecordWriter, downcast_split,
};
pub use catalog::DriverCatalog;
