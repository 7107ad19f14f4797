//! Library, driver definition and spec registries.
//!
//! Registries are built once from a flat declarative [`Snapshot`] and are
//! immutable afterwards, except for spec overlays which grow as calls persist
//! configuration changes.

mod declarations;
mod registries;
mod snapshot;

pub use declarations::{DriverDefinition, Library, Location, Spec, parse_properties};
pub use registries::{RegisteredSpec, Registries};
pub use snapshot::{Snapshot, SnapshotKeys};
