//! Library environments: artifact bundles, isolated class resolution and the
//! per-library environment cache.

mod artifact;
mod environment;
mod manager;

pub use artifact::{
    ArtifactManifest, ArtifactStager, LocalStager, MANIFEST_ENTRY, ZIP_MAGIC, validate_artifact,
};
pub use environment::{EnvironmentId, IsolatedEnvironment, LoadedClass};
pub use manager::LibraryManager;
