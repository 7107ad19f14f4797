//! Error types for context and library management.

use crate::driver::DriverError;

/// Broad classification of an [`IsolationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A declaration is malformed or references an unknown id.
    Configuration,
    /// An artifact bundle is missing, a directory, or not an archive.
    ArtifactValidation,
    /// A class could not be loaded or has the wrong capability.
    ClassResolution,
    /// The call was cancelled while running.
    Cancellation,
    /// The wrapped driver operation failed.
    Driver,
    /// Local I/O or wire encoding failed.
    Io,
}

/// Errors raised while resolving and running driver calls in context.
#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    /// A referenced id does not exist.
    #[error("{kind} '{key}' not found in {known:?}")]
    NotFound {
        kind: &'static str,
        key: String,
        known: Vec<String>,
    },

    /// A declaration is malformed.
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// An artifact failed validation or staging.
    #[error("Artifact {location} is invalid: {reason}")]
    InvalidArtifact { location: String, reason: String },

    /// A class failed to load or does not provide the requested capability.
    #[error("Can't instantiate class {class_name} from spec {spec_id}: {reason}")]
    ClassResolution {
        class_name: String,
        spec_id: String,
        reason: String,
    },

    /// The call was interrupted.
    #[error("Call for spec {spec_id} was cancelled")]
    Cancelled { spec_id: String },

    /// Raised by the driver itself.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Malformed wrapped split bytes.
    #[error("Split encoding error: {0}")]
    SplitEncoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IsolationError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        IsolationError::Config {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_artifact(location: impl Into<String>, reason: impl Into<String>) -> Self {
        IsolationError::InvalidArtifact {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IsolationError::NotFound { .. } | IsolationError::Config { .. } => {
                ErrorKind::Configuration
            }
            IsolationError::InvalidArtifact { .. } => ErrorKind::ArtifactValidation,
            IsolationError::ClassResolution { .. } => ErrorKind::ClassResolution,
            IsolationError::Cancelled { .. } => ErrorKind::Cancellation,
            IsolationError::Driver(DriverError::Interrupted) => ErrorKind::Cancellation,
            IsolationError::Driver(_) => ErrorKind::Driver,
            IsolationError::SplitEncoding(_) | IsolationError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result type for isolation operations.
pub type Result<T> = std::result::Result<T, IsolationError>;
