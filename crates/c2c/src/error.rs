//! Error types for artifact generation.
//!
//! Generation errors are split by blast radius: [`GenerationError::is_fatal`]
//! tells the orchestrator whether a whole workload scope must be abandoned or
//! only the affected artifact skipped. Persistence failures are a separate
//! [`SinkError`] so callers can retry the write step without regenerating.

use std::path::PathBuf;

use thiserror::Error;

use crate::naming::ResourceKind;

/// A workload name that cannot be turned into a valid resource name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    /// The declared name is empty or whitespace.
    #[error("workload name is empty")]
    Empty,

    /// Nothing is left after replacing invalid DNS-label characters.
    #[error("workload name '{0}' contains no valid DNS label characters")]
    NoValidCharacters(String),

    /// The sanitized name exceeds the Kubernetes object-name limit.
    #[error("workload name '{name}' is {len} characters after sanitization, limit is {max}")]
    TooLong { name: String, len: usize, max: usize },

    /// Two distinct models derive the same resource name.
    #[error("{kind} name '{name}' is derived from both '{first}' and '{second}'")]
    Collision {
        kind: ResourceKind,
        name: String,
        first: String,
        second: String,
    },
}

/// Errors raised by resource handlers while building a single artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// No safely-named resource can be produced for the scope.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// The workload or job declares no container image.
    #[error("{kind} '{name}' declares no container image")]
    MissingImage { kind: ResourceKind, name: String },

    /// The artifact references a resource that was never generated.
    #[error("{kind} '{name}' references unknown {target_kind} '{target}'")]
    DanglingReference {
        kind: ResourceKind,
        name: String,
        target_kind: ResourceKind,
        target: String,
    },

    /// The model for an optional artifact is malformed.
    #[error("{kind} '{name}' is invalid: {message}")]
    Validation {
        kind: ResourceKind,
        name: String,
        message: String,
    },
}

impl GenerationError {
    /// Build a validation error for an artifact.
    pub fn validation(
        kind: ResourceKind,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            kind,
            name: name.into(),
            message: message.into(),
        }
    }

    /// Build a dangling-reference error for an artifact.
    pub fn dangling(
        kind: ResourceKind,
        name: impl Into<String>,
        target_kind: ResourceKind,
        target: impl Into<String>,
    ) -> Self {
        Self::DanglingReference {
            kind,
            name: name.into(),
            target_kind,
            target: target.into(),
        }
    }

    /// Whether this error aborts every artifact of the workload scope.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Naming(_) | Self::MissingImage { .. })
    }
}

/// Failure to persist a generated artifact.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem operation failed.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A resource could not be encoded as YAML.
    #[error("failed to encode {name} as YAML: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors building or loading a [`ModelRegistry`](crate::model::ModelRegistry).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An entity was registered twice for the same model kind.
    #[error("{kind} model '{name}' is already registered")]
    Duplicate { kind: &'static str, name: String },

    /// The model file could not be read.
    #[error("failed to read model file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The model file is not valid YAML or JSON for the model schema.
    #[error("failed to parse model file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Errors loading generator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the scope runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A generation worker panicked or was cancelled.
    #[error("generation worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type Result<T, E = GenerationError> = std::result::Result<T, E>;
