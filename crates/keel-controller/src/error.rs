use keel_core::KeelError;
use keel_storage::StorageError;
use miette::Diagnostic;
use thiserror::Error;

/// Controller error type for reconcile operations
#[derive(Error, Debug, Diagnostic)]
pub enum ControllerError {
    /// Object not found
    #[error("Object not found: {resource}")]
    #[diagnostic(
        code(keel::controller::not_found),
        help("The object was deleted or never existed. Optional children treat this as absent")
    )]
    NotFound {
        #[allow(unused)]
        resource: String,
    },

    /// Stale write rejected by the store
    #[error("Conflict writing {resource}: {message}")]
    #[diagnostic(
        code(keel::controller::conflict),
        help("Another writer updated the object first. The key is retried with a fresh read")
    )]
    Conflict {
        #[allow(unused)]
        resource: String,
        #[allow(unused)]
        message: String,
    },

    /// Reconcile exceeded its deadline
    #[error("Reconcile of {key} timed out after {seconds}s")]
    #[diagnostic(
        code(keel::controller::timeout),
        help("Raise --reconcile-timeout-secs or check the object store for slow writes")
    )]
    Timeout {
        #[allow(unused)]
        key: String,
        #[allow(unused)]
        seconds: u64,
    },

    /// Several independent steps failed in one cycle
    #[error("{count} reconcile steps failed: {summary}")]
    #[diagnostic(
        code(keel::controller::aggregate),
        help("Each failure is retried with the next reconcile of the key")
    )]
    Aggregate {
        #[allow(unused)]
        count: usize,
        #[allow(unused)]
        summary: String,
        #[allow(unused)]
        errors: Vec<ControllerError>,
    },

    /// Storage error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(StorageError),

    /// Core error (references, serialization)
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] KeelError),
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControllerError>;

impl ControllerError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn timeout(key: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            key: key.into(),
            seconds,
        }
    }

    /// Fold the failures of one cycle into a single result
    pub fn aggregate(mut errors: Vec<ControllerError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            count => {
                let summary = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(Self::Aggregate {
                    count,
                    summary,
                    errors,
                })
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::KeyNotFound { key } => Self::not_found(key),
            StorageError::Conflict {
                key,
                expected,
                actual,
            } => Self::conflict(
                key,
                format!("expected resourceVersion {}, found {}", expected, actual),
            ),
            other => Self::Storage(other),
        }
    }
}
