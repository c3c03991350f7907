// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

use crate::resources::ResourceError;

/// Core error type for Keel resource handling
#[derive(Error, Debug, Diagnostic)]
pub enum KeelError {
    /// A contract reference on a Cluster cannot be followed
    #[error("Invalid reference {reference}: {reason}")]
    #[diagnostic(
        code(keel::invalid_reference),
        help("References need a non-empty apiGroup, kind and name, e.g. apiGroup: infrastructure.cluster.x-k8s.io, kind: DockerCluster, name: my-cluster")
    )]
    InvalidReference {
        #[allow(unused)]
        reference: String,
        #[allow(unused)]
        reason: String,
    },

    /// The scheme has no version registered for a group/kind
    #[error("Unknown kind {kind} in group {group}")]
    #[diagnostic(
        code(keel::unknown_kind),
        help("Register the group with the scheme, e.g. `keel run --contract {group}=v1beta2`")
    )]
    UnknownKind {
        #[allow(unused)]
        group: String,
        #[allow(unused)]
        kind: String,
    },

    /// Invalid API version
    #[error("Invalid API version: {api_version}")]
    #[diagnostic(
        code(keel::invalid_api_version),
        help("Use an apiVersion of the form 'v1' or 'group/version'")
    )]
    InvalidApiVersion {
        #[allow(unused)]
        api_version: String,
    },

    /// Validation failed
    #[error("Validation failed for {resource_type}: {details}")]
    #[diagnostic(
        code(keel::validation_failed),
        help("Objects need metadata.name set to a valid DNS-1123 subdomain")
    )]
    ValidationFailed {
        #[allow(unused)]
        resource_type: String,
        #[allow(unused)]
        details: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(keel::serialization_error),
        help("Ensure the object matches the expected shape for its kind")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for Keel core operations
pub type Result<T> = std::result::Result<T, KeelError>;

impl KeelError {
    /// Create an InvalidReference error
    pub fn invalid_reference(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Create an UnknownKind error
    pub fn unknown_kind(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::UnknownKind {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// Create an InvalidApiVersion error
    pub fn invalid_api_version(api_version: impl Into<String>) -> Self {
        Self::InvalidApiVersion {
            api_version: api_version.into(),
        }
    }

    /// Create a ValidationFailed error
    pub fn validation_failed(resource_type: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ValidationFailed {
            resource_type: resource_type.into(),
            details: details.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}

impl From<ResourceError> for KeelError {
    fn from(err: ResourceError) -> Self {
        KeelError::validation_failed("resource", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = KeelError::unknown_kind("infrastructure.example.io", "FooCluster");
        assert!(matches!(err, KeelError::UnknownKind { .. }));
        assert_eq!(
            err.to_string(),
            "Unknown kind FooCluster in group infrastructure.example.io"
        );

        let err: KeelError = ResourceError::MissingField("metadata.name".to_string()).into();
        assert!(matches!(err, KeelError::ValidationFailed { .. }));
    }
}
