// Diagnostic fields are only read through the derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Cadence operations
#[derive(Error, Debug, Diagnostic)]
pub enum CadenceError {
    /// Invalid resource
    #[error("Invalid resource: {reason}")]
    #[diagnostic(
        code(cadence::invalid_resource),
        help("{suggestion}")
    )]
    InvalidResource {
        #[allow(unused)]
        reason: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(cadence::serialization_error),
        help("Ensure the resource format is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Kind is not registered in the scheme
    #[error("Unknown resource kind: {api_version}/{kind}")]
    #[diagnostic(
        code(cadence::invalid_kind),
        help("Supported kinds: v1/Pod, apps/v1/Deployment, chaosapps.metamagical.io/v1/ChaosPod, samplecontroller.k8s.io/v1alpha1/Foo")
    )]
    InvalidKind {
        #[allow(unused)]
        api_version: String,
        #[allow(unused)]
        kind: String,
    },

    /// Kind registered twice
    #[error("Kind already registered: {kind}")]
    #[diagnostic(
        code(cadence::duplicate_kind),
        help("Each kind may only be registered once per scheme")
    )]
    DuplicateKind {
        #[allow(unused)]
        kind: String,
    },

    /// Scheme installed twice
    #[error("Scheme already installed")]
    #[diagnostic(
        code(cadence::scheme_already_installed),
        help("The global scheme is immutable once installed. Register every kind before calling Scheme::install")
    )]
    SchemeAlreadyInstalled,

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(cadence::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for Cadence operations
pub type Result<T> = std::result::Result<T, CadenceError>;

impl CadenceError {
    pub fn invalid_resource(reason: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidResource {
            reason: reason.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    pub fn invalid_kind(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::InvalidKind {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }

    pub fn duplicate_kind(kind: impl Into<String>) -> Self {
        Self::DuplicateKind { kind: kind.into() }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}
