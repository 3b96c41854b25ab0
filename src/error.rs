//! Error types for the chaos operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Every error is scoped to a single reconciliation: nothing here is fatal
//! to the process, and recovery always comes from redelivery.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for chaos operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error without further context
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A resource-store call failed
    #[error("{operation} {kind} failed: {source}")]
    Store {
        /// Store operation that failed (get, create, update, list, delete)
        operation: String,
        /// Resource kind the operation targeted
        kind: String,
        /// The underlying kube-rs error
        source: kube::Error,
    },

    /// Validation error for a ChaosEngine spec
    #[error("validation error for {engine}: {message}")]
    Validation {
        /// Name of the engine with invalid configuration
        engine: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.appinfo.applabel")
        field: Option<String>,
    },

    /// The target application kind cannot be checked for chaos
    #[error("resource type '{kind}' not supported for induce chaos")]
    UnsupportedResourceType {
        /// The kind as written in the engine spec
        kind: String,
    },

    /// The annotation gate rejected the target application
    #[error("annotation check failed for resource type '{kind}': {message}")]
    AnnotationGate {
        /// Application kind that was checked
        kind: String,
        /// Why the gate failed
        message: String,
    },

    /// Create raced with another writer and the object already exists
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Some owned resource kinds could not be deleted
    #[error("unable to delete chaos resources: {}", .failed_kinds.join(", "))]
    PartialCleanup {
        /// Kinds whose bulk delete failed
        failed_kinds: Vec<String>,
        /// The individual failures, in the same order
        failures: Vec<Error>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a store error naming the failed operation and resource kind
    pub fn store(operation: impl Into<String>, kind: impl Into<String>, source: kube::Error) -> Self {
        Self::Store {
            operation: operation.into(),
            kind: kind.into(),
            source,
        }
    }

    /// Create a validation error with the given message
    ///
    /// For simple validation errors without engine context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            engine: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with engine context
    pub fn validation_for(engine: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            engine: engine.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with engine context and field path
    pub fn validation_for_field(
        engine: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            engine: engine.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an annotation gate failure for the given kind
    pub fn annotation_gate(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::AnnotationGate {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create an already-exists error
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation-class errors need a spec change before a retry can succeed.
    /// Kubernetes errors are retryable unless the API rejected the request
    /// outright; a 409 conflict is retried since it only means another
    /// reconciliation wrote first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } | Error::Store { source, .. } => is_retryable_kube(source),
            Error::Validation { .. } => false,
            Error::UnsupportedResourceType { .. } => false,
            Error::AnnotationGate { .. } => true,
            Error::AlreadyExists { .. } => true,
            Error::PartialCleanup { .. } => true,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Check if this error means the target object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube { source } | Error::Store { source, .. } => kube_code(source) == Some(404),
            _ => false,
        }
    }

    /// Get the engine name if this error is associated with a specific engine
    pub fn engine(&self) -> Option<&str> {
        match self {
            Error::Validation { engine, .. } => Some(engine),
            _ => None,
        }
    }
}

fn kube_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(ae) => Some(ae.code),
        _ => None,
    }
}

fn is_retryable_kube(err: &kube::Error) -> bool {
    match kube_code(err) {
        Some(409) => true,
        Some(code) => !(400..500).contains(&code),
        None => true,
    }
}
