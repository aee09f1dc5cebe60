//! Error types for the DBaaS controller
//!
//! Errors are structured with fields so the RPC boundary can render a useful
//! message and pick a status code without parsing strings. Each variant
//! carries the cluster or resource it concerns where one is known.

use thiserror::Error;

use crate::kubectl::KubectlError;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for DBaaS operations
#[derive(Debug, Error)]
pub enum Error {
    /// The requested resource does not exist
    #[error("{kind} {name:?} not found")]
    NotFound {
        /// Resource kind (e.g., "PerconaXtraDBCluster", "Secret")
        kind: String,
        /// Resource name
        name: String,
    },

    /// A cluster with the same name already exists
    #[error("cluster {cluster:?} already exists")]
    AlreadyExists {
        /// Name of the conflicting cluster
        cluster: String,
    },

    /// The cluster is not in a state that allows the operation
    ///
    /// Raised by the readiness guard on update and credential reads. Clients
    /// are expected to poll the cluster state and retry.
    #[error("cluster {cluster:?} is not ready (state: {state})")]
    NotReady {
        /// Name of the cluster
        cluster: String,
        /// The operator-reported state that caused the rejection
        state: String,
    },

    /// Invalid request arguments, rejected before any remote mutation
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster the request targets
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "params.size")
        field: Option<String>,
    },

    /// The cluster-management tool failed for a reason other than not-found
    #[error("kubectl error: {source}")]
    Kubectl {
        /// The underlying tool error
        #[source]
        source: KubectlError,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being processed (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "secrets", "classifier")
        context: String,
    },
}

impl From<KubectlError> for Error {
    fn from(err: KubectlError) -> Self {
        match err {
            KubectlError::NotFound { kind, name } => Error::NotFound { kind, name },
            KubectlError::Serialization { message } => Error::Serialization {
                message,
                kind: None,
            },
            source => Error::Kubectl { source },
        }
    }
}

impl Error {
    /// Create a not-found error for a resource
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an already-exists error for a cluster
    pub fn already_exists(cluster: impl Into<String>) -> Self {
        Self::AlreadyExists {
            cluster: cluster.into(),
        }
    }

    /// Create a not-ready error carrying the observed state
    pub fn not_ready(cluster: impl Into<String>, state: impl Into<String>) -> Self {
        Self::NotReady {
            cluster: cluster.into(),
            state: state.into(),
        }
    }

    /// Create a validation error with the given message
    ///
    /// For simple validation errors without cluster context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context and field path
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Returns true if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
