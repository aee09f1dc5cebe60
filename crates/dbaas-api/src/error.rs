//! Mapping of the error taxonomy onto RPC status codes

use dbaas_common::Error;
use tonic::{Code, Status};
use tracing::error;

/// Status code a client sees for `err`
pub fn code_for(err: &Error) -> Code {
    match err {
        Error::NotFound { .. } => Code::NotFound,
        Error::AlreadyExists { .. } => Code::AlreadyExists,
        // Retryable: the client polls until the cluster is ready again
        Error::NotReady { .. } => Code::FailedPrecondition,
        Error::Validation { .. } => Code::InvalidArgument,
        Error::Kubectl { .. } | Error::Serialization { .. } | Error::Internal { .. } => {
            Code::Internal
        }
    }
}

/// Convert an error into the status returned to the client
pub fn status_from_error(err: Error) -> Status {
    let code = code_for(&err);
    if code == Code::Internal {
        error!(error = %err, cluster = ?err.cluster(), "Request failed");
    }
    Status::new(code, err.to_string())
}
