//! Error types for the CLI

use std::path::PathBuf;

use dbaas_common::telemetry::TelemetryError;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("logging setup failed: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("cannot read kubeconfig {path}: {source}")]
    Kubeconfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{code:?}: {message}")]
    Rpc { code: tonic::Code, message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    AlreadyExists { message: String },

    #[error("{message}")]
    NotReady { message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{message}")]
    Kubectl { message: String },

    #[error("{message}")]
    Serialization { message: String },

    #[error("{message}")]
    Internal { message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

impl From<dbaas_common::Error> for Error {
    fn from(err: dbaas_common::Error) -> Self {
        use dbaas_common::Error as Common;

        let message = err.to_string();
        match err {
            Common::NotFound { .. } => Error::NotFound { message },
            Common::AlreadyExists { .. } => Error::AlreadyExists { message },
            Common::NotReady { .. } => Error::NotReady { message },
            Common::Validation { message, .. } => Error::Validation { message },
            Common::Kubectl { .. } => Error::Kubectl { message },
            Common::Serialization { .. } => Error::Serialization { message },
            Common::Internal { .. } => Error::Internal { message },
        }
    }
}
