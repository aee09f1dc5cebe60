//! Common types for the DBaaS controller: errors, quantities, and the kubectl client

#![deny(missing_docs)]

pub mod error;
pub mod kubeconfig;
pub mod kubectl;
pub mod telemetry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod units;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Pod label carrying the name of the cluster a pod belongs to
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";

/// Pod label carrying the name of the operator deployment managing a pod
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
