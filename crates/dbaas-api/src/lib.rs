//! DBaaS service layer
//!
//! One service per cluster kind plus the Kubernetes connection service and
//! the logs service. Every request carries the kubeconfig of the cluster it
//! targets; a kubectl client is built for the request and dropped with it.
//!
//! The services speak `tonic` request, response and status types so that a
//! transport can serve them directly.

#![deny(missing_docs)]

pub mod error;
pub mod factory;
pub mod kubernetes;
pub mod logs;
pub mod psmdb;
pub mod types;
pub mod xtradb;

pub use error::status_from_error;
pub use factory::{CliKubectlFactory, KubectlFactory};
pub use kubernetes::KubernetesService;
pub use logs::LogsService;
pub use psmdb::PsmdbService;
pub use types::*;
pub use xtradb::XtraDbService;
