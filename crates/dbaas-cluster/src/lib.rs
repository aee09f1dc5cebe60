//! Cluster translation for the DBaaS controller
//!
//! Maps cluster requests onto the custom resources of the Percona operators
//! and projects operator status back into a small set of cluster states.
//!
//! Related crates:
//! - `dbaas-common`: errors, quantities and the kubectl client
//! - `dbaas-api`: request-scoped services built on these translators

pub mod deletion;
pub mod environment;
pub mod logs;
pub mod model;
pub mod operators;
pub mod psmdb;
pub mod resources;
pub mod secrets;
pub mod state;
pub mod validation;
pub mod workloads;
pub mod xtradb;

pub use logs::{collect_logs, LogSource, PodLogs, DEFAULT_TAIL_LINES};
pub use model::{
    ClusterState, ClusterSummary, ComponentParams, ComponentSummary, ComputeResources,
    Credentials, Operation, PmmParams, ProxyKind, ReplicaSetClusterParams, UpdateParams,
    XtraDbClusterParams,
};
pub use operators::{check_connection, ConnectionStatus, OperatorStatus};
pub use psmdb::PsmdbClusters;
pub use xtradb::XtraDbClusters;

// Re-export common error types
pub use dbaas_common::{Error, Result};

/// PMM client sidecar image added to clusters with monitoring enabled
pub const PMM_CLIENT_IMAGE: &str = "percona/pmm-client:2.28.0";
