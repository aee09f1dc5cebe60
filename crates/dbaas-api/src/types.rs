//! Request and response messages

use dbaas_cluster::{
    ClusterSummary, ConnectionStatus, Credentials, LogSource, PodLogs, ReplicaSetClusterParams,
    UpdateParams, XtraDbClusterParams,
};
use serde::{Deserialize, Serialize};

/// Access to the Kubernetes cluster a request targets
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeAuth {
    /// Kubeconfig document, passed through to kubectl
    pub kubeconfig: String,
}

impl std::fmt::Debug for KubeAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeAuth")
            .field("kubeconfig", &"<redacted>")
            .finish()
    }
}

/// List the clusters of one kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListClustersRequest {
    /// Target cluster access
    pub kube_auth: KubeAuth,
}

/// Clusters of one kind, including ones still deleting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListClustersResponse {
    /// One entry per cluster
    pub clusters: Vec<ClusterSummary>,
}

/// Request naming a single cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterRequest {
    /// Target cluster access
    pub kube_auth: KubeAuth,
    /// Cluster name
    pub name: String,
}

/// Create an XtraDB cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateXtraDbClusterRequest {
    /// Target cluster access
    pub kube_auth: KubeAuth,
    /// Cluster parameters
    pub params: XtraDbClusterParams,
}

/// Create a PSMDB cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePsmdbClusterRequest {
    /// Target cluster access
    pub kube_auth: KubeAuth,
    /// Cluster parameters
    pub params: ReplicaSetClusterParams,
}

/// Update a cluster of either kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateClusterRequest {
    /// Target cluster access
    pub kube_auth: KubeAuth,
    /// Changes to apply
    pub params: UpdateParams,
}

/// Empty acknowledgement of a mutation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

/// Credentials of a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsResponse {
    /// Admin credentials and connection endpoint
    pub credentials: Credentials,
}

/// Check connectivity to a Kubernetes cluster
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckConnectionRequest {
    /// Target cluster access
    pub kube_auth: KubeAuth,
}

/// Connectivity and operator status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConnectionResponse {
    /// Server version and operator status
    pub status: ConnectionStatus,
}

/// Fetch logs of a cluster's pods
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetLogsRequest {
    /// Target cluster access
    pub kube_auth: KubeAuth,
    /// Cluster name
    pub cluster_name: String,
    /// Which pods and containers to include
    #[serde(default)]
    pub source: LogSource,
    /// Lines per container; a default applies when unset
    #[serde(default)]
    pub tail_lines: Option<u32>,
}

/// Logs of a cluster's pods
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetLogsResponse {
    /// Per container logs and per pod events
    pub logs: Vec<PodLogs>,
}
