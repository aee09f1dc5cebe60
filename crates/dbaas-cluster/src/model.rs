//! External-facing cluster parameters and read models
//!
//! These types are what callers see. Custom-resource documents never leak
//! past the translators; everything is projected into these shapes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Single cluster state shared by every operator kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    /// The operator reports a state it cannot determine
    Invalid,
    /// Created or being modified; not all components ready yet
    Changing,
    /// All components ready
    Ready,
    /// The operator reports an error
    Failed,
    /// The custom resource is gone but pods are still terminating
    Deleting,
    /// Ready with the pause flag set in the spec
    Paused,
    /// Changing while rolling to a new image
    Upgrading,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterState::Invalid => "Invalid",
            ClusterState::Changing => "Changing",
            ClusterState::Ready => "Ready",
            ClusterState::Failed => "Failed",
            ClusterState::Deleting => "Deleting",
            ClusterState::Paused => "Paused",
            ClusterState::Upgrading => "Upgrading",
        };
        f.write_str(s)
    }
}

/// Compute resources of one component, as limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComputeResources {
    /// CPU in millicpu
    pub cpu_millis: u64,
    /// Memory in bytes
    pub memory_bytes: u64,
}

/// Requested resources of one component on create
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComponentParams {
    /// Compute limits; `None` leaves the operator's defaults in place
    pub compute_resources: Option<ComputeResources>,
    /// Persistent volume size in bytes; `None` for components without storage
    pub disk_size: Option<u64>,
}

/// Connection parameters of the PMM monitoring sidecar
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmmParams {
    /// Public address of the PMM server
    pub public_address: String,
    /// PMM server login
    pub login: String,
    /// PMM server password
    pub password: String,
}

impl fmt::Debug for PmmParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PmmParams")
            .field("public_address", &self.public_address)
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

/// Proxy implementation in front of an XtraDB cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// HAProxy (the operator's recommended proxy)
    #[default]
    HaProxy,
    /// ProxySQL
    ProxySql,
}

/// Parameters for creating an XtraDB cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XtraDbClusterParams {
    /// Cluster name, unique within the namespace
    pub name: String,
    /// Number of data nodes (and proxy replicas)
    pub size: u32,
    /// Data node resources
    pub pxc: ComponentParams,
    /// Proxy resources
    pub proxy: ComponentParams,
    /// Which proxy to deploy
    pub proxy_kind: ProxyKind,
    /// Expose the proxy outside the Kubernetes cluster
    pub expose: bool,
    /// Monitoring sidecar; disabled when `None`
    pub pmm: Option<PmmParams>,
}

/// Parameters for creating a replica-set (PSMDB) cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSetClusterParams {
    /// Cluster name, unique within the namespace
    pub name: String,
    /// Number of replica-set members
    pub size: u32,
    /// Replica-set member resources
    pub replicaset: ComponentParams,
    /// Enable sharding (config servers and mongos routers)
    pub sharding: bool,
    /// Mongos router resources, used when sharding is enabled
    pub mongos: ComponentParams,
    /// Expose the cluster outside the Kubernetes cluster
    pub expose: bool,
    /// Monitoring sidecar; disabled when `None`
    pub pmm: Option<PmmParams>,
}

/// Partial update of a cluster
///
/// `None` leaves a field unchanged. `suspend` and `resume` are mutually
/// exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateParams {
    /// Cluster name
    pub name: String,
    /// New size
    pub size: Option<u32>,
    /// New compute limits of the data nodes / replica-set members
    pub primary: Option<ComputeResources>,
    /// New compute limits of the proxy / mongos routers
    pub proxy: Option<ComputeResources>,
    /// Pause the cluster
    pub suspend: bool,
    /// Resume a paused cluster
    pub resume: bool,
}

impl UpdateParams {
    /// True when the only requested change is resuming the cluster
    pub fn is_resume_only(&self) -> bool {
        self.resume && self.size.is_none() && self.primary.is_none() && self.proxy.is_none()
    }
}

/// Resource snapshot of one component in a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComponentSummary {
    /// Compute limits; `None` when the document sets none
    pub compute_resources: Option<ComputeResources>,
    /// Persistent volume size in bytes (0 when unset)
    pub disk_size: u64,
}

/// Progress of the last change, as ready pods over expected pods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Operation {
    /// Ready pods across all components
    pub finished_steps: u32,
    /// Expected pods across all components
    pub total_steps: u32,
}

impl Operation {
    /// Add one component's (ready, total) pair
    pub fn add(&mut self, ready: i32, total: i32) {
        self.finished_steps += ready.max(0) as u32;
        self.total_steps += total.max(0) as u32;
    }
}

/// A cluster as returned by list and get calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Cluster name
    pub name: String,
    /// Number of data nodes / replica-set members
    pub size: u32,
    /// Derived cluster state
    pub state: ClusterState,
    /// Operator-reported messages joined together
    pub message: String,
    /// Data nodes / replica-set members
    pub primary: ComponentSummary,
    /// Proxy / mongos routers, when deployed
    pub proxy: Option<ComponentSummary>,
    /// Readiness progress
    pub operation: Operation,
    /// Whether the cluster is exposed outside Kubernetes
    pub exposed: bool,
    /// Whether the spec carries the pause flag
    pub paused: bool,
}

impl ClusterSummary {
    /// Synthetic entry for a cluster whose custom resource is already gone
    pub fn deleting(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            state: ClusterState::Deleting,
            message: String::new(),
            primary: ComponentSummary::default(),
            proxy: None,
            operation: Operation::default(),
            exposed: false,
            paused: false,
        }
    }
}

/// Connection credentials of a cluster
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Admin user name
    pub username: String,
    /// Admin password
    pub password: String,
    /// Host to connect to
    pub host: String,
    /// Port to connect to
    pub port: u16,
    /// Replica-set name for MongoDB connection strings
    pub replicaset: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("replicaset", &self.replicaset)
            .finish_non_exhaustive()
    }
}
