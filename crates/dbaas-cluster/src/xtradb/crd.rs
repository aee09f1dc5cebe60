//! PerconaXtraDBCluster document as read and written by this crate
//!
//! Field names follow the operator's CRD exactly. Only the fields the
//! translator reads or writes are typed; the rest round-trips through
//! `extra`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resources::{Affinity, PmmSpec, PodDisruptionBudget, VolumeSpec};

/// Cluster spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "pxc.percona.com",
    version = "v1",
    kind = "PerconaXtraDBCluster",
    root = "PerconaXtraDbCluster",
    namespaced,
    status = "PerconaXtraDbClusterStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PerconaXtraDbClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cr_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_unsafe_configurations: Option<bool>,

    /// Scale the cluster to zero while keeping its volumes
    #[serde(default)]
    pub pause: bool,

    /// Secret holding the system users' passwords
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_options: Option<UpgradeOptions>,

    /// Galera data nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pxc: Option<PodSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub haproxy: Option<PodSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxysql: Option<PodSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmm: Option<PmmSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupSpec>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Automatic version upgrade settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeOptions {
    /// `disabled`, `recommended`, `latest` or a version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_service_endpoint: Option<String>,
}

/// One component (data nodes or a proxy)
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Proxies must be switched on explicitly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub size: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_spec: Option<VolumeSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_disruption_budget: Option<PodDisruptionBudget>,

    /// Service type of the proxy's primary service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PodSpec {
    /// Whether a proxy component is switched on
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

/// Backup configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default)]
    pub storages: BTreeMap<String, BackupStorageSpec>,

    #[serde(default)]
    pub schedule: Vec<BackupSchedule>,
}

/// Where backups go
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageSpec {
    /// `filesystem` or `s3`
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeSpec>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A scheduled backup
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSchedule {
    pub name: String,
    /// Cron expression
    pub schedule: String,
    /// Number of backups to keep
    pub keep: i32,
    pub storage_name: String,
}

/// Operator-written status
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerconaXtraDbClusterStatus {
    /// Aggregate state (`initializing`, `ready`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, rename = "message")]
    pub messages: Vec<String>,

    /// Address clients connect to (the enabled proxy's service)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pxc: Option<AppStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub haproxy: Option<AppStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxysql: Option<AppStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmm: Option<AppStatus>,
}

/// Status of one component
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    #[serde(default)]
    pub size: i32,

    #[serde(default)]
    pub ready: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, rename = "message")]
    pub messages: Vec<String>,

    /// Image actually running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}
