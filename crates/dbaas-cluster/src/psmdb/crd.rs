//! PerconaServerMongoDB document as read and written by this crate

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resources::{Affinity, PmmSpec, PodDisruptionBudget, VolumeSpec};

/// Cluster spec
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "psmdb.percona.com",
    version = "v1",
    kind = "PerconaServerMongoDB",
    root = "PerconaServerMongoDb",
    namespaced,
    status = "PerconaServerMongoDbStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMongoDbSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cr_version: Option<String>,

    /// mongod image used by every replica set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_unsafe_configurations: Option<bool>,

    #[serde(default)]
    pub pause: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_strategy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_options: Option<UpgradeOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<SecretsSpec>,

    #[serde(default)]
    pub replsets: Vec<ReplsetSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharding: Option<ShardingSpec>,

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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_fcv: Option<bool>,
}

/// Secrets referenced by the cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretsSpec {
    /// Secret with the system users' credentials
    pub users: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A replica set (data or config servers)
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplsetSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub size: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_spec: Option<VolumeSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_disruption_budget: Option<PodDisruptionBudget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<ExposeSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arbiter: Option<ArbiterSpec>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Per-pod external services
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExposeSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_type: Option<String>,
}

/// Voting member without data
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArbiterSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub size: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
}

/// Sharding: config servers plus mongos routers
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShardingSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configsvr_repl_set: Option<ReplsetSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongos: Option<MongosSpec>,
}

/// Mongos routers
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongosSpec {
    #[serde(default)]
    pub size: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_disruption_budget: Option<PodDisruptionBudget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<MongosExpose>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Mongos service
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongosExpose {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose_type: Option<String>,
}

/// Backup agent configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default)]
    pub storages: BTreeMap<String, BackupStorageSpec>,

    #[serde(default)]
    pub tasks: Vec<BackupTask>,
}

/// Where backups go
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupStorageSpec {
    /// `s3`, `azure` or `filesystem`
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A scheduled backup
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupTask {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    /// Cron expression
    pub schedule: String,
    #[serde(default)]
    pub keep: i32,
    pub storage_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression_type: Option<String>,
}

/// Operator-written status
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerconaServerMongoDbStatus {
    /// Aggregate state (`initializing`, `ready`, `error`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Connection host (mongos service or replica-set seed list)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Per replica set, keyed by replica-set name (`rs0`, `cfg`)
    #[serde(default)]
    pub replsets: BTreeMap<String, ReplsetStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongos: Option<MongosStatus>,

    /// Image the replica sets are running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongo_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongo_version: Option<String>,
}

/// Status of one replica set
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplsetStatus {
    #[serde(default)]
    pub size: i32,

    #[serde(default)]
    pub ready: i32,

    /// Member state (`initializing`, `ready`, `error`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub initialized: bool,
}

/// Status of the mongos routers
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MongosStatus {
    #[serde(default)]
    pub size: i32,

    #[serde(default)]
    pub ready: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
