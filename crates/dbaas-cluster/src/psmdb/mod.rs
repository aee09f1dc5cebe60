//! Replica-set clusters managed by the Percona Server for MongoDB operator

pub mod crd;

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use dbaas_common::kubectl::{apply_as, get_as, list_as, Kubectl};
use dbaas_common::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::deletion::find_deleting;
use crate::environment::{detect_environment, KubernetesEnvironment};
use crate::model::{ClusterSummary, Credentials, Operation, ReplicaSetClusterParams, UpdateParams};
use crate::resources::{
    component_summary, join_messages, limits, reapply_metadata, set_limits, Affinity, PmmSpec,
    PodDisruptionBudget, VolumeSpec,
};
use crate::secrets::{
    delete_secret_best_effort, generate_password, provision_secret, read_secret, required_key,
};
use crate::state::{classify_psmdb, refine, PsmdbState};
use crate::validation::{replica_count, validate_name, validate_size, validate_update};
use crate::workloads::{delete_resource, ensure_absent, rollout_restart};
use crate::PMM_CLIENT_IMAGE;

pub use crd::{
    ArbiterSpec, BackupSpec, BackupStorageSpec, BackupTask, ExposeSpec, MongosExpose, MongosSpec,
    MongosStatus, PerconaServerMongoDb, PerconaServerMongoDbSpec, PerconaServerMongoDbStatus,
    ReplsetSpec, ReplsetStatus, SecretsSpec, ShardingSpec, UpgradeOptions,
};

/// Operator version the documents are written for
pub const PSMDB_OPERATOR_VERSION: &str = "1.12.0";

/// Operator deployment name, also the managed-by label of its pods
pub const OPERATOR_DEPLOYMENT: &str = "percona-server-mongodb-operator";

/// Kind passed to kubectl
pub const KIND: &str = "PerconaServerMongoDB";

/// apiVersion of the documents
pub const API_VERSION: &str = "psmdb.percona.com/v1";

/// mongod / mongos port
pub const PORT: u16 = 27017;

/// Name of the data replica set
pub const REPLSET_NAME: &str = "rs0";

/// Name of the config-server replica set of sharded clusters
pub const CONFIG_REPLSET_NAME: &str = "cfg";

/// Database server image
pub const PSMDB_IMAGE: &str = "percona/percona-server-mongodb:5.0.7-6";

/// Backup agent image
pub const BACKUP_IMAGE: &str = "percona/percona-backup-mongodb:1.7.0";

/// Secret shipped with the operator listing every system user
const TEMPLATE_SECRET: &str = "my-cluster-name-secrets";

const ADMIN_USER_KEY: &str = "MONGODB_USER_ADMIN_USER";
const ADMIN_PASSWORD_KEY: &str = "MONGODB_USER_ADMIN_PASSWORD";
const PMM_USER_KEY: &str = "PMM_SERVER_USER";
const PMM_PASSWORD_KEY: &str = "PMM_SERVER_PASSWORD";

/// Finalizer making the operator delete pods in order
const DELETE_PODS_FINALIZER: &str = "delete-psmdb-pods-in-order";

/// Config servers always run as a three-member replica set
const CONFIG_REPLSET_SIZE: i32 = 3;

/// Replica sets smaller than this cannot elect a primary after a failure
const SAFE_CLUSTER_SIZE: u32 = 3;

/// Name of the per-cluster credentials secret
pub fn secret_name(cluster: &str) -> String {
    format!("dbaas-{cluster}-psmdb-secrets")
}

/// Name of the per-cluster backup storage
pub fn backup_storage_name(cluster: &str) -> String {
    format!("{cluster}-psmdb-backup")
}

fn is_sharded(spec: &PerconaServerMongoDbSpec) -> bool {
    spec.sharding.as_ref().is_some_and(|s| s.enabled)
}

fn mongos(spec: &PerconaServerMongoDbSpec) -> Option<&MongosSpec> {
    spec.sharding
        .as_ref()
        .filter(|s| s.enabled)
        .and_then(|s| s.mongos.as_ref())
}

fn mongos_mut(spec: &mut PerconaServerMongoDbSpec) -> Option<&mut MongosSpec> {
    spec.sharding
        .as_mut()
        .filter(|s| s.enabled)
        .and_then(|s| s.mongos.as_mut())
}

/// Build the document for a new cluster
pub fn build_document(
    params: &ReplicaSetClusterParams,
    env: KubernetesEnvironment,
) -> Result<PerconaServerMongoDb> {
    let disk_size = params.replicaset.disk_size.filter(|d| *d > 0).ok_or_else(|| {
        Error::validation_for_field(
            &params.name,
            "params.replicaset.disk_size",
            "replica set disk size is required",
        )
    })?;
    let size = replica_count(&params.name, params.size)?;
    let affinity = Affinity::topology_key(env.anti_affinity_topology_key());
    let expose_type = env.expose_service_type().to_string();

    let replset = ReplsetSpec {
        name: REPLSET_NAME.to_string(),
        size,
        resources: params.replicaset.compute_resources.map(limits),
        volume_spec: Some(VolumeSpec::persistent(disk_size)),
        affinity: Some(affinity.clone()),
        pod_disruption_budget: Some(PodDisruptionBudget::one_unavailable()),
        expose: Some(ExposeSpec {
            enabled: params.expose && !params.sharding,
            expose_type: (params.expose && !params.sharding).then(|| expose_type.clone()),
        }),
        arbiter: Some(ArbiterSpec {
            enabled: false,
            size: 1,
            affinity: Some(affinity.clone()),
        }),
        extra: BTreeMap::new(),
    };

    let sharding = if params.sharding {
        ShardingSpec {
            enabled: true,
            configsvr_repl_set: Some(ReplsetSpec {
                name: CONFIG_REPLSET_NAME.to_string(),
                size: CONFIG_REPLSET_SIZE,
                volume_spec: Some(VolumeSpec::persistent(disk_size)),
                affinity: Some(affinity.clone()),
                pod_disruption_budget: Some(PodDisruptionBudget::one_unavailable()),
                ..Default::default()
            }),
            mongos: Some(MongosSpec {
                size,
                resources: params.mongos.compute_resources.map(limits),
                affinity: Some(affinity),
                pod_disruption_budget: Some(PodDisruptionBudget::one_unavailable()),
                expose: Some(MongosExpose {
                    expose_type: Some(if params.expose {
                        expose_type
                    } else {
                        "ClusterIP".to_string()
                    }),
                }),
                extra: BTreeMap::new(),
            }),
        }
    } else {
        ShardingSpec::default()
    };

    let storage = backup_storage_name(&params.name);
    // No storage credentials exist at creation time, so the agent and its
    // task are written disabled until a storage is configured.
    let backup = BackupSpec {
        enabled: false,
        image: Some(BACKUP_IMAGE.to_string()),
        service_account_name: Some(OPERATOR_DEPLOYMENT.to_string()),
        storages: BTreeMap::from([(
            storage.clone(),
            BackupStorageSpec {
                type_: "filesystem".to_string(),
                extra: BTreeMap::from([("filesystem".to_string(), json!({"path": "/backup"}))]),
            },
        )]),
        tasks: vec![BackupTask {
            name: "daily-backup".to_string(),
            enabled: false,
            schedule: "0 0 * * *".to_string(),
            keep: 5,
            storage_name: storage,
            compression_type: Some("gzip".to_string()),
        }],
    };

    let spec = PerconaServerMongoDbSpec {
        cr_version: Some(PSMDB_OPERATOR_VERSION.to_string()),
        image: Some(PSMDB_IMAGE.to_string()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        allow_unsafe_configurations: Some(params.size < SAFE_CLUSTER_SIZE),
        pause: false,
        update_strategy: Some("SmartUpdate".to_string()),
        upgrade_options: Some(UpgradeOptions {
            apply: Some("disabled".to_string()),
            schedule: Some("0 2 * * *".to_string()),
            set_fcv: Some(false),
        }),
        secrets: Some(SecretsSpec {
            users: secret_name(&params.name),
            extra: BTreeMap::new(),
        }),
        replsets: vec![replset],
        sharding: Some(sharding),
        pmm: Some(PmmSpec::from_params(params.pmm.as_ref(), PMM_CLIENT_IMAGE)),
        backup: Some(backup),
        extra: BTreeMap::new(),
    };

    let mut cr = PerconaServerMongoDb::new(&params.name, spec);
    cr.metadata = ObjectMeta {
        name: Some(params.name.clone()),
        finalizers: Some(vec![DELETE_PODS_FINALIZER.to_string()]),
        ..Default::default()
    };
    Ok(cr)
}

/// Apply a partial update to a fetched document
pub fn apply_update(cr: &mut PerconaServerMongoDb, params: &UpdateParams) -> Result<()> {
    let spec = &mut cr.spec;
    if params.suspend {
        spec.pause = true;
    }
    if params.resume {
        spec.pause = false;
    }

    if spec.replsets.is_empty() && (params.size.is_some() || params.primary.is_some()) {
        return Err(missing(&params.name, "replicaset"));
    }
    if let Some(size) = params.size {
        let replicas = replica_count(&params.name, size)?;
        for replset in &mut spec.replsets {
            replset.size = replicas;
        }
        if size < SAFE_CLUSTER_SIZE {
            spec.allow_unsafe_configurations = Some(true);
        }
        if let Some(mongos) = mongos_mut(spec) {
            mongos.size = replicas;
        }
    }
    if let Some(compute) = params.primary {
        for replset in &mut spec.replsets {
            set_limits(replset.resources.get_or_insert_with(Default::default), compute);
        }
    }
    if let Some(compute) = params.proxy {
        let mongos = mongos_mut(spec).ok_or_else(|| missing(&params.name, "mongos"))?;
        set_limits(mongos.resources.get_or_insert_with(Default::default), compute);
    }
    Ok(())
}

fn missing(cluster: &str, component: &str) -> Error {
    Error::validation_for_field(
        cluster,
        format!("params.{component}"),
        format!("cluster has no {component} component"),
    )
}

/// Project a document into a summary
pub fn summarize(cr: &PerconaServerMongoDb) -> Result<ClusterSummary> {
    let name = cr.metadata.name.clone().unwrap_or_default();
    let default_status = PerconaServerMongoDbStatus::default();
    let status = cr.status.as_ref().unwrap_or(&default_status);
    let sharded = is_sharded(&cr.spec);

    let members: Vec<Option<&str>> = status
        .replsets
        .values()
        .map(|r| r.status.as_deref())
        .collect();
    let state = refine(
        classify_psmdb(status.state.as_deref(), &members),
        cr.spec.pause,
        cr.spec.image.as_deref(),
        status.mongo_image.as_deref(),
    );

    let mongos_status = status.mongos.as_ref().filter(|_| sharded);
    let message = join_messages(
        status
            .message
            .iter()
            .chain(status.replsets.values().filter_map(|r| r.message.as_ref()))
            .chain(mongos_status.and_then(|m| m.message.as_ref()))
            .map(String::as_str),
    );

    let mut operation = Operation::default();
    for replset in status.replsets.values() {
        operation.add(replset.ready, replset.size);
    }
    if let Some(m) = mongos_status {
        operation.add(m.ready, m.size);
    }

    let unit_error = |e: Error| {
        Error::internal_with_context("psmdb", format!("cluster {name:?}: {e}"))
    };
    let rs = cr.spec.replsets.first();
    let primary = component_summary(
        rs.and_then(|r| r.resources.as_ref()),
        rs.and_then(|r| r.volume_spec.as_ref()),
    )
    .map_err(unit_error)?;
    let mongos_spec = mongos(&cr.spec);
    let proxy = mongos_spec
        .map(|m| component_summary(m.resources.as_ref(), None))
        .transpose()
        .map_err(unit_error)?;

    let exposed = match mongos_spec {
        Some(m) => m
            .expose
            .as_ref()
            .and_then(|e| e.expose_type.as_deref())
            .is_some_and(|t| t != "ClusterIP"),
        None => rs.and_then(|r| r.expose.as_ref()).is_some_and(|e| e.enabled),
    };

    Ok(ClusterSummary {
        name,
        size: rs.map(|r| r.size.max(0) as u32).unwrap_or(0),
        state,
        message,
        primary,
        proxy,
        operation,
        exposed,
        paused: cr.spec.pause,
    })
}

/// Translator between cluster requests and PerconaServerMongoDB documents
#[derive(Clone)]
pub struct PsmdbClusters {
    kubectl: Arc<dyn Kubectl>,
}

impl PsmdbClusters {
    /// Create a translator using `kubectl`
    pub fn new(kubectl: Arc<dyn Kubectl>) -> Self {
        Self { kubectl }
    }

    /// List clusters, including ones still deleting
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<ClusterSummary>> {
        let crs: Vec<PerconaServerMongoDb> = list_as(self.kubectl.as_ref(), KIND).await?;
        let mut known = HashSet::new();
        let mut clusters = Vec::with_capacity(crs.len());
        for cr in &crs {
            let summary = summarize(cr)?;
            known.insert(summary.name.clone());
            clusters.push(summary);
        }
        clusters.extend(find_deleting(self.kubectl.as_ref(), OPERATOR_DEPLOYMENT, &mut known).await?);
        debug!(count = clusters.len(), "Listed PSMDB clusters");
        Ok(clusters)
    }

    /// Get one cluster; a cluster whose pods outlive its document is Deleting
    #[instrument(skip(self))]
    pub async fn get(&self, name: &str) -> Result<ClusterSummary> {
        match get_as::<PerconaServerMongoDb>(self.kubectl.as_ref(), KIND, name).await {
            Ok(cr) => summarize(&cr),
            Err(e) if e.is_not_found() => {
                let mut known = HashSet::new();
                find_deleting(self.kubectl.as_ref(), OPERATOR_DEPLOYMENT, &mut known)
                    .await?
                    .into_iter()
                    .find(|c| c.name == name)
                    .ok_or_else(|| Error::not_found(KIND, name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create a cluster
    #[instrument(skip(self, params), fields(cluster = %params.name, size = params.size, sharding = params.sharding))]
    pub async fn create(&self, params: &ReplicaSetClusterParams) -> Result<()> {
        validate_name(&params.name)?;
        validate_size(&params.name, params.size)?;
        let kubectl = self.kubectl.as_ref();

        ensure_absent(kubectl, KIND, &params.name).await?;
        let env = detect_environment(kubectl).await?;
        let cr = build_document(params, env)?;

        let secret = secret_name(&params.name);
        let mut overrides =
            BTreeMap::from([(ADMIN_PASSWORD_KEY.to_string(), generate_password())]);
        if let Some(pmm) = &params.pmm {
            overrides.insert(PMM_USER_KEY.to_string(), pmm.login.clone());
            overrides.insert(PMM_PASSWORD_KEY.to_string(), pmm.password.clone());
        }
        provision_secret(kubectl, TEMPLATE_SECRET, &secret, overrides).await?;

        if let Err(e) = apply_as(kubectl, &cr).await {
            warn!(error = %e, "Failed to apply cluster, removing its secret");
            delete_secret_best_effort(kubectl, &secret).await;
            return Err(e.into());
        }
        info!("Created PSMDB cluster");
        Ok(())
    }

    /// Update size, compute resources or pause state
    #[instrument(skip(self, params), fields(cluster = %params.name))]
    pub async fn update(&self, params: &UpdateParams) -> Result<()> {
        validate_update(params)?;
        let kubectl = self.kubectl.as_ref();
        let mut cr: PerconaServerMongoDb = get_as(kubectl, KIND, &params.name).await?;

        let reported = cr
            .status
            .as_ref()
            .and_then(|s| s.state.clone())
            .unwrap_or_default();
        match PsmdbState::from_str(&reported) {
            Ok(PsmdbState::Ready) => {}
            Ok(PsmdbState::Paused) if params.is_resume_only() => {}
            _ => return Err(Error::not_ready(&params.name, reported)),
        }

        apply_update(&mut cr, params)?;
        cr.metadata = reapply_metadata(&cr.metadata);
        cr.status = None;
        apply_as(kubectl, &cr).await?;
        info!("Updated PSMDB cluster");
        Ok(())
    }

    /// Delete a cluster and, best effort, its secret
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        let kubectl = self.kubectl.as_ref();
        delete_resource(kubectl, API_VERSION, KIND, name).await?;
        delete_secret_best_effort(kubectl, &secret_name(name)).await;
        Ok(())
    }

    /// Rolling-restart the replica set and, when sharded, the config servers
    #[instrument(skip(self))]
    pub async fn restart(&self, name: &str) -> Result<()> {
        let cr: PerconaServerMongoDb = get_as(self.kubectl.as_ref(), KIND, name).await?;
        let mut statefulsets = vec![format!("{name}-{REPLSET_NAME}")];
        if is_sharded(&cr.spec) {
            statefulsets.push(format!("{name}-{CONFIG_REPLSET_NAME}"));
        }
        rollout_restart(self.kubectl.as_ref(), &statefulsets).await?;
        info!("Restarted PSMDB cluster");
        Ok(())
    }

    /// Admin credentials of a cluster.
    ///
    /// Unlike XtraDB, credentials are available while the cluster is still
    /// initializing: the admin user exists as soon as the first member is up.
    #[instrument(skip(self))]
    pub async fn credentials(&self, name: &str) -> Result<Credentials> {
        let kubectl = self.kubectl.as_ref();
        let cr: PerconaServerMongoDb = get_as(kubectl, KIND, name).await?;
        let status = cr.status.clone().unwrap_or_default();
        let reported = status.state.clone().unwrap_or_default();
        match PsmdbState::from_str(&reported) {
            Ok(PsmdbState::Ready | PsmdbState::Initializing) => {}
            _ => return Err(Error::not_ready(name, reported)),
        }

        let secret = cr
            .spec
            .secrets
            .as_ref()
            .map(|s| s.users.clone())
            .unwrap_or_else(|| secret_name(name));
        let data = read_secret(kubectl, &secret).await?;
        let username = required_key(&data, &secret, ADMIN_USER_KEY)?.to_string();
        let password = required_key(&data, &secret, ADMIN_PASSWORD_KEY)?.to_string();

        let sharded = is_sharded(&cr.spec);
        let host = status.host.filter(|h| !h.is_empty()).unwrap_or_else(|| {
            if sharded {
                format!("{name}-mongos")
            } else {
                format!("{name}-{REPLSET_NAME}")
            }
        });
        Ok(Credentials {
            username,
            password,
            host,
            port: PORT,
            replicaset: (!sharded).then(|| REPLSET_NAME.to_string()),
        })
    }
}
