//! XtraDB (Galera) clusters managed by the Percona XtraDB Cluster operator

pub mod crd;

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use dbaas_common::kubectl::{apply_as, get_as, list_as, Kubectl};
use dbaas_common::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info, instrument, warn};

use crate::deletion::find_deleting;
use crate::environment::{detect_environment, KubernetesEnvironment};
use crate::model::{
    ClusterSummary, Credentials, Operation, ProxyKind, UpdateParams, XtraDbClusterParams,
};
use crate::resources::{
    component_summary, join_messages, limits, reapply_metadata, set_limits, Affinity, PmmSpec,
    PodDisruptionBudget, VolumeSpec,
};
use crate::secrets::{
    delete_secret_best_effort, generate_password, provision_secret, read_secret, required_key,
};
use crate::state::{classify_pxc, refine, PxcState};
use crate::validation::{replica_count, validate_name, validate_size, validate_update};
use crate::workloads::{delete_resource, ensure_absent, rollout_restart};
use crate::PMM_CLIENT_IMAGE;

pub use crd::{
    AppStatus, BackupSchedule, BackupSpec, BackupStorageSpec, PerconaXtraDbCluster,
    PerconaXtraDbClusterSpec, PerconaXtraDbClusterStatus, PodSpec, UpgradeOptions,
};

/// Operator version the documents are written for
pub const PXC_OPERATOR_VERSION: &str = "1.11.0";

/// Operator deployment name, also the managed-by label of its pods
pub const OPERATOR_DEPLOYMENT: &str = "percona-xtradb-cluster-operator";

/// Kind passed to kubectl
pub const KIND: &str = "PerconaXtraDBCluster";

/// apiVersion of the documents
pub const API_VERSION: &str = "pxc.percona.com/v1";

/// MySQL port behind either proxy
pub const PORT: u16 = 3306;

/// Database server image
pub const PXC_IMAGE: &str = "percona/percona-xtradb-cluster:8.0.27-18.1";

/// Secret shipped with the operator listing every system user
const TEMPLATE_SECRET: &str = "my-cluster-secrets";

/// Admin user, also its key in the cluster secret
const ROOT_USER: &str = "root";

/// Secret key the operator reads the PMM server password from
const PMM_PASSWORD_KEY: &str = "pmmserver";

/// Finalizer making the operator delete pods in order
const DELETE_PODS_FINALIZER: &str = "delete-pxc-pods-in-order";

/// Proxy volume size when the request does not name one
const DEFAULT_PROXY_DISK_BYTES: u64 = 1024 * 1024 * 1024;

/// Galera needs three nodes to keep quorum; smaller clusters are "unsafe"
const SAFE_CLUSTER_SIZE: u32 = 3;

fn operator_image(variant: &str) -> String {
    format!("percona/percona-xtradb-cluster-operator:{PXC_OPERATOR_VERSION}-{variant}")
}

/// Name of the per-cluster credentials secret
pub fn secret_name(cluster: &str) -> String {
    format!("dbaas-{cluster}-pxc-secrets")
}

/// Name of the per-cluster backup storage
pub fn backup_storage_name(cluster: &str) -> String {
    format!("{cluster}-pxc-backup")
}

/// Component names as used in StatefulSet names and status keys
fn proxy_component(kind: ProxyKind) -> &'static str {
    match kind {
        ProxyKind::HaProxy => "haproxy",
        ProxyKind::ProxySql => "proxysql",
    }
}

/// The enabled proxy of a spec, HAProxy first
fn enabled_proxy(spec: &PerconaXtraDbClusterSpec) -> Option<(ProxyKind, &PodSpec)> {
    if let Some(p) = spec.haproxy.as_ref().filter(|p| p.is_enabled()) {
        return Some((ProxyKind::HaProxy, p));
    }
    spec.proxysql
        .as_ref()
        .filter(|p| p.is_enabled())
        .map(|p| (ProxyKind::ProxySql, p))
}

fn enabled_proxy_mut(spec: &mut PerconaXtraDbClusterSpec) -> Option<&mut PodSpec> {
    if spec.haproxy.as_ref().is_some_and(PodSpec::is_enabled) {
        return spec.haproxy.as_mut();
    }
    spec.proxysql.as_mut().filter(|p| p.is_enabled())
}

/// Build the document for a new cluster
pub fn build_document(
    params: &XtraDbClusterParams,
    env: KubernetesEnvironment,
) -> Result<PerconaXtraDbCluster> {
    let disk_size = params.pxc.disk_size.filter(|d| *d > 0).ok_or_else(|| {
        Error::validation_for_field(
            &params.name,
            "params.pxc.disk_size",
            "data node disk size is required",
        )
    })?;
    let size = replica_count(&params.name, params.size)?;
    let affinity = Affinity::topology_key(env.anti_affinity_topology_key());

    let pxc = PodSpec {
        size,
        image: Some(PXC_IMAGE.to_string()),
        resources: params.pxc.compute_resources.map(limits),
        volume_spec: Some(VolumeSpec::persistent(disk_size)),
        affinity: Some(affinity.clone()),
        pod_disruption_budget: Some(PodDisruptionBudget::one_unavailable()),
        ..Default::default()
    };

    let component = proxy_component(params.proxy_kind);
    let mut proxy = PodSpec {
        enabled: Some(true),
        size,
        image: Some(operator_image(component)),
        resources: params.proxy.compute_resources.map(limits),
        affinity: Some(affinity),
        pod_disruption_budget: Some(PodDisruptionBudget::one_unavailable()),
        service_type: params
            .expose
            .then(|| env.expose_service_type().to_string()),
        ..Default::default()
    };
    let disabled = PodSpec {
        enabled: Some(false),
        ..Default::default()
    };
    let (haproxy, proxysql) = match params.proxy_kind {
        ProxyKind::HaProxy => (proxy, disabled),
        ProxyKind::ProxySql => {
            proxy.volume_spec = Some(VolumeSpec::persistent(
                params.proxy.disk_size.unwrap_or(DEFAULT_PROXY_DISK_BYTES),
            ));
            (disabled, proxy)
        }
    };

    let storage = backup_storage_name(&params.name);
    let backup = BackupSpec {
        image: Some(operator_image("pxc8.0-backup")),
        service_account_name: Some(OPERATOR_DEPLOYMENT.to_string()),
        storages: BTreeMap::from([(
            storage.clone(),
            BackupStorageSpec {
                type_: "filesystem".to_string(),
                volume: Some(VolumeSpec::persistent(disk_size)),
                extra: BTreeMap::new(),
            },
        )]),
        schedule: vec![BackupSchedule {
            name: "daily-backup".to_string(),
            schedule: "0 0 * * *".to_string(),
            keep: 5,
            storage_name: storage,
        }],
    };

    let spec = PerconaXtraDbClusterSpec {
        cr_version: Some(PXC_OPERATOR_VERSION.to_string()),
        allow_unsafe_configurations: Some(params.size < SAFE_CLUSTER_SIZE),
        pause: false,
        secrets_name: Some(secret_name(&params.name)),
        upgrade_options: Some(UpgradeOptions {
            apply: Some("disabled".to_string()),
            schedule: Some("0 4 * * *".to_string()),
            version_service_endpoint: None,
        }),
        pxc: Some(pxc),
        haproxy: Some(haproxy),
        proxysql: Some(proxysql),
        pmm: Some(PmmSpec::from_params(params.pmm.as_ref(), PMM_CLIENT_IMAGE)),
        backup: Some(backup),
        extra: BTreeMap::new(),
    };

    let mut cr = PerconaXtraDbCluster::new(&params.name, spec);
    cr.metadata = ObjectMeta {
        name: Some(params.name.clone()),
        finalizers: Some(vec![DELETE_PODS_FINALIZER.to_string()]),
        ..Default::default()
    };
    Ok(cr)
}

/// Apply a partial update to a fetched document.
///
/// Fails when the document is missing a component the request targets.
pub fn apply_update(cr: &mut PerconaXtraDbCluster, params: &UpdateParams) -> Result<()> {
    let spec = &mut cr.spec;
    if params.suspend {
        spec.pause = true;
    }
    if params.resume {
        spec.pause = false;
    }

    if let Some(size) = params.size {
        let replicas = replica_count(&params.name, size)?;
        let pxc = spec.pxc.as_mut().ok_or_else(|| missing(&params.name, "pxc"))?;
        pxc.size = replicas;
        if size < SAFE_CLUSTER_SIZE {
            spec.allow_unsafe_configurations = Some(true);
        }
        if let Some(proxy) = enabled_proxy_mut(spec) {
            proxy.size = replicas;
        }
    }

    if let Some(compute) = params.primary {
        let pxc = spec.pxc.as_mut().ok_or_else(|| missing(&params.name, "pxc"))?;
        set_limits(pxc.resources.get_or_insert_with(Default::default), compute);
    }

    if let Some(compute) = params.proxy {
        let proxy = enabled_proxy_mut(spec).ok_or_else(|| missing(&params.name, "proxy"))?;
        set_limits(proxy.resources.get_or_insert_with(Default::default), compute);
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
pub fn summarize(cr: &PerconaXtraDbCluster) -> Result<ClusterSummary> {
    let name = cr.metadata.name.clone().unwrap_or_default();
    let default_status = PerconaXtraDbClusterStatus::default();
    let status = cr.status.as_ref().unwrap_or(&default_status);
    let pxc = cr.spec.pxc.as_ref();

    let state = refine(
        classify_pxc(status.state.as_deref()),
        cr.spec.pause,
        pxc.and_then(|p| p.image.as_deref()),
        status.pxc.as_ref().and_then(|s| s.image.as_deref()),
    );

    let components: Vec<&AppStatus> = [&status.pxc, &status.haproxy, &status.proxysql, &status.pmm]
        .into_iter()
        .flatten()
        .collect();
    let message = join_messages(
        status.messages.iter().map(String::as_str).chain(
            components
                .iter()
                .flat_map(|c| c.messages.iter().map(String::as_str)),
        ),
    );
    let mut operation = Operation::default();
    for app in &components {
        operation.add(app.ready, app.size);
    }

    let unit_error = |e: Error| {
        Error::internal_with_context("xtradb", format!("cluster {name:?}: {e}"))
    };
    let primary = component_summary(
        pxc.and_then(|p| p.resources.as_ref()),
        pxc.and_then(|p| p.volume_spec.as_ref()),
    )
    .map_err(unit_error)?;
    let proxy_spec = enabled_proxy(&cr.spec).map(|(_, p)| p);
    let proxy = proxy_spec
        .map(|p| component_summary(p.resources.as_ref(), p.volume_spec.as_ref()))
        .transpose()
        .map_err(unit_error)?;
    let exposed = proxy_spec
        .and_then(|p| p.service_type.as_deref())
        .is_some_and(|t| t != "ClusterIP");

    Ok(ClusterSummary {
        name,
        size: pxc.map(|p| p.size.max(0) as u32).unwrap_or(0),
        state,
        message,
        primary,
        proxy,
        operation,
        exposed,
        paused: cr.spec.pause,
    })
}

/// Translator between cluster requests and PerconaXtraDBCluster documents
#[derive(Clone)]
pub struct XtraDbClusters {
    kubectl: Arc<dyn Kubectl>,
}

impl XtraDbClusters {
    /// Create a translator using `kubectl`
    pub fn new(kubectl: Arc<dyn Kubectl>) -> Self {
        Self { kubectl }
    }

    /// List clusters, including ones still deleting
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<ClusterSummary>> {
        let crs: Vec<PerconaXtraDbCluster> = list_as(self.kubectl.as_ref(), KIND).await?;
        let mut known = HashSet::new();
        let mut clusters = Vec::with_capacity(crs.len());
        for cr in &crs {
            let summary = summarize(cr)?;
            known.insert(summary.name.clone());
            clusters.push(summary);
        }
        clusters.extend(find_deleting(self.kubectl.as_ref(), OPERATOR_DEPLOYMENT, &mut known).await?);
        debug!(count = clusters.len(), "Listed XtraDB clusters");
        Ok(clusters)
    }

    /// Get one cluster; a cluster whose pods outlive its document is Deleting
    #[instrument(skip(self))]
    pub async fn get(&self, name: &str) -> Result<ClusterSummary> {
        match get_as::<PerconaXtraDbCluster>(self.kubectl.as_ref(), KIND, name).await {
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
    #[instrument(skip(self, params), fields(cluster = %params.name, size = params.size))]
    pub async fn create(&self, params: &XtraDbClusterParams) -> Result<()> {
        validate_name(&params.name)?;
        validate_size(&params.name, params.size)?;
        let kubectl = self.kubectl.as_ref();

        ensure_absent(kubectl, KIND, &params.name).await?;
        let env = detect_environment(kubectl).await?;
        let cr = build_document(params, env)?;

        let secret = secret_name(&params.name);
        let mut overrides = BTreeMap::from([(ROOT_USER.to_string(), generate_password())]);
        if let Some(pmm) = &params.pmm {
            overrides.insert(PMM_PASSWORD_KEY.to_string(), pmm.password.clone());
        }
        provision_secret(kubectl, TEMPLATE_SECRET, &secret, overrides).await?;

        if let Err(e) = apply_as(kubectl, &cr).await {
            warn!(error = %e, "Failed to apply cluster, removing its secret");
            delete_secret_best_effort(kubectl, &secret).await;
            return Err(e.into());
        }
        info!("Created XtraDB cluster");
        Ok(())
    }

    /// Update size, compute resources or pause state
    #[instrument(skip(self, params), fields(cluster = %params.name))]
    pub async fn update(&self, params: &UpdateParams) -> Result<()> {
        validate_update(params)?;
        let kubectl = self.kubectl.as_ref();
        let mut cr: PerconaXtraDbCluster = get_as(kubectl, KIND, &params.name).await?;

        let reported = cr
            .status
            .as_ref()
            .and_then(|s| s.state.clone())
            .unwrap_or_default();
        match PxcState::from_str(&reported) {
            Ok(PxcState::Ready) => {}
            Ok(PxcState::Paused) if params.is_resume_only() => {}
            _ => return Err(Error::not_ready(&params.name, reported)),
        }

        apply_update(&mut cr, params)?;
        cr.metadata = reapply_metadata(&cr.metadata);
        cr.status = None;
        apply_as(kubectl, &cr).await?;
        info!("Updated XtraDB cluster");
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

    /// Rolling-restart the data nodes and the enabled proxy
    #[instrument(skip(self))]
    pub async fn restart(&self, name: &str) -> Result<()> {
        let cr: PerconaXtraDbCluster = get_as(self.kubectl.as_ref(), KIND, name).await?;
        let mut statefulsets = vec![format!("{name}-pxc")];
        if let Some((kind, _)) = enabled_proxy(&cr.spec) {
            statefulsets.push(format!("{name}-{}", proxy_component(kind)));
        }
        rollout_restart(self.kubectl.as_ref(), &statefulsets).await?;
        info!("Restarted XtraDB cluster");
        Ok(())
    }

    /// Admin credentials of a ready cluster
    #[instrument(skip(self))]
    pub async fn credentials(&self, name: &str) -> Result<Credentials> {
        let kubectl = self.kubectl.as_ref();
        let cr: PerconaXtraDbCluster = get_as(kubectl, KIND, name).await?;
        let status = cr.status.clone().unwrap_or_default();
        let reported = status.state.clone().unwrap_or_default();
        if PxcState::from_str(&reported) != Ok(PxcState::Ready) {
            return Err(Error::not_ready(name, reported));
        }

        let secret = cr.spec.secrets_name.clone().unwrap_or_else(|| secret_name(name));
        let data = read_secret(kubectl, &secret).await?;
        let password = required_key(&data, &secret, ROOT_USER)?.to_string();

        let host = status.host.filter(|h| !h.is_empty()).unwrap_or_else(|| {
            let component = enabled_proxy(&cr.spec)
                .map(|(kind, _)| proxy_component(kind))
                .unwrap_or("pxc");
            format!("{name}-{component}")
        });
        Ok(Credentials {
            username: ROOT_USER.to_string(),
            password,
            host,
            port: PORT,
            replicaset: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClusterState, ComponentParams, ComputeResources, PmmParams};
    use dbaas_common::kubectl::{KubectlError, MockKubectl};
    use dbaas_common::testing::FakeKubectl;
    use serde_json::{json, Value};

    const GIB: u64 = 1024 * 1024 * 1024;

    fn params(name: &str) -> XtraDbClusterParams {
        XtraDbClusterParams {
            name: name.to_string(),
            size: 1,
            pxc: ComponentParams {
                compute_resources: Some(ComputeResources {
                    cpu_millis: 200,
                    memory_bytes: GIB,
                }),
                disk_size: Some(2 * GIB),
            },
            proxy: ComponentParams::default(),
            proxy_kind: ProxyKind::HaProxy,
            expose: false,
            pmm: None,
        }
    }

    fn seeded() -> FakeKubectl {
        let fake = FakeKubectl::new();
        fake.insert(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": TEMPLATE_SECRET},
            "data": {"root": "cm9vdA==", "xtrabackup": "eGI="}
        }));
        fake.insert(json!({
            "apiVersion": "storage.k8s.io/v1",
            "kind": "StorageClass",
            "metadata": {
                "name": "standard",
                "annotations": {"storageclass.kubernetes.io/is-default-class": "true"}
            },
            "provisioner": "k8s.io/minikube-hostpath"
        }));
        fake
    }

    fn set_state(fake: &FakeKubectl, name: &str, state: &str) {
        assert!(fake.update(KIND, name, |cr| {
            cr["status"] = json!({
                "state": state,
                "host": format!("{name}-haproxy.default"),
                "pxc": {"size": 1, "ready": 1, "image": PXC_IMAGE},
                "haproxy": {"size": 1, "ready": 1}
            });
        }));
    }

    #[test]
    fn document_uses_operator_field_names() {
        let cr = build_document(&params("c1"), KubernetesEnvironment::Generic).unwrap();
        let v = serde_json::to_value(&cr).unwrap();

        assert_eq!(v["apiVersion"], API_VERSION);
        assert_eq!(v["kind"], KIND);
        assert_eq!(v["metadata"]["name"], "c1");
        assert_eq!(v["spec"]["secretsName"], "dbaas-c1-pxc-secrets");
        assert_eq!(v["spec"]["pxc"]["size"], 1);
        assert_eq!(v["spec"]["pxc"]["resources"]["limits"]["cpu"], "200m");
        assert_eq!(v["spec"]["pxc"]["resources"]["limits"]["memory"], "1073741824");
        assert_eq!(
            v["spec"]["pxc"]["volumeSpec"]["persistentVolumeClaim"]["resources"]["requests"]["storage"],
            "2147483648"
        );
        assert_eq!(
            v["spec"]["pxc"]["affinity"]["antiAffinityTopologyKey"],
            "kubernetes.io/hostname"
        );
        assert_eq!(v["spec"]["haproxy"]["enabled"], true);
        assert_eq!(v["spec"]["proxysql"]["enabled"], false);
        assert_eq!(v["spec"]["allowUnsafeConfigurations"], true);
        assert_eq!(v["spec"]["pmm"]["enabled"], false);
        assert_eq!(v["spec"]["backup"]["schedule"][0]["storageName"], "c1-pxc-backup");
        assert!(v["spec"]["backup"]["storages"]["c1-pxc-backup"].is_object());
        assert!(v.get("status").is_none());
    }

    #[test]
    fn minikube_disables_anti_affinity_and_exposes_via_node_port() {
        let mut p = params("c1");
        p.expose = true;
        p.proxy_kind = ProxyKind::ProxySql;
        let cr = build_document(&p, KubernetesEnvironment::Minikube).unwrap();

        let pxc = cr.spec.pxc.as_ref().unwrap();
        assert_eq!(
            pxc.affinity.as_ref().unwrap().anti_affinity_topology_key.as_deref(),
            Some("none")
        );
        let proxysql = cr.spec.proxysql.as_ref().unwrap();
        assert!(proxysql.is_enabled());
        assert_eq!(proxysql.service_type.as_deref(), Some("NodePort"));
        assert_eq!(
            proxysql.volume_spec.as_ref().unwrap().disk_size().unwrap(),
            DEFAULT_PROXY_DISK_BYTES
        );
        assert!(!cr.spec.haproxy.as_ref().unwrap().is_enabled());
    }

    #[test]
    fn missing_disk_size_is_invalid() {
        let mut p = params("c1");
        p.pxc.disk_size = None;
        let err = build_document(&p, KubernetesEnvironment::Generic).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn pmm_block_follows_public_address() {
        let mut p = params("c1");
        p.pmm = Some(PmmParams {
            public_address: "pmm.example.com".into(),
            login: "admin".into(),
            password: "pw".into(),
        });
        let cr = build_document(&p, KubernetesEnvironment::Generic).unwrap();
        let pmm = cr.spec.pmm.unwrap();
        assert!(pmm.enabled);
        assert_eq!(pmm.image.as_deref(), Some(PMM_CLIENT_IMAGE));
    }

    fn fetched(value: Value) -> PerconaXtraDbCluster {
        serde_json::from_value(value).expect("valid document")
    }

    fn ready_cluster() -> Value {
        json!({
            "apiVersion": API_VERSION,
            "kind": KIND,
            "metadata": {"name": "c1", "resourceVersion": "9"},
            "spec": {
                "pause": false,
                "crVersion": "1.11.0",
                "pxc": {
                    "size": 3,
                    "image": PXC_IMAGE,
                    "resources": {"limits": {"cpu": "1", "memory": "2Gi"}},
                    "volumeSpec": {"persistentVolumeClaim": {"resources": {"requests": {"storage": "6Gi"}}}},
                    "configuration": "[mysqld]\nwsrep_debug=ON"
                },
                "haproxy": {"enabled": true, "size": 3, "serviceType": "LoadBalancer"},
                "proxysql": {"enabled": false, "size": 0}
            },
            "status": {
                "state": "ready",
                "message": ["all good"],
                "host": "c1-haproxy.default",
                "pxc": {"size": 3, "ready": 3, "image": PXC_IMAGE},
                "haproxy": {"size": 3, "ready": 2, "message": ["one pod pending"]},
                "pmm": {"size": 0, "ready": 0}
            }
        })
    }

    #[test]
    fn summary_reads_resources_progress_and_messages() {
        let summary = summarize(&fetched(ready_cluster())).unwrap();
        assert_eq!(summary.name, "c1");
        assert_eq!(summary.size, 3);
        assert_eq!(summary.state, ClusterState::Ready);
        assert_eq!(summary.message, "all good; one pod pending");
        assert_eq!(
            summary.primary.compute_resources,
            Some(ComputeResources {
                cpu_millis: 1000,
                memory_bytes: 2 * GIB
            })
        );
        assert_eq!(summary.primary.disk_size, 6 * GIB);
        let proxy = summary.proxy.unwrap();
        assert_eq!(proxy.compute_resources, None);
        assert_eq!(proxy.disk_size, 0);
        assert_eq!(summary.operation.finished_steps, 5);
        assert_eq!(summary.operation.total_steps, 6);
        assert!(summary.exposed);
        assert!(!summary.paused);
    }

    #[test]
    fn summary_of_paused_and_upgrading_clusters() {
        let mut v = ready_cluster();
        v["spec"]["pause"] = json!(true);
        assert_eq!(summarize(&fetched(v)).unwrap().state, ClusterState::Paused);

        let mut v = ready_cluster();
        v["status"]["state"] = json!("initializing");
        v["spec"]["pxc"]["image"] = json!("percona/percona-xtradb-cluster:8.0.28-19.1");
        assert_eq!(summarize(&fetched(v)).unwrap().state, ClusterState::Upgrading);
    }

    #[test]
    fn summary_with_malformed_quantity_is_internal() {
        let mut v = ready_cluster();
        v["spec"]["pxc"]["resources"]["limits"]["memory"] = json!("12Qi");
        let err = summarize(&fetched(v)).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
        assert!(err.to_string().contains("Qi"));
    }

    #[test]
    fn update_keeps_unmanaged_fields() {
        let mut cr = fetched(ready_cluster());
        apply_update(
            &mut cr,
            &UpdateParams {
                name: "c1".into(),
                size: Some(5),
                proxy: Some(ComputeResources {
                    cpu_millis: 300,
                    memory_bytes: 1,
                }),
                ..Default::default()
            },
        )
        .unwrap();
        let v = serde_json::to_value(&cr).unwrap();
        assert_eq!(v["spec"]["pxc"]["size"], 5);
        assert_eq!(v["spec"]["haproxy"]["size"], 5);
        assert_eq!(v["spec"]["haproxy"]["resources"]["limits"]["cpu"], "300m");
        assert_eq!(v["spec"]["proxysql"]["size"], 0);
        assert_eq!(v["spec"]["pxc"]["configuration"], "[mysqld]\nwsrep_debug=ON");
        assert_eq!(v["spec"]["crVersion"], "1.11.0");
    }

    /// Story: create provisions a secret and applies the document
    #[tokio::test]
    async fn story_create_provisions_secret_then_applies() {
        let fake = Arc::new(seeded());
        let clusters = XtraDbClusters::new(fake.clone());

        clusters.create(&params("c1")).await.unwrap();

        let secret = read_secret(fake.as_ref(), "dbaas-c1-pxc-secrets").await.unwrap();
        assert_eq!(secret["root"].len(), crate::secrets::PASSWORD_LENGTH);
        assert_eq!(secret["xtrabackup"], "xb");
        let cr = fake.object(KIND, "c1").unwrap();
        assert_eq!(cr["spec"]["pxc"]["affinity"]["antiAffinityTopologyKey"], "none");

        let listed = clusters.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, ClusterState::Changing);
    }

    /// Story: creating a duplicate never touches the existing cluster
    #[tokio::test]
    async fn story_duplicate_create_is_rejected_without_apply() {
        let mut kubectl = MockKubectl::new();
        kubectl
            .expect_get()
            .times(1)
            .returning(|_, _| Ok(ready_cluster()));
        kubectl.expect_apply().never();
        kubectl.expect_list().never();
        let clusters = XtraDbClusters::new(Arc::new(kubectl));

        let err = clusters.create(&params("c1")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn failed_apply_removes_the_new_secret() {
        let mut kubectl = MockKubectl::new();
        kubectl.expect_get().returning(|kind, name| match kind {
            "Secret" => Ok(json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": name},
                "data": {"root": "cm9vdA=="}
            })),
            _ => Err(KubectlError::not_found(kind, name)),
        });
        kubectl.expect_list().returning(|_| Ok(Vec::new()));
        kubectl
            .expect_apply()
            .withf(|v| v["kind"] == "Secret")
            .times(1)
            .returning(|_| Ok(()));
        kubectl
            .expect_apply()
            .withf(|v| v["kind"] == KIND)
            .times(1)
            .returning(|_| {
                Err(KubectlError::ExecutionFailed {
                    command: "kubectl apply -f -".into(),
                    stderr: "admission webhook denied".into(),
                })
            });
        kubectl
            .expect_delete()
            .withf(|v| v["kind"] == "Secret" && v["metadata"]["name"] == "dbaas-c1-pxc-secrets")
            .times(1)
            .returning(|_| Ok(()));

        let clusters = XtraDbClusters::new(Arc::new(kubectl));
        let err = clusters.create(&params("c1")).await.unwrap_err();
        assert!(matches!(err, Error::Kubectl { .. }));
    }

    #[tokio::test]
    async fn invalid_create_makes_no_calls() {
        let mut kubectl = MockKubectl::new();
        kubectl.expect_get().never();
        let clusters = XtraDbClusters::new(Arc::new(kubectl));
        let mut p = params("c1");
        p.size = 0;
        assert!(matches!(
            clusters.create(&p).await.unwrap_err(),
            Error::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn oversized_cluster_is_rejected_on_create_and_update() {
        let mut p = params("c1");
        p.size = 3_000_000_000;
        assert!(matches!(
            build_document(&p, KubernetesEnvironment::Generic).unwrap_err(),
            Error::Validation { .. }
        ));

        let mut kubectl = MockKubectl::new();
        kubectl.expect_get().never();
        kubectl.expect_apply().never();
        let clusters = XtraDbClusters::new(Arc::new(kubectl));
        assert!(matches!(
            clusters.create(&p).await.unwrap_err(),
            Error::Validation { .. }
        ));
        assert!(matches!(
            clusters
                .update(&UpdateParams {
                    name: "c1".into(),
                    size: Some(3_000_000_000),
                    ..Default::default()
                })
                .await
                .unwrap_err(),
            Error::Validation { .. }
        ));

        let mut cr = fetched(ready_cluster());
        let err = apply_update(
            &mut cr,
            &UpdateParams {
                name: "c1".into(),
                size: Some(u32::MAX),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(cr.spec.pxc.as_ref().unwrap().size > 0);
    }

    /// Story: an update while the operator is still working is rejected
    #[tokio::test]
    async fn story_update_of_changing_cluster_is_not_ready() {
        let fake = Arc::new(seeded());
        let clusters = XtraDbClusters::new(fake.clone());
        clusters.create(&params("c1")).await.unwrap();
        set_state(&fake, "c1", "initializing");
        let before = fake.object(KIND, "c1");

        let err = clusters
            .update(&UpdateParams {
                name: "c1".into(),
                size: Some(3),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotReady { ref state, .. } if state == "initializing"));
        assert_eq!(fake.object(KIND, "c1"), before);
    }

    #[tokio::test]
    async fn update_of_missing_cluster_is_not_found() {
        let clusters = XtraDbClusters::new(Arc::new(FakeKubectl::new()));
        let err = clusters
            .update(&UpdateParams {
                name: "nope".into(),
                suspend: true,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn suspend_then_resume_a_paused_cluster() {
        let fake = Arc::new(seeded());
        let clusters = XtraDbClusters::new(fake.clone());
        clusters.create(&params("c1")).await.unwrap();
        set_state(&fake, "c1", "ready");

        clusters
            .update(&UpdateParams {
                name: "c1".into(),
                suspend: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(fake.object(KIND, "c1").unwrap()["spec"]["pause"], true);
        assert_eq!(clusters.get("c1").await.unwrap().state, ClusterState::Paused);

        set_state(&fake, "c1", "paused");
        let resize = UpdateParams {
            name: "c1".into(),
            size: Some(3),
            resume: true,
            ..Default::default()
        };
        assert!(matches!(
            clusters.update(&resize).await.unwrap_err(),
            Error::NotReady { .. }
        ));

        clusters
            .update(&UpdateParams {
                name: "c1".into(),
                resume: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(fake.object(KIND, "c1").unwrap()["spec"]["pause"], false);
    }

    #[tokio::test]
    async fn credentials_require_ready_cluster() {
        let fake = Arc::new(seeded());
        let clusters = XtraDbClusters::new(fake.clone());
        clusters.create(&params("c1")).await.unwrap();

        set_state(&fake, "c1", "initializing");
        assert!(matches!(
            clusters.credentials("c1").await.unwrap_err(),
            Error::NotReady { .. }
        ));

        set_state(&fake, "c1", "ready");
        let creds = clusters.credentials("c1").await.unwrap();
        assert_eq!(creds.username, "root");
        assert_eq!(creds.password.len(), crate::secrets::PASSWORD_LENGTH);
        assert_eq!(creds.host, "c1-haproxy.default");
        assert_eq!(creds.port, 3306);
        assert_eq!(creds.replicaset, None);

        assert!(clusters.credentials("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn restart_targets_data_nodes_and_enabled_proxy() {
        let fake = Arc::new(seeded());
        let clusters = XtraDbClusters::new(fake.clone());
        let mut p = params("c1");
        p.proxy_kind = ProxyKind::ProxySql;
        clusters.create(&p).await.unwrap();

        clusters.restart("c1").await.unwrap();
        assert!(fake
            .calls()
            .contains(&"rollout restart statefulset c1-pxc c1-proxysql".to_string()));
    }

    #[tokio::test]
    async fn delete_removes_document_and_secret() {
        let fake = Arc::new(seeded());
        let clusters = XtraDbClusters::new(fake.clone());
        clusters.create(&params("c1")).await.unwrap();

        clusters.delete("c1").await.unwrap();
        assert!(fake.object(KIND, "c1").is_none());
        assert!(fake.object("Secret", "dbaas-c1-pxc-secrets").is_none());

        assert!(clusters.delete("c1").await.unwrap_err().is_not_found());
    }
}
