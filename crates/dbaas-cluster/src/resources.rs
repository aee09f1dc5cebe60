//! Custom-resource fragments shared by both operators
//!
//! Volume specs, compute limits, anti-affinity and the PMM block have the
//! same shape in both operators' documents. Fields this crate does not
//! manage are kept in `extra` maps so a read-modify-apply cycle does not
//! drop them.

use std::collections::BTreeMap;

use dbaas_common::units::{bytes_from_str, milli_cpu_from_str, str_from_bytes, str_from_milli_cpu};
use dbaas_common::Result;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaimSpec, ResourceRequirements, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ComponentSummary, ComputeResources, PmmParams};

/// Annotation kubectl stores the last applied document in
const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Storage of a component
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// PVC template used for each pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimSpec>,

    /// Everything else (emptyDir, hostPath, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl VolumeSpec {
    /// A ReadWriteOnce claim of `bytes`
    pub fn persistent(bytes: u64) -> Self {
        Self {
            persistent_volume_claim: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        "storage".to_string(),
                        Quantity(str_from_bytes(bytes)),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            extra: BTreeMap::new(),
        }
    }

    /// Requested storage in bytes, 0 when the claim sets none
    pub fn disk_size(&self) -> Result<u64> {
        let storage = self
            .persistent_volume_claim
            .as_ref()
            .and_then(|pvc| pvc.resources.as_ref())
            .and_then(|r| r.requests.as_ref())
            .and_then(|r| r.get("storage"))
            .map(|q| q.0.as_str())
            .unwrap_or("0");
        bytes_from_str(storage)
    }
}

/// Pod affinity block understood by both operators
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Affinity {
    /// `none` disables anti-affinity; otherwise a node label key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_affinity_topology_key: Option<String>,

    /// Raw affinity rules and anything else
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Affinity {
    /// Affinity with only the topology key set
    pub fn topology_key(key: &str) -> Self {
        Self {
            anti_affinity_topology_key: Some(key.to_string()),
            extra: BTreeMap::new(),
        }
    }
}

/// Pod disruption budget block
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodDisruptionBudget {
    /// Maximum unavailable pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i32>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PodDisruptionBudget {
    /// Allow one pod down at a time
    pub fn one_unavailable() -> Self {
        Self {
            max_unavailable: Some(1),
            extra: BTreeMap::new(),
        }
    }
}

/// PMM monitoring sidecar block
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PmmSpec {
    /// Whether the sidecar runs
    #[serde(default)]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// PMM server address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_host: Option<String>,

    /// PMM server login; the password lives in the cluster secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_user: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PmmSpec {
    /// Sidecar block for `pmm`, enabled only when a public address is given
    pub fn from_params(pmm: Option<&PmmParams>, image: &str) -> Self {
        match pmm.filter(|p| !p.public_address.is_empty()) {
            Some(p) => Self {
                enabled: true,
                image: Some(image.to_string()),
                server_host: Some(p.public_address.clone()),
                server_user: Some(p.login.clone()),
                extra: BTreeMap::new(),
            },
            None => Self::default(),
        }
    }
}

/// Compute limits as a resource requirements block
pub fn limits(compute: ComputeResources) -> ResourceRequirements {
    let mut req = ResourceRequirements::default();
    set_limits(&mut req, compute);
    req
}

/// Overwrite the CPU and memory limits, keeping requests and other limits
pub fn set_limits(req: &mut ResourceRequirements, compute: ComputeResources) {
    let limits = req.limits.get_or_insert_with(BTreeMap::new);
    limits.insert(
        "cpu".to_string(),
        Quantity(str_from_milli_cpu(compute.cpu_millis)),
    );
    limits.insert(
        "memory".to_string(),
        Quantity(str_from_bytes(compute.memory_bytes)),
    );
}

/// Compute limits of a component; `None` when the document sets no limits
pub fn compute_from_requirements(
    req: Option<&ResourceRequirements>,
) -> Result<Option<ComputeResources>> {
    let Some(limits) = req.and_then(|r| r.limits.as_ref()).filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    let cpu_millis = match limits.get("cpu") {
        Some(q) => milli_cpu_from_str(&q.0)?,
        None => 0,
    };
    let memory_bytes = match limits.get("memory") {
        Some(q) => bytes_from_str(&q.0)?,
        None => 0,
    };
    Ok(Some(ComputeResources {
        cpu_millis,
        memory_bytes,
    }))
}

/// Resource snapshot of a component from its limits and volume
pub fn component_summary(
    req: Option<&ResourceRequirements>,
    volume: Option<&VolumeSpec>,
) -> Result<ComponentSummary> {
    Ok(ComponentSummary {
        compute_resources: compute_from_requirements(req)?,
        disk_size: match volume {
            Some(v) => v.disk_size()?,
            None => 0,
        },
    })
}

/// Metadata to send back when re-applying a fetched document.
///
/// Server-owned fields are dropped, so apply does not trip over stale
/// resource versions or managed fields.
pub fn reapply_metadata(meta: &ObjectMeta) -> ObjectMeta {
    let annotations = meta.annotations.clone().map(|mut a| {
        a.remove(LAST_APPLIED_ANNOTATION);
        a
    });
    ObjectMeta {
        name: meta.name.clone(),
        namespace: meta.namespace.clone(),
        labels: meta.labels.clone(),
        annotations: annotations.filter(|a| !a.is_empty()),
        finalizers: meta.finalizers.clone(),
        ..Default::default()
    }
}

/// Join operator messages, skipping empty ones
pub fn join_messages<'a>(messages: impl IntoIterator<Item = &'a str>) -> String {
    messages
        .into_iter()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn persistent_volume_stores_plain_bytes() {
        let v = serde_json::to_value(VolumeSpec::persistent(GIB)).unwrap();
        assert_eq!(
            v,
            json!({
                "persistentVolumeClaim": {
                    "accessModes": ["ReadWriteOnce"],
                    "resources": {"requests": {"storage": "1073741824"}}
                }
            })
        );
    }

    #[test]
    fn disk_size_reads_suffixed_and_absent_requests() {
        let v: VolumeSpec = serde_json::from_value(json!({
            "persistentVolumeClaim": {"resources": {"requests": {"storage": "6Gi"}}}
        }))
        .unwrap();
        assert_eq!(v.disk_size().unwrap(), 6 * GIB);

        let empty: VolumeSpec = serde_json::from_value(json!({"emptyDir": {}})).unwrap();
        assert_eq!(empty.disk_size().unwrap(), 0);
        assert!(empty.extra.contains_key("emptyDir"));
    }

    #[test]
    fn unset_limits_are_distinguishable_from_zero() {
        assert_eq!(compute_from_requirements(None).unwrap(), None);
        assert_eq!(
            compute_from_requirements(Some(&ResourceRequirements::default())).unwrap(),
            None
        );

        let zero = limits(ComputeResources::default());
        assert_eq!(
            compute_from_requirements(Some(&zero)).unwrap(),
            Some(ComputeResources::default())
        );
    }

    #[test]
    fn limits_round_trip_through_quantities() {
        let compute = ComputeResources {
            cpu_millis: 200,
            memory_bytes: GIB,
        };
        let req = limits(compute);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"limits": {"cpu": "200m", "memory": "1073741824"}}));
        assert_eq!(compute_from_requirements(Some(&req)).unwrap(), Some(compute));
    }

    #[test]
    fn suffixed_operator_limits_are_parsed() {
        let req: ResourceRequirements =
            serde_json::from_value(json!({"limits": {"cpu": "1", "memory": "2Gi"}})).unwrap();
        assert_eq!(
            compute_from_requirements(Some(&req)).unwrap(),
            Some(ComputeResources {
                cpu_millis: 1000,
                memory_bytes: 2 * GIB
            })
        );
    }

    #[test]
    fn set_limits_keeps_requests() {
        let mut req: ResourceRequirements =
            serde_json::from_value(json!({"requests": {"cpu": "100m"}})).unwrap();
        set_limits(
            &mut req,
            ComputeResources {
                cpu_millis: 500,
                memory_bytes: 1,
            },
        );
        assert_eq!(req.requests.unwrap()["cpu"].0, "100m");
        assert_eq!(req.limits.unwrap()["cpu"].0, "500m");
    }

    #[test]
    fn pmm_is_enabled_only_with_an_address() {
        let params = PmmParams {
            public_address: "pmm.example.com".into(),
            login: "admin".into(),
            password: "pw".into(),
        };
        let on = PmmSpec::from_params(Some(&params), "percona/pmm-client:2");
        assert!(on.enabled);
        assert_eq!(on.server_host.as_deref(), Some("pmm.example.com"));

        let blank = PmmParams {
            public_address: String::new(),
            ..params
        };
        assert!(!PmmSpec::from_params(Some(&blank), "img").enabled);
        assert!(!PmmSpec::from_params(None, "img").enabled);
    }

    #[test]
    fn reapply_metadata_drops_server_fields() {
        let meta: ObjectMeta = serde_json::from_value(json!({
            "name": "c1",
            "resourceVersion": "42",
            "uid": "abc",
            "annotations": {LAST_APPLIED_ANNOTATION: "{}"},
            "finalizers": ["delete-pxc-pods-in-order"]
        }))
        .unwrap();
        let out = reapply_metadata(&meta);
        assert_eq!(out.name.as_deref(), Some("c1"));
        assert!(out.resource_version.is_none());
        assert!(out.uid.is_none());
        assert!(out.annotations.is_none());
        assert_eq!(out.finalizers.unwrap(), vec!["delete-pxc-pods-in-order"]);
    }

    #[test]
    fn messages_are_joined_without_blanks() {
        assert_eq!(join_messages(["a", "", " b "]), "a; b");
        assert_eq!(join_messages(Vec::<&str>::new()), "");
    }
}
