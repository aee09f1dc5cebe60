//! Detection of single-node development clusters
//!
//! Minikube-style clusters have one node, so hostname anti-affinity would
//! leave every replica but one unschedulable, and LoadBalancer services
//! never get an address. They are recognized by the provisioner of the
//! default storage class.

use dbaas_common::kubectl::{list_as, Kubectl};
use dbaas_common::Result;
use k8s_openapi::api::storage::v1::StorageClass;
use tracing::debug;

/// Substring of the storage provisioner that identifies minikube
const MINIKUBE_PROVISIONER_MARKER: &str = "minikube";

/// Annotation marking the default storage class
const DEFAULT_CLASS_ANNOTATION: &str = "storageclass.kubernetes.io/is-default-class";

/// Legacy annotation, still set by some distributions
const BETA_DEFAULT_CLASS_ANNOTATION: &str = "storageclass.beta.kubernetes.io/is-default-class";

/// Topology key value that disables anti-affinity in both operators
pub const ANTI_AFFINITY_DISABLED: &str = "none";

/// Hostname topology key spreading replicas across nodes
pub const ANTI_AFFINITY_HOSTNAME: &str = "kubernetes.io/hostname";

/// Kind of Kubernetes cluster the databases are deployed into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KubernetesEnvironment {
    /// Single-node local cluster
    Minikube,
    /// Anything else
    Generic,
}

impl KubernetesEnvironment {
    /// Anti-affinity topology key for database pods
    pub fn anti_affinity_topology_key(self) -> &'static str {
        match self {
            Self::Minikube => ANTI_AFFINITY_DISABLED,
            Self::Generic => ANTI_AFFINITY_HOSTNAME,
        }
    }

    /// Service type used to expose a cluster outside Kubernetes
    pub fn expose_service_type(self) -> &'static str {
        match self {
            Self::Minikube => "NodePort",
            Self::Generic => "LoadBalancer",
        }
    }
}

fn is_default(class: &StorageClass) -> bool {
    class.metadata.annotations.as_ref().is_some_and(|a| {
        [DEFAULT_CLASS_ANNOTATION, BETA_DEFAULT_CLASS_ANNOTATION]
            .iter()
            .any(|key| a.get(*key).map(String::as_str) == Some("true"))
    })
}

/// Classify an environment from its storage classes
pub fn environment_from_storage_classes(classes: &[StorageClass]) -> KubernetesEnvironment {
    match classes.iter().find(|c| is_default(c)) {
        Some(class) if class.provisioner.contains(MINIKUBE_PROVISIONER_MARKER) => {
            KubernetesEnvironment::Minikube
        }
        _ => KubernetesEnvironment::Generic,
    }
}

/// Detect the environment by listing storage classes
pub async fn detect_environment(kubectl: &dyn Kubectl) -> Result<KubernetesEnvironment> {
    let classes: Vec<StorageClass> = list_as(kubectl, "StorageClass").await?;
    let env = environment_from_storage_classes(&classes);
    debug!(environment = ?env, "Detected Kubernetes environment");
    Ok(env)
}
