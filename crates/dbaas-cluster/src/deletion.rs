//! Clusters whose custom resource is gone but whose pods are still terminating
//!
//! Custom-resource deletion is asynchronous: the operator tears pods down
//! after the document disappears. Until the last pod is gone the cluster is
//! reported as Deleting, derived from pod labels alone. The pod list is
//! fetched after the CR list, so the result is a best-effort snapshot.

use std::collections::HashSet;

use dbaas_common::kubectl::{list_as, Kubectl};
use dbaas_common::{Result, LABEL_INSTANCE, LABEL_MANAGED_BY};
use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use crate::model::ClusterSummary;

/// Synthesize Deleting entries from `pods`.
///
/// A pod counts when its managed-by label equals `managed_by` and its
/// instance name is not in `known`. Each newly seen name is added to `known`
/// as it is found, so several pods of one cluster yield one entry.
pub fn deleting_from_pods(
    pods: &[Pod],
    managed_by: &str,
    known: &mut HashSet<String>,
) -> Vec<ClusterSummary> {
    let mut deleting = Vec::new();
    for pod in pods {
        let Some(labels) = pod.metadata.labels.as_ref() else {
            continue;
        };
        if labels.get(LABEL_MANAGED_BY).map(String::as_str) != Some(managed_by) {
            continue;
        }
        let Some(instance) = labels.get(LABEL_INSTANCE).filter(|i| !i.is_empty()) else {
            continue;
        };
        if known.insert(instance.clone()) {
            debug!(cluster = %instance, "pods without a custom resource, cluster is deleting");
            deleting.push(ClusterSummary::deleting(instance.clone()));
        }
    }
    deleting
}

/// Fetch all pods and synthesize Deleting entries for clusters not in `known`
pub async fn find_deleting(
    kubectl: &dyn Kubectl,
    managed_by: &str,
    known: &mut HashSet<String>,
) -> Result<Vec<ClusterSummary>> {
    let pods: Vec<Pod> = list_as(kubectl, "Pod").await?;
    Ok(deleting_from_pods(&pods, managed_by, known))
}
