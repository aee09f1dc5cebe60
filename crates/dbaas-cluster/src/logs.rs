//! Container logs and pod events of a cluster's pods

use dbaas_common::kubectl::{list_as, Kubectl};
use dbaas_common::{Error, Result, LABEL_INSTANCE};
use k8s_openapi::api::core::v1::{Event, Pod};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Lines of each container log kept
pub const DEFAULT_TAIL_LINES: u32 = 1000;

/// Which pods and containers to collect from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    /// Every container of every pod
    #[default]
    AllLogs,
    /// Only pods that are not healthy, and only their non-ready containers
    FailingOnly,
}

/// Logs of one container, or the events of a pod when `container` is None
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodLogs {
    pub pod: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub logs: Vec<String>,
}

#[derive(Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<Event>,
}

fn pod_is_healthy(pod: &Pod) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    match status.phase.as_deref() {
        Some("Succeeded") => true,
        Some("Running") => status
            .container_statuses
            .as_ref()
            .is_some_and(|cs| cs.iter().all(|c| c.ready)),
        _ => false,
    }
}

fn container_is_ready(pod: &Pod, container: &str) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .and_then(|cs| cs.iter().find(|c| c.name == container))
        .is_some_and(|c| c.ready)
}

/// Containers of `pod` to collect from `source`
fn containers_for(pod: &Pod, source: LogSource) -> Vec<String> {
    let Some(spec) = pod.spec.as_ref() else {
        return Vec::new();
    };
    spec.containers
        .iter()
        .map(|c| c.name.clone())
        .filter(|name| match source {
            LogSource::AllLogs => true,
            LogSource::FailingOnly => !container_is_ready(pod, name),
        })
        .collect()
}

fn lines(output: Vec<u8>) -> Vec<String> {
    String::from_utf8_lossy(&output)
        .lines()
        .map(str::to_string)
        .collect()
}

async fn container_logs(kubectl: &dyn Kubectl, pod: &str, container: &str, tail: u32) -> Vec<String> {
    let args = vec![
        "logs".to_string(),
        pod.to_string(),
        "-c".to_string(),
        container.to_string(),
        format!("--tail={tail}"),
    ];
    match kubectl.run(&args, None).await {
        Ok(output) => lines(output),
        // Crash-looping or not yet started containers have no logs yet;
        // report why instead of dropping the pod from the answer.
        Err(e) => {
            warn!(pod, container, error = %e, "Failed to collect container logs");
            vec![format!("failed to get logs: {e}")]
        }
    }
}

async fn pod_events(kubectl: &dyn Kubectl, pod: &str) -> Result<Vec<String>> {
    let args = vec![
        "get".to_string(),
        "events".to_string(),
        "--field-selector".to_string(),
        format!("involvedObject.kind=Pod,involvedObject.name={pod}"),
        "-o".to_string(),
        "json".to_string(),
    ];
    let output = kubectl.run(&args, None).await?;
    let list: EventList = serde_json::from_slice(&output)
        .map_err(|e| Error::serialization_for_kind("Event", e.to_string()))?;
    Ok(list
        .items
        .iter()
        .map(|event| {
            format!(
                "{}: {} {}",
                event.type_.as_deref().unwrap_or("Normal"),
                event.reason.as_deref().unwrap_or_default(),
                event.message.as_deref().unwrap_or_default(),
            )
            .trim_end()
            .to_string()
        })
        .collect())
}

/// Collect logs and events for every pod of `cluster`
#[instrument(skip(kubectl))]
pub async fn collect_logs(
    kubectl: &dyn Kubectl,
    cluster: &str,
    source: LogSource,
    tail: u32,
) -> Result<Vec<PodLogs>> {
    let pods: Vec<Pod> = list_as(kubectl, "Pod").await?;
    let mut collected = Vec::new();
    for pod in pods.iter().filter(|p| {
        p.metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(LABEL_INSTANCE))
            .is_some_and(|instance| instance == cluster)
    }) {
        if source == LogSource::FailingOnly && pod_is_healthy(pod) {
            continue;
        }
        let name = pod.metadata.name.clone().unwrap_or_default();
        for container in containers_for(pod, source) {
            let logs = container_logs(kubectl, &name, &container, tail).await;
            collected.push(PodLogs {
                pod: name.clone(),
                container: Some(container),
                logs,
            });
        }
        collected.push(PodLogs {
            logs: pod_events(kubectl, &name).await?,
            pod: name,
            container: None,
        });
    }
    debug!(entries = collected.len(), "Collected cluster logs");
    Ok(collected)
}
