//! Cluster lifecycle against an in-memory kubectl that plays the operator

use std::sync::Arc;

use dbaas_cluster::{
    ClusterState, ClusterSummary, ComponentParams, ComputeResources, Error, UpdateParams,
    XtraDbClusterParams, XtraDbClusters,
};
use dbaas_cluster::xtradb::{KIND, OPERATOR_DEPLOYMENT};
use dbaas_common::testing::FakeKubectl;
use dbaas_common::{LABEL_INSTANCE, LABEL_MANAGED_BY};
use serde_json::json;

const GIB: u64 = 1024 * 1024 * 1024;

fn cluster_with_operator_templates() -> Arc<FakeKubectl> {
    let fake = FakeKubectl::new();
    fake.insert(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {"name": "my-cluster-secrets"},
        "data": {"root": "cm9vdA==", "operator": "b3A="}
    }));
    Arc::new(fake)
}

/// The operator notices a spec change: members are (re)starting
fn operator_starts_rollout(fake: &FakeKubectl, name: &str) {
    assert!(fake.update(KIND, name, |cr| {
        let size = cr["spec"]["pxc"]["size"].clone();
        let ready = cr["status"]["pxc"]["ready"].as_i64().unwrap_or(0);
        cr["status"] = json!({
            "state": "initializing",
            "pxc": {"size": size, "ready": ready},
            "haproxy": {"size": size, "ready": 0}
        });
    }));
}

/// The operator finishes: every member is ready
fn operator_converges(fake: &FakeKubectl, name: &str) {
    assert!(fake.update(KIND, name, |cr| {
        let size = cr["spec"]["pxc"]["size"].clone();
        cr["status"] = json!({
            "state": "ready",
            "host": format!("{name}-haproxy.default"),
            "pxc": {"size": size, "ready": size},
            "haproxy": {"size": size, "ready": size}
        });
    }));
}

fn find<'a>(clusters: &'a [ClusterSummary], name: &str) -> Option<&'a ClusterSummary> {
    clusters.iter().find(|c| c.name == name)
}

fn lingering_pod(cluster: &str, ordinal: u32) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": format!("{cluster}-pxc-{ordinal}"),
            "labels": {
                LABEL_INSTANCE: cluster,
                LABEL_MANAGED_BY: OPERATOR_DEPLOYMENT
            }
        }
    })
}

/// Story: create, grow, get rejected while changing, converge, delete
#[tokio::test]
async fn story_xtradb_cluster_lifecycle() {
    let fake = cluster_with_operator_templates();
    let clusters = XtraDbClusters::new(fake.clone());

    clusters
        .create(&XtraDbClusterParams {
            name: "c1".into(),
            size: 1,
            pxc: ComponentParams {
                compute_resources: Some(ComputeResources {
                    cpu_millis: 200,
                    memory_bytes: GIB,
                }),
                disk_size: Some(GIB),
            },
            proxy: ComponentParams::default(),
            proxy_kind: Default::default(),
            expose: false,
            pmm: None,
        })
        .await
        .unwrap();

    // Freshly created, not yet observed by the operator
    let listed = clusters.list().await.unwrap();
    let c1 = find(&listed, "c1").expect("c1 listed");
    assert_eq!(c1.state, ClusterState::Changing);
    assert_eq!(
        c1.primary.compute_resources,
        Some(ComputeResources {
            cpu_millis: 200,
            memory_bytes: GIB
        })
    );

    operator_starts_rollout(&fake, "c1");
    assert_eq!(clusters.get("c1").await.unwrap().state, ClusterState::Changing);
    operator_converges(&fake, "c1");
    assert_eq!(clusters.get("c1").await.unwrap().state, ClusterState::Ready);

    let grow = UpdateParams {
        name: "c1".into(),
        size: Some(3),
        ..Default::default()
    };
    clusters.update(&grow).await.unwrap();
    operator_starts_rollout(&fake, "c1");
    let listed = clusters.list().await.unwrap();
    assert_eq!(find(&listed, "c1").unwrap().state, ClusterState::Changing);

    let before = fake.object(KIND, "c1");
    let err = clusters
        .update(&UpdateParams {
            name: "c1".into(),
            size: Some(5),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotReady { .. }));
    assert_eq!(fake.object(KIND, "c1"), before, "rejected update must not touch the CR");

    operator_converges(&fake, "c1");
    let listed = clusters.list().await.unwrap();
    let c1 = find(&listed, "c1").unwrap();
    assert_eq!((c1.size, c1.state), (3, ClusterState::Ready));
    assert_eq!(c1.operation.finished_steps, c1.operation.total_steps);

    let creds = clusters.credentials("c1").await.unwrap();
    assert_eq!(creds.username, "root");
    assert_eq!(creds.host, "c1-haproxy.default");

    // Deletion: the CR goes away first, the pods linger for a while
    fake.insert(lingering_pod("c1", 0));
    fake.insert(lingering_pod("c1", 1));
    clusters.delete("c1").await.unwrap();
    assert!(fake.object("Secret", "dbaas-c1-pxc-secrets").is_none());

    let listed = clusters.list().await.unwrap();
    assert_eq!(listed.len(), 1, "one entry however many pods linger");
    assert_eq!(listed[0].state, ClusterState::Deleting);

    fake.remove("Pod", "c1-pxc-0");
    fake.remove("Pod", "c1-pxc-1");
    assert!(find(&clusters.list().await.unwrap(), "c1").is_none());
    assert!(clusters.get("c1").await.unwrap_err().is_not_found());
}

/// Story: a duplicate create leaves the existing cluster alone
#[tokio::test]
async fn story_duplicate_create_is_rejected_without_apply() {
    let fake = cluster_with_operator_templates();
    let clusters = XtraDbClusters::new(fake.clone());
    let params = XtraDbClusterParams {
        name: "dup".into(),
        size: 3,
        pxc: ComponentParams {
            compute_resources: None,
            disk_size: Some(GIB),
        },
        proxy: ComponentParams::default(),
        proxy_kind: Default::default(),
        expose: false,
        pmm: None,
    };
    clusters.create(&params).await.unwrap();
    let applies = |fake: &FakeKubectl| {
        fake.calls()
            .iter()
            .filter(|c| c.starts_with("apply"))
            .count()
    };
    let before = applies(&fake);

    let err = clusters.create(&params).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));
    assert_eq!(applies(&fake), before);
}

/// Story: suspend and resume together never reach the cluster
#[tokio::test]
async fn story_suspend_and_resume_together_are_invalid() {
    let fake = cluster_with_operator_templates();
    let clusters = XtraDbClusters::new(fake.clone());

    let err = clusters
        .update(&UpdateParams {
            name: "c1".into(),
            suspend: true,
            resume: true,
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(fake.calls().is_empty());
}
