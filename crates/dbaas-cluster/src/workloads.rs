//! Operations both translators perform the same way

use dbaas_common::kubectl::{delete_as, Kubectl, ObjectRef};
use dbaas_common::{Error, Result};
use tracing::{debug, info};

/// Fail with AlreadyExists when a `kind` object named `name` exists.
///
/// Not-found is the success case here; any other failure is propagated so
/// a flaky API server is never mistaken for "no duplicate".
pub async fn ensure_absent(kubectl: &dyn Kubectl, kind: &str, name: &str) -> Result<()> {
    match kubectl.get(kind, name).await {
        Ok(_) => Err(Error::already_exists(name)),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Delete a custom resource by apiVersion, kind and name
pub async fn delete_resource(
    kubectl: &dyn Kubectl,
    api_version: &str,
    kind: &str,
    name: &str,
) -> Result<()> {
    delete_as(kubectl, &ObjectRef::new(api_version, kind, name)).await?;
    info!(cluster = name, kind, "Deleted cluster resource");
    Ok(())
}

/// Trigger a rolling restart of `statefulsets` without waiting for it
pub async fn rollout_restart(kubectl: &dyn Kubectl, statefulsets: &[String]) -> Result<()> {
    if statefulsets.is_empty() {
        return Ok(());
    }
    let mut args = vec![
        "rollout".to_string(),
        "restart".to_string(),
        "statefulset".to_string(),
    ];
    args.extend(statefulsets.iter().cloned());
    kubectl.run(&args, None).await?;
    debug!(statefulsets = ?statefulsets, "Triggered rolling restart");
    Ok(())
}
