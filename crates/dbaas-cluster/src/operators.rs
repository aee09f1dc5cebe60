//! Connectivity check and operator installation status

use dbaas_common::kubectl::{get_as, Kubectl};
use dbaas_common::{Error, Result};
use k8s_openapi::api::apps::v1::Deployment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::{psmdb, xtradb};

/// Installation status of one operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperatorStatus {
    /// Deployment found, running `version`
    Ok { version: String },
    /// No deployment, or one without a tagged image
    Unavailable,
}

/// Result of a connection check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// `gitVersion` reported by the API server
    pub server_version: String,
    pub xtradb_operator: OperatorStatus,
    pub psmdb_operator: OperatorStatus,
}

/// Tag of an image reference, ignoring registry ports and digests
fn image_tag(image: &str) -> Option<&str> {
    let image = image.split('@').next().unwrap_or(image);
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    last_segment
        .split_once(':')
        .map(|(_, tag)| tag)
        .filter(|tag| !tag.is_empty())
}

/// Status of the operator running as Deployment `name`
pub async fn operator_status(kubectl: &dyn Kubectl, name: &str) -> Result<OperatorStatus> {
    let deployment: Deployment = match get_as(kubectl, "Deployment", name).await {
        Ok(d) => d,
        Err(e) if e.is_not_found() => {
            debug!(deployment = name, "Operator not installed");
            return Ok(OperatorStatus::Unavailable);
        }
        Err(e) => return Err(e.into()),
    };
    let version = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|s| s.containers.first())
        .and_then(|c| c.image.as_deref())
        .and_then(image_tag);
    Ok(match version {
        Some(version) => OperatorStatus::Ok {
            version: version.to_string(),
        },
        None => OperatorStatus::Unavailable,
    })
}

/// Check that the API server answers and report both operators
#[instrument(skip(kubectl))]
pub async fn check_connection(kubectl: &dyn Kubectl) -> Result<ConnectionStatus> {
    let args = ["version".to_string(), "-o".to_string(), "json".to_string()];
    let output = kubectl.run(&args, None).await?;
    let version: Value = serde_json::from_slice(&output)
        .map_err(|e| Error::serialization(format!("kubectl version output: {e}")))?;
    let server_version = version
        .pointer("/serverVersion/gitVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::internal_with_context("connection", "API server did not report its version")
        })?
        .to_string();

    let status = ConnectionStatus {
        server_version,
        xtradb_operator: operator_status(kubectl, xtradb::OPERATOR_DEPLOYMENT).await?,
        psmdb_operator: operator_status(kubectl, psmdb::OPERATOR_DEPLOYMENT).await?,
    };
    info!(
        server_version = %status.server_version,
        xtradb = ?status.xtradb_operator,
        psmdb = ?status.psmdb_operator,
        "Cluster connection checked"
    );
    Ok(status)
}
