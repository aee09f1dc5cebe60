//! Kubernetes connection service

use std::sync::Arc;

use dbaas_cluster::check_connection;
use tonic::{Request, Response, Status};
use tracing::instrument;

use crate::error::status_from_error;
use crate::factory::KubectlFactory;
use crate::types::{CheckConnectionRequest, CheckConnectionResponse};

/// Connectivity and operator installation checks
#[derive(Clone)]
pub struct KubernetesService {
    factory: Arc<dyn KubectlFactory>,
}

impl KubernetesService {
    /// Create a service building kubectl clients with `factory`
    pub fn new(factory: Arc<dyn KubectlFactory>) -> Self {
        Self { factory }
    }

    /// Check that the cluster answers and report which operators are installed
    #[instrument(skip_all)]
    pub async fn check_cluster_connection(
        &self,
        request: Request<CheckConnectionRequest>,
    ) -> Result<Response<CheckConnectionResponse>, Status> {
        let req = request.into_inner();
        let kubectl = self
            .factory
            .connect(&req.kube_auth.kubeconfig)
            .map_err(status_from_error)?;
        let status = check_connection(kubectl.as_ref())
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(CheckConnectionResponse { status }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::MockKubectlFactory;
    use dbaas_cluster::OperatorStatus;
    use dbaas_common::kubectl::{Kubectl, KubectlError};
    use dbaas_common::testing::FakeKubectl;
    use serde_json::json;
    use tonic::Code;

    fn service(fake: FakeKubectl) -> KubernetesService {
        let fake = Arc::new(fake);
        let mut factory = MockKubectlFactory::new();
        factory
            .expect_connect()
            .times(1)
            .returning(move |_| Ok(fake.clone() as Arc<dyn Kubectl>));
        KubernetesService::new(Arc::new(factory))
    }

    #[tokio::test]
    async fn reports_server_and_operator_versions() {
        let fake = FakeKubectl::new();
        fake.insert(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "percona-server-mongodb-operator"},
            "spec": {
                "selector": {},
                "template": {"spec": {"containers": [{
                    "name": "operator",
                    "image": "percona/percona-server-mongodb-operator:1.12.0"
                }]}}
            }
        }));
        fake.on_run(|_| Ok(br#"{"serverVersion": {"gitVersion": "v1.29.1"}}"#.to_vec()));

        let status = service(fake)
            .check_cluster_connection(Request::new(CheckConnectionRequest::default()))
            .await
            .unwrap()
            .into_inner()
            .status;
        assert_eq!(status.server_version, "v1.29.1");
        assert_eq!(status.xtradb_operator, OperatorStatus::Unavailable);
        assert_eq!(
            status.psmdb_operator,
            OperatorStatus::Ok {
                version: "1.12.0".into()
            }
        );
    }

    #[tokio::test]
    async fn unreachable_cluster_is_internal() {
        let fake = FakeKubectl::new();
        fake.on_run(|args| {
            Err(KubectlError::ExecutionFailed {
                command: args.join(" "),
                stderr: "Unable to connect to the server".into(),
            })
        });
        let status = service(fake)
            .check_cluster_connection(Request::new(CheckConnectionRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Internal);
    }
}
