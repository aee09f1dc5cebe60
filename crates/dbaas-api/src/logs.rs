//! Logs service

use std::sync::Arc;

use dbaas_cluster::{collect_logs, DEFAULT_TAIL_LINES};
use tonic::{Request, Response, Status};
use tracing::instrument;

use crate::error::status_from_error;
use crate::factory::KubectlFactory;
use crate::types::{GetLogsRequest, GetLogsResponse};

/// Container logs and pod events of a cluster
#[derive(Clone)]
pub struct LogsService {
    factory: Arc<dyn KubectlFactory>,
}

impl LogsService {
    /// Create a service building kubectl clients with `factory`
    pub fn new(factory: Arc<dyn KubectlFactory>) -> Self {
        Self { factory }
    }

    /// Logs of every pod of a cluster, or of its failing pods only
    #[instrument(skip_all, fields(cluster = %request.get_ref().cluster_name, source = ?request.get_ref().source))]
    pub async fn get_logs(
        &self,
        request: Request<GetLogsRequest>,
    ) -> Result<Response<GetLogsResponse>, Status> {
        let req = request.into_inner();
        if req.cluster_name.is_empty() {
            return Err(Status::invalid_argument("cluster_name is required"));
        }
        let kubectl = self
            .factory
            .connect(&req.kube_auth.kubeconfig)
            .map_err(status_from_error)?;
        let logs = collect_logs(
            kubectl.as_ref(),
            &req.cluster_name,
            req.source,
            req.tail_lines.unwrap_or(DEFAULT_TAIL_LINES),
        )
        .await
        .map_err(status_from_error)?;
        Ok(Response::new(GetLogsResponse { logs }))
    }
}
