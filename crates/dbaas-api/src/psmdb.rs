//! PSMDB (replica set) cluster service

use std::sync::Arc;

use dbaas_cluster::{ClusterSummary, PsmdbClusters};
use tonic::{Request, Response, Status};
use tracing::instrument;

use crate::error::status_from_error;
use crate::factory::KubectlFactory;
use crate::types::{
    ClusterRequest, CreatePsmdbClusterRequest, CredentialsResponse, Empty, KubeAuth,
    ListClustersRequest, ListClustersResponse, UpdateClusterRequest,
};

/// Lifecycle of PSMDB clusters
#[derive(Clone)]
pub struct PsmdbService {
    factory: Arc<dyn KubectlFactory>,
}

impl PsmdbService {
    /// Create a service building kubectl clients with `factory`
    pub fn new(factory: Arc<dyn KubectlFactory>) -> Self {
        Self { factory }
    }

    fn clusters(&self, auth: &KubeAuth) -> Result<PsmdbClusters, Status> {
        let kubectl = self
            .factory
            .connect(&auth.kubeconfig)
            .map_err(status_from_error)?;
        Ok(PsmdbClusters::new(kubectl))
    }

    /// List clusters, including ones still deleting
    #[instrument(skip_all)]
    pub async fn list_clusters(
        &self,
        request: Request<ListClustersRequest>,
    ) -> Result<Response<ListClustersResponse>, Status> {
        let req = request.into_inner();
        let clusters = self
            .clusters(&req.kube_auth)?
            .list()
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(ListClustersResponse { clusters }))
    }

    /// Get a single cluster
    #[instrument(skip_all, fields(cluster = %request.get_ref().name))]
    pub async fn get_cluster(
        &self,
        request: Request<ClusterRequest>,
    ) -> Result<Response<ClusterSummary>, Status> {
        let req = request.into_inner();
        let summary = self
            .clusters(&req.kube_auth)?
            .get(&req.name)
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(summary))
    }

    /// Create a cluster
    #[instrument(skip_all, fields(cluster = %request.get_ref().params.name))]
    pub async fn create_cluster(
        &self,
        request: Request<CreatePsmdbClusterRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        self.clusters(&req.kube_auth)?
            .create(&req.params)
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(Empty {}))
    }

    /// Update size, compute resources or pause state
    #[instrument(skip_all, fields(cluster = %request.get_ref().params.name))]
    pub async fn update_cluster(
        &self,
        request: Request<UpdateClusterRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        self.clusters(&req.kube_auth)?
            .update(&req.params)
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(Empty {}))
    }

    /// Delete a cluster
    #[instrument(skip_all, fields(cluster = %request.get_ref().name))]
    pub async fn delete_cluster(
        &self,
        request: Request<ClusterRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        self.clusters(&req.kube_auth)?
            .delete(&req.name)
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(Empty {}))
    }

    /// Rolling-restart a cluster
    #[instrument(skip_all, fields(cluster = %request.get_ref().name))]
    pub async fn restart_cluster(
        &self,
        request: Request<ClusterRequest>,
    ) -> Result<Response<Empty>, Status> {
        let req = request.into_inner();
        self.clusters(&req.kube_auth)?
            .restart(&req.name)
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(Empty {}))
    }

    /// Admin credentials of a ready or initializing cluster
    #[instrument(skip_all, fields(cluster = %request.get_ref().name))]
    pub async fn get_credentials(
        &self,
        request: Request<ClusterRequest>,
    ) -> Result<Response<CredentialsResponse>, Status> {
        let req = request.into_inner();
        let credentials = self
            .clusters(&req.kube_auth)?
            .credentials(&req.name)
            .await
            .map_err(status_from_error)?;
        Ok(Response::new(CredentialsResponse { credentials }))
    }
}
