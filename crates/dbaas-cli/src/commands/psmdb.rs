//! PSMDB cluster commands

use clap::{Args, Subcommand};
use dbaas_api::{
    ClusterRequest, CreatePsmdbClusterRequest, ListClustersRequest, PsmdbService,
    UpdateClusterRequest,
};
use dbaas_cluster::ReplicaSetClusterParams;
use tonic::{Request, Response};

use super::xtradb::PmmArgs;
use super::{component_params, print_json, wait_for_cluster, ComponentArgs, Context, UpdateArgs, WaitArgs};
use crate::Result;

#[derive(Subcommand, Debug)]
pub enum PsmdbCommand {
    /// List clusters, including ones still deleting
    List,
    /// Show one cluster
    Get { name: String },
    /// Create a cluster
    Create(CreateArgs),
    /// Change size, compute resources or pause state
    Update(UpdateArgs),
    /// Delete a cluster
    Delete { name: String },
    /// Rolling-restart a cluster
    Restart { name: String },
    /// Show admin credentials of a ready or initializing cluster
    Credentials { name: String },
    /// Wait until a cluster reaches a state
    Wait(WaitArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Cluster name
    pub name: String,

    /// Number of replica-set members
    #[arg(long, default_value_t = 3)]
    pub size: u32,

    #[command(flatten)]
    pub replicaset: ComponentArgs,

    /// Shard the cluster behind mongos routers
    #[arg(long)]
    pub sharding: bool,

    /// CPU limit of the mongos routers
    #[arg(long, requires = "sharding")]
    pub mongos_cpu: Option<String>,

    /// Memory limit of the mongos routers
    #[arg(long, requires = "sharding")]
    pub mongos_memory: Option<String>,

    /// Expose the cluster outside the Kubernetes cluster
    #[arg(long)]
    pub expose: bool,

    #[command(flatten)]
    pub pmm: PmmArgs,
}

impl CreateArgs {
    /// Convert into create parameters
    pub fn to_params(&self) -> Result<ReplicaSetClusterParams> {
        Ok(ReplicaSetClusterParams {
            name: self.name.clone(),
            size: self.size,
            replicaset: component_params(
                self.replicaset.cpu.as_deref(),
                self.replicaset.memory.as_deref(),
                self.replicaset.disk.as_deref(),
            )?,
            sharding: self.sharding,
            mongos: component_params(
                self.mongos_cpu.as_deref(),
                self.mongos_memory.as_deref(),
                None,
            )?,
            expose: self.expose,
            pmm: self.pmm.to_params(),
        })
    }
}

/// Run a PSMDB command
pub async fn run(ctx: &Context, cmd: PsmdbCommand) -> Result<()> {
    let svc = PsmdbService::new(ctx.factory.clone());
    let named = |name: String| {
        Request::new(ClusterRequest {
            kube_auth: ctx.kube_auth.clone(),
            name,
        })
    };
    match cmd {
        PsmdbCommand::List => {
            let response = svc
                .list_clusters(Request::new(ListClustersRequest {
                    kube_auth: ctx.kube_auth.clone(),
                }))
                .await?;
            print_json(&response.into_inner().clusters)
        }
        PsmdbCommand::Get { name } => print_json(&svc.get_cluster(named(name)).await?.into_inner()),
        PsmdbCommand::Create(args) => {
            let params = args.to_params()?;
            svc.create_cluster(Request::new(CreatePsmdbClusterRequest {
                kube_auth: ctx.kube_auth.clone(),
                params,
            }))
            .await?;
            Ok(())
        }
        PsmdbCommand::Update(args) => {
            let params = args.to_params()?;
            svc.update_cluster(Request::new(UpdateClusterRequest {
                kube_auth: ctx.kube_auth.clone(),
                params,
            }))
            .await?;
            Ok(())
        }
        PsmdbCommand::Delete { name } => {
            svc.delete_cluster(named(name)).await?;
            Ok(())
        }
        PsmdbCommand::Restart { name } => {
            svc.restart_cluster(named(name)).await?;
            Ok(())
        }
        PsmdbCommand::Credentials { name } => {
            print_json(&svc.get_credentials(named(name)).await?.into_inner().credentials)
        }
        PsmdbCommand::Wait(args) => {
            wait_for_cluster(&args, || {
                let svc = svc.clone();
                let request = named(args.name.clone());
                async move { svc.get_cluster(request).await.map(Response::into_inner) }
            })
            .await
        }
    }
}
