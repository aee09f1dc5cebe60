//! XtraDB cluster commands

use clap::{Args, Subcommand, ValueEnum};
use dbaas_api::{
    ClusterRequest, CreateXtraDbClusterRequest, ListClustersRequest, UpdateClusterRequest,
    XtraDbService,
};
use dbaas_cluster::{PmmParams, ProxyKind, XtraDbClusterParams};
use tonic::{Request, Response};

use super::{component_params, print_json, wait_for_cluster, ComponentArgs, Context, UpdateArgs, WaitArgs};
use crate::Result;

#[derive(Subcommand, Debug)]
pub enum XtraDbCommand {
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
    /// Show root credentials of a ready cluster
    Credentials { name: String },
    /// Wait until a cluster reaches a state
    Wait(WaitArgs),
}

/// Proxy in front of the database nodes
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProxyArg {
    #[default]
    Haproxy,
    Proxysql,
}

impl From<ProxyArg> for ProxyKind {
    fn from(arg: ProxyArg) -> Self {
        match arg {
            ProxyArg::Haproxy => ProxyKind::HaProxy,
            ProxyArg::Proxysql => ProxyKind::ProxySql,
        }
    }
}

/// PMM monitoring options
#[derive(Args, Debug, Clone, Default)]
pub struct PmmArgs {
    /// PMM server address; monitoring stays off when unset
    #[arg(long)]
    pub pmm_address: Option<String>,

    /// PMM server user
    #[arg(long, default_value = "admin")]
    pub pmm_login: String,

    /// PMM server password
    #[arg(long, env = "DBAAS_PMM_PASSWORD", hide_env_values = true, default_value = "")]
    pub pmm_password: String,
}

impl PmmArgs {
    /// Monitoring parameters, if an address was given
    pub fn to_params(&self) -> Option<PmmParams> {
        self.pmm_address.as_ref().map(|address| PmmParams {
            public_address: address.clone(),
            login: self.pmm_login.clone(),
            password: self.pmm_password.clone(),
        })
    }
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Cluster name
    pub name: String,

    /// Number of database nodes (and proxies)
    #[arg(long, default_value_t = 3)]
    pub size: u32,

    #[command(flatten)]
    pub pxc: ComponentArgs,

    /// Proxy to deploy
    #[arg(long, value_enum, default_value_t = ProxyArg::Haproxy)]
    pub proxy: ProxyArg,

    /// CPU limit of the proxies
    #[arg(long)]
    pub proxy_cpu: Option<String>,

    /// Memory limit of the proxies
    #[arg(long)]
    pub proxy_memory: Option<String>,

    /// Volume size of the proxies (ProxySQL only)
    #[arg(long)]
    pub proxy_disk: Option<String>,

    /// Expose the proxy outside the Kubernetes cluster
    #[arg(long)]
    pub expose: bool,

    #[command(flatten)]
    pub pmm: PmmArgs,
}

impl CreateArgs {
    /// Convert into create parameters
    pub fn to_params(&self) -> Result<XtraDbClusterParams> {
        Ok(XtraDbClusterParams {
            name: self.name.clone(),
            size: self.size,
            pxc: component_params(
                self.pxc.cpu.as_deref(),
                self.pxc.memory.as_deref(),
                self.pxc.disk.as_deref(),
            )?,
            proxy: component_params(
                self.proxy_cpu.as_deref(),
                self.proxy_memory.as_deref(),
                self.proxy_disk.as_deref(),
            )?,
            proxy_kind: self.proxy.into(),
            expose: self.expose,
            pmm: self.pmm.to_params(),
        })
    }
}

/// Run an XtraDB command
pub async fn run(ctx: &Context, cmd: XtraDbCommand) -> Result<()> {
    let svc = XtraDbService::new(ctx.factory.clone());
    let named = |name: String| {
        Request::new(ClusterRequest {
            kube_auth: ctx.kube_auth.clone(),
            name,
        })
    };
    match cmd {
        XtraDbCommand::List => {
            let response = svc
                .list_clusters(Request::new(ListClustersRequest {
                    kube_auth: ctx.kube_auth.clone(),
                }))
                .await?;
            print_json(&response.into_inner().clusters)
        }
        XtraDbCommand::Get { name } => print_json(&svc.get_cluster(named(name)).await?.into_inner()),
        XtraDbCommand::Create(args) => {
            let params = args.to_params()?;
            svc.create_cluster(Request::new(CreateXtraDbClusterRequest {
                kube_auth: ctx.kube_auth.clone(),
                params,
            }))
            .await?;
            Ok(())
        }
        XtraDbCommand::Update(args) => {
            let params = args.to_params()?;
            svc.update_cluster(Request::new(UpdateClusterRequest {
                kube_auth: ctx.kube_auth.clone(),
                params,
            }))
            .await?;
            Ok(())
        }
        XtraDbCommand::Delete { name } => {
            svc.delete_cluster(named(name)).await?;
            Ok(())
        }
        XtraDbCommand::Restart { name } => {
            svc.restart_cluster(named(name)).await?;
            Ok(())
        }
        XtraDbCommand::Credentials { name } => {
            print_json(&svc.get_credentials(named(name)).await?.into_inner().credentials)
        }
        XtraDbCommand::Wait(args) => {
            wait_for_cluster(&args, || {
                let svc = svc.clone();
                let request = named(args.name.clone());
                async move { svc.get_cluster(request).await.map(Response::into_inner) }
            })
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        cmd: XtraDbCommand,
    }

    fn parse(args: &[&str]) -> XtraDbCommand {
        Harness::try_parse_from(std::iter::once("xtradb").chain(args.iter().copied()))
            .unwrap()
            .cmd
    }

    #[test]
    fn create_defaults_to_haproxy() {
        let XtraDbCommand::Create(args) = parse(&["create", "c1", "--disk", "10Gi"]) else {
            panic!("expected create");
        };
        let params = args.to_params().unwrap();
        assert_eq!(params.size, 3);
        assert_eq!(params.proxy_kind, ProxyKind::HaProxy);
        assert_eq!(params.pxc.disk_size, Some(10 * 1024 * 1024 * 1024));
        assert!(params.pmm.is_none());
    }

    #[test]
    fn proxysql_with_monitoring() {
        let XtraDbCommand::Create(args) = parse(&[
            "create",
            "c1",
            "--size",
            "1",
            "--cpu",
            "200m",
            "--memory",
            "1Gi",
            "--disk",
            "1Gi",
            "--proxy",
            "proxysql",
            "--proxy-disk",
            "1Gi",
            "--pmm-address",
            "pmm.example.com",
            "--pmm-password",
            "secret",
        ]) else {
            panic!("expected create");
        };
        let params = args.to_params().unwrap();
        assert_eq!(params.proxy_kind, ProxyKind::ProxySql);
        assert_eq!(params.pxc.compute_resources.unwrap().cpu_millis, 200);
        let pmm = params.pmm.unwrap();
        assert_eq!(pmm.public_address, "pmm.example.com");
        assert_eq!(pmm.login, "admin");
    }

    #[test]
    fn suspend_and_resume_conflict_at_parse_time() {
        let result = Harness::try_parse_from(["xtradb", "update", "c1", "--suspend", "--resume"]);
        assert!(result.is_err());
    }
}
