//! CLI commands

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use dbaas_api::{
    CheckConnectionRequest, CliKubectlFactory, KubeAuth, KubectlFactory, KubernetesService,
};
use dbaas_cluster::{ClusterState, ClusterSummary, ComponentParams, ComputeResources, UpdateParams};
use dbaas_common::kubectl::KubectlConfig;
use dbaas_common::units::{bytes_from_str, milli_cpu_from_str};
use serde::Serialize;
use tonic::{Code, Request, Status};
use tracing::debug;

use crate::{Error, GlobalArgs, Result};

pub mod logs;
pub mod psmdb;
pub mod xtradb;

/// Everything a command needs to reach the target cluster
pub struct Context {
    pub kube_auth: KubeAuth,
    pub factory: Arc<dyn KubectlFactory>,
}

impl Context {
    /// Read the kubeconfig and build the kubectl factory
    pub async fn from_args(args: &GlobalArgs) -> Result<Self> {
        let path = kubeconfig_path(args.kubeconfig.as_deref())?;
        let kubeconfig = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| Error::Kubeconfig { path, source })?;
        let config = KubectlConfig {
            program: args.kubectl.clone(),
            timeout: Duration::from_secs(args.kubectl_timeout_secs),
            namespace: args.namespace.clone(),
            ..Default::default()
        };
        Ok(Self {
            kube_auth: KubeAuth { kubeconfig },
            factory: Arc::new(CliKubectlFactory::new(config)),
        })
    }
}

/// First entry of a KUBECONFIG-style list, falling back to ~/.kube/config
fn kubeconfig_path(kubeconfig: Option<&str>) -> Result<PathBuf> {
    if let Some(first) = kubeconfig
        .and_then(|list| std::env::split_paths(list).next())
        .filter(|p| !p.as_os_str().is_empty())
    {
        return Ok(first);
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".kube").join("config"))
        .ok_or_else(|| Error::validation("no --kubeconfig given and HOME is not set"))
}

/// Print a response as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Check connectivity and print server and operator versions
pub async fn check_connection(ctx: &Context) -> Result<()> {
    let response = KubernetesService::new(ctx.factory.clone())
        .check_cluster_connection(Request::new(CheckConnectionRequest {
            kube_auth: ctx.kube_auth.clone(),
        }))
        .await?;
    print_json(&response.into_inner().status)
}

/// Compute and disk options of one component
#[derive(Args, Debug, Clone, Default)]
pub struct ComponentArgs {
    /// CPU limit (e.g. 500m, 1)
    #[arg(long)]
    pub cpu: Option<String>,

    /// Memory limit (e.g. 1Gi, 512M)
    #[arg(long)]
    pub memory: Option<String>,

    /// Volume size (e.g. 10Gi)
    #[arg(long)]
    pub disk: Option<String>,
}

/// Parse a cpu/memory pair; both or neither must be given
pub fn compute_resources(
    cpu: Option<&str>,
    memory: Option<&str>,
) -> Result<Option<ComputeResources>> {
    match (cpu, memory) {
        (None, None) => Ok(None),
        (Some(cpu), Some(memory)) => Ok(Some(ComputeResources {
            cpu_millis: milli_cpu_from_str(cpu)?,
            memory_bytes: bytes_from_str(memory)?,
        })),
        _ => Err(Error::validation("cpu and memory must be given together")),
    }
}

/// Build component parameters from command-line quantities
pub fn component_params(
    cpu: Option<&str>,
    memory: Option<&str>,
    disk: Option<&str>,
) -> Result<ComponentParams> {
    Ok(ComponentParams {
        compute_resources: compute_resources(cpu, memory)?,
        disk_size: disk.map(bytes_from_str).transpose()?,
    })
}

/// Options of an update, shared by both cluster kinds
#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Cluster name
    pub name: String,

    /// New cluster size
    #[arg(long)]
    pub size: Option<u32>,

    /// New CPU limit of the database nodes
    #[arg(long, requires = "memory")]
    pub cpu: Option<String>,

    /// New memory limit of the database nodes
    #[arg(long, requires = "cpu")]
    pub memory: Option<String>,

    /// New CPU limit of the proxies / mongos routers
    #[arg(long, requires = "proxy_memory")]
    pub proxy_cpu: Option<String>,

    /// New memory limit of the proxies / mongos routers
    #[arg(long, requires = "proxy_cpu")]
    pub proxy_memory: Option<String>,

    /// Pause the cluster
    #[arg(long, conflicts_with = "resume")]
    pub suspend: bool,

    /// Resume a paused cluster
    #[arg(long)]
    pub resume: bool,
}

impl UpdateArgs {
    /// Convert into update parameters
    pub fn to_params(&self) -> Result<UpdateParams> {
        Ok(UpdateParams {
            name: self.name.clone(),
            size: self.size,
            primary: compute_resources(self.cpu.as_deref(), self.memory.as_deref())?,
            proxy: compute_resources(self.proxy_cpu.as_deref(), self.proxy_memory.as_deref())?,
            suspend: self.suspend,
            resume: self.resume,
        })
    }
}

/// State to wait for
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitFor {
    /// Ready to serve, no change in progress
    Ready,
    /// Paused
    Paused,
    /// Deleted, with no pods left
    Gone,
}

/// Options of the wait command
#[derive(Args, Debug, Clone)]
pub struct WaitArgs {
    /// Cluster name
    pub name: String,

    /// State to wait for
    #[arg(long = "for", value_enum, default_value_t = WaitFor::Ready)]
    pub target: WaitFor,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 900)]
    pub timeout_secs: u64,

    /// Seconds between polls
    #[arg(long, default_value_t = 5)]
    pub interval_secs: u64,
}

/// Result type for polling check functions.
///
/// - `Ok(Some(value))` - Condition met, return the value
/// - `Ok(None)` - Condition not met yet, keep polling
/// - `Err(e)` - Fatal error, stop polling immediately
pub type PollResult<T> = std::result::Result<Option<T>, String>;

/// Poll `check_fn` every `interval` until it yields a value, fails, or
/// `timeout` elapses
pub async fn wait_with_timeout<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    description: &str,
    mut check_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    let start = Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(Error::command_failed(format!(
                "timeout waiting for {description}"
            )));
        }

        match check_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                debug!("Waiting for {}...", description);
                tokio::time::sleep(interval).await;
            }
            Err(e) => {
                return Err(Error::command_failed(format!(
                    "error waiting for {description}: {e}"
                )));
            }
        }
    }
}

/// Whether a polled cluster has reached `target`
fn reached(target: WaitFor, polled: std::result::Result<ClusterSummary, Status>) -> PollResult<()> {
    match (target, polled) {
        (WaitFor::Gone, Err(status)) if status.code() == Code::NotFound => Ok(Some(())),
        (_, Err(status)) => Err(status.message().to_string()),
        (WaitFor::Gone, Ok(_)) => Ok(None),
        (WaitFor::Ready, Ok(summary)) => Ok((summary.state == ClusterState::Ready).then_some(())),
        (WaitFor::Paused, Ok(summary)) => Ok((summary.state == ClusterState::Paused).then_some(())),
    }
}

/// Poll a cluster through `get` until it reaches the requested state
pub async fn wait_for_cluster<F, Fut>(args: &WaitArgs, mut get: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<ClusterSummary, Status>>,
{
    let description = format!("cluster {} to be {:?}", args.name, args.target);
    let target = args.target;
    wait_with_timeout(
        Duration::from_secs(args.timeout_secs),
        Duration::from_secs(args.interval_secs),
        &description,
        || {
            let polled = get();
            async move { reached(target, polled.await) }
        },
    )
    .await
}
