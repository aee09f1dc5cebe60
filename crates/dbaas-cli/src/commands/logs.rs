//! Logs command

use clap::Args;
use dbaas_api::{GetLogsRequest, LogsService};
use dbaas_cluster::LogSource;
use tonic::Request;

use super::{print_json, Context};
use crate::Result;

#[derive(Args, Debug, Clone)]
pub struct LogsArgs {
    /// Cluster name
    pub cluster: String,

    /// Only pods and containers that are not ready
    #[arg(long)]
    pub failing_only: bool,

    /// Lines per container
    #[arg(long)]
    pub tail: Option<u32>,
}

impl LogsArgs {
    fn source(&self) -> LogSource {
        if self.failing_only {
            LogSource::FailingOnly
        } else {
            LogSource::AllLogs
        }
    }
}

/// Print container logs and pod events of a cluster
pub async fn run(ctx: &Context, args: LogsArgs) -> Result<()> {
    let response = LogsService::new(ctx.factory.clone())
        .get_logs(Request::new(GetLogsRequest {
            kube_auth: ctx.kube_auth.clone(),
            source: args.source(),
            cluster_name: args.cluster,
            tail_lines: args.tail,
        }))
        .await?;
    print_json(&response.into_inner().logs)
}
