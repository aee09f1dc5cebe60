//! DBaaS CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// dbaas - XtraDB and PSMDB clusters on Kubernetes
#[derive(Parser, Debug)]
#[command(name = "dbaas")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Kubeconfig of the target cluster (first entry of KUBECONFIG, else ~/.kube/config)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// kubectl executable
    #[arg(long, env = "DBAAS_KUBECTL", default_value = "kubectl", global = true)]
    pub kubectl: PathBuf,

    /// Timeout of a single kubectl invocation, in seconds
    #[arg(
        long,
        env = "DBAAS_KUBECTL_TIMEOUT_SECS",
        default_value_t = 30,
        global = true
    )]
    pub kubectl_timeout_secs: u64,

    /// Namespace of the clusters; kubectl's default when unset
    #[arg(short, long, env = "DBAAS_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Log format: text or json
    #[arg(long, env = "DBAAS_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage XtraDB (Galera) clusters
    #[command(subcommand)]
    Xtradb(commands::xtradb::XtraDbCommand),

    /// Manage PSMDB (MongoDB replica set) clusters
    #[command(subcommand)]
    Psmdb(commands::psmdb::PsmdbCommand),

    /// Check connectivity and which operators are installed
    CheckConnection,

    /// Show container logs and pod events of a cluster
    Logs(commands::logs::LogsArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let ctx = commands::Context::from_args(&self.global).await?;
        match self.command {
            Commands::Xtradb(cmd) => commands::xtradb::run(&ctx, cmd).await,
            Commands::Psmdb(cmd) => commands::psmdb::run(&ctx, cmd).await,
            Commands::CheckConnection => commands::check_connection(&ctx).await,
            Commands::Logs(args) => commands::logs::run(&ctx, args).await,
        }
    }
}
