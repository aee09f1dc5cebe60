//! DBaaS CLI
//!
//! Manages XtraDB and PSMDB clusters through kubectl and prints JSON.

use clap::Parser;

use dbaas_cli::{Cli, Result};
use dbaas_common::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_telemetry(TelemetryConfig {
        format: cli.global.log_format.parse()?,
        ..Default::default()
    })?;
    cli.run().await
}
