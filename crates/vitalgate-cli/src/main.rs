//! `vitalgate` command line entry point.

mod cli;
mod commands;
mod settings;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vitalgate_protocol::ChecksumPolicy;

use crate::cli::{Cli, Command, checksum_policy};
use crate::settings::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config = GatewayConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Run { no_sync } => {
            let sync_enabled = config.sync.enabled && !no_sync;
            commands::run::execute(config, sync_enabled).await
        }
        Command::Discover => commands::discover::execute(&config.devices).await,
        Command::Queue { status, limit } => {
            commands::queue::show(&config.database, status.map(Into::into), limit).await
        }
        Command::Requeue { measurement_id } => {
            commands::queue::requeue(&config.database, &measurement_id).await
        }
        Command::Decode {
            device_type,
            verify_checksum,
            file,
        } => {
            let verify = verify_checksum || config.manager.checksum == ChecksumPolicy::Verify;
            commands::decode::execute(&file, device_type.into(), checksum_policy(verify))
        }
    }
}

/// Logs go to stderr so command output on stdout stays machine readable.
fn init_tracing(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
