use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use vitalgate_core::{DeviceType, SyncStatus};
use vitalgate_protocol::ChecksumPolicy;

#[derive(Debug, Parser)]
#[command(name = "vitalgate", version)]
#[command(about = "Gateway between body-composition analyzers and the measurement API")]
pub struct Cli {
    /// TOML configuration file. Every key can also be set through
    /// VITALGATE__SECTION__KEY environment variables.
    #[arg(long, short, global = true, env = "VITALGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `vitalgate_hardware=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to every analyzer and sync measurements until Ctrl-C
    Run {
        /// Keep measurements local; do not start the sync worker
        #[arg(long)]
        no_sync: bool,
    },
    /// List the endpoints discovery would connect to
    Discover,
    /// Show sync job counts and recent jobs
    Queue {
        /// Only list jobs in this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Maximum number of jobs to list
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Put a permanently failed sync job back in the queue
    Requeue {
        /// Measurement id of the failed job
        measurement_id: String,
    },
    /// Decode a captured packet file and print the measurements as JSON
    Decode {
        #[arg(long, value_enum)]
        device_type: DeviceTypeArg,
        /// Reject Tanita packets whose checksum does not match
        #[arg(long)]
        verify_checksum: bool,
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceTypeArg {
    TanitaCsv,
    InbodyHl7,
}

impl From<DeviceTypeArg> for DeviceType {
    fn from(arg: DeviceTypeArg) -> Self {
        match arg {
            DeviceTypeArg::TanitaCsv => DeviceType::TanitaCsv,
            DeviceTypeArg::InbodyHl7 => DeviceType::InbodyHl7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Pending,
    InFlight,
    Delivered,
    PermanentlyFailed,
}

impl From<StatusArg> for SyncStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => SyncStatus::Pending,
            StatusArg::InFlight => SyncStatus::InFlight,
            StatusArg::Delivered => SyncStatus::Delivered,
            StatusArg::PermanentlyFailed => SyncStatus::PermanentlyFailed,
        }
    }
}

pub fn checksum_policy(verify: bool) -> ChecksumPolicy {
    if verify {
        ChecksumPolicy::Verify
    } else {
        ChecksumPolicy::Ignore
    }
}
