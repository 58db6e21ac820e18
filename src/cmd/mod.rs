//! Built-in `mos` commands.
use clap::Parser;
use clap::Subcommand;

pub mod controller;
pub mod ingest;
pub mod monitor;

/// Monitor ONTAP Services: polling monitor and audit-log ingestion for
/// fleets of managed ONTAP NAS clusters.
#[derive(Debug, Parser)]
#[command(version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory backing the local blob store.
    #[arg(long = "data-dir", default_value_t = String::from("./data"))]
    pub data_dir: String,

    /// Path to a JSON file mapping secret references to credential objects.
    #[arg(long = "secrets")]
    pub secrets: Option<String>,

    /// Path to a JSON event payload; the process environment is used when
    /// this is not given.
    #[arg(long = "payload")]
    pub payload: Option<String>,

    /// Select the mos command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Select the mos command to run.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Dispatch monitor tasks over the configured fleet.
    #[command(alias = "dispatch")]
    Controller,

    /// Run one monitor pass for a single cluster.
    Monitor,

    /// Ingest administrative audit logs for the fleet.
    Ingest,
}
