//! Combine the engine crates to initialise and run a Monitor ONTAP
//! Services process.
use anyhow::Result;
use clap::Parser;

pub mod backends;
mod cmd;
mod init;
mod logging;

pub use self::cmd::Cli;
pub use self::cmd::Command;

/// Initialise the mos process and invoke a command implementation.
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Controller => cmd::controller::run(cli).await,
        Command::Monitor => cmd::monitor::run(cli).await,
        Command::Ingest => cmd::ingest::run(cli).await,
    }
}

/// Initialise the async runtime for the process and invoke [`execute`].
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed tokio runtime initialisation")
        .block_on(execute(cli))
}
