//! mos monitor: one monitor pass for a single cluster.
use anyhow::Result;

use crate::init;

use super::Cli;

pub async fn run(cli: Cli) -> Result<()> {
    let context = init::context();
    let payload = init::payload(&cli)?;
    let blobs = init::blobs(&cli);
    let secrets = init::secrets(&cli)?;
    init::monitor_pass(&context, &blobs, &secrets, &payload).await
}
