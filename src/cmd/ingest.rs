//! mos ingest: pull administrative audit logs for the fleet.
use std::sync::Arc;

use anyhow::Result;

use mos_conf::IngestConf;
use mos_ingest_audit::Ingester;
use mos_stream_alerts::LogStream;

use crate::backends;
use crate::init;

use super::Cli;

pub async fn run(cli: Cli) -> Result<()> {
    let context = init::context();
    let payload = init::payload(&cli)?;
    let conf = IngestConf::resolve(&payload)?;

    let blobs = init::blobs(&cli);
    let secrets = init::secrets(&cli)?;
    let stream = LogStream::from(backends::LoggerLogStream);
    let ingester = Ingester::new(blobs, secrets, stream, Arc::new(init::HttpsClients), conf);
    ingester.run(&context).await
}
