//! mos controller: dispatch monitor tasks over the fleet.
use std::sync::Arc;

use anyhow::Result;
use slog::error;

use mos_cluster_dispatch::Dispatcher;
use mos_conf::ControllerConf;
use mos_stream_alerts::PubSub;

use crate::backends;
use crate::init;

use super::Cli;

pub async fn run(cli: Cli) -> Result<()> {
    let context = init::context();
    let pubsub = PubSub::from(backends::LoggerPubSub);

    let conf = init::payload(&cli).and_then(|payload| ControllerConf::resolve(&payload));
    let conf = match conf {
        Ok(conf) => conf,
        // Missing dispatcher configuration is fatal: send up a flare so the
        // silence does not go unnoticed, then terminate.
        Err(error) => {
            let message = format!(
                "Error, the Monitor ONTAP Services controller is misconfigured: {:#}",
                error,
            );
            error!(context.logger, "{}", message);
            let publish = pubsub
                .publish(&context, "MOS Controller Error", &message)
                .await;
            if let Err(error) = publish {
                error!(
                    context.logger, "Unable to publish the controller meta-alert";
                    "error" => %error,
                );
            }
            return Err(error);
        }
    };

    let blobs = init::blobs(&cli);
    let secrets = init::secrets(&cli)?;
    let invoker = Arc::new(init::LocalInvoker::new(blobs.clone(), secrets));
    let dispatcher = Dispatcher::new(blobs, pubsub, invoker, conf);
    dispatcher.run(&context).await
}
