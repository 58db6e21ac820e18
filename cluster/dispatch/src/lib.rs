//! Cluster dispatcher: fan the fleet out to per-cluster monitor tasks.
//!
//! The dispatcher owns the fleet descriptor and the per-cluster failure
//! counters. Monitor tasks are invoked through the [`MonitorInvoker`]
//! seam so the dispatcher stays independent of how a monitor is built;
//! the binary wires the real one in.
//!
//! Failure of one cluster's task never affects another's: in synchronous
//! mode errors feed the failure counters, in fire-and-forget mode outcomes
//! are not observed at all.
use std::sync::Arc;

use anyhow::Result;
use slog::error;
use slog::info;
use slog::warn;

use mos_conf::ControllerConf;
use mos_conf::InvocationType;
use mos_conf::MonitorOptions;
use mos_conf::Payload;
use mos_context::Context;
use mos_models::FleetStatus;
use mos_models::MAX_ALLOWED_FAILURES;
use mos_store::Blobs;
use mos_stream_alerts::PubSub;

pub mod fleet;
mod metrics;

pub use self::metrics::register_metrics;

use self::metrics::MONITOR_FAILURES;
use self::metrics::MONITOR_INVOCATIONS;

/// Subject used for dispatcher meta-alerts.
const META_SUBJECT: &str = "MOS Controller Error";

/// The fleet descriptor could not be fetched from the blob store.
#[derive(Debug, thiserror::Error)]
#[error("unable to fetch the fleet descriptor '{key}' from the blob store")]
pub struct FleetListUnavailable {
    pub key: String,
}

/// Invoke one monitor task for a cluster.
///
/// Implemented by the binary over the real monitor; tests substitute a
/// recording fake.
#[async_trait::async_trait]
pub trait MonitorInvoker: Send + Sync {
    async fn invoke(&self, context: &Context, payload: Payload) -> Result<()>;
}

/// Fan the configured fleet out to monitor tasks.
pub struct Dispatcher {
    blobs: Blobs,
    pubsub: PubSub,
    invoker: Arc<dyn MonitorInvoker>,
    conf: ControllerConf,
}

impl Dispatcher {
    pub fn new(
        blobs: Blobs,
        pubsub: PubSub,
        invoker: Arc<dyn MonitorInvoker>,
        conf: ControllerConf,
    ) -> Dispatcher {
        Dispatcher {
            blobs,
            pubsub,
            invoker,
            conf,
        }
    }

    /// Run one dispatch pass over the fleet.
    ///
    /// Fatal conditions (missing descriptor, unreadable counters) publish a
    /// best-effort meta-alert and error out; per-cluster failures only feed
    /// the failure counters.
    pub async fn run(&self, context: &Context) -> Result<()> {
        let descriptor = match self.blobs.get_text(context, &self.conf.fleet_key).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                let error = FleetListUnavailable {
                    key: self.conf.fleet_key.clone(),
                };
                self.fatal(context, &error.to_string()).await;
                return Err(error.into());
            }
            Err(error) => {
                self.fatal(context, &format!("{:#}", error)).await;
                return Err(error);
            }
        };
        let entries = fleet::parse(context, &descriptor);
        info!(
            context.logger, "Dispatching monitor tasks over the fleet";
            "clusters" => entries.len(),
        );

        let (mut status, mut changed) = match self
            .blobs
            .get_json::<FleetStatus>(context, &self.conf.fleet_status_key)
            .await
        {
            Ok(Some(status)) => (status, false),
            Ok(None) => (FleetStatus::default(), true),
            Err(error) => {
                self.fatal(context, &format!("{:#}", error)).await;
                return Err(error);
            }
        };

        for entry in entries {
            let mut payload = self.conf.monitor_payload(&entry.host, &entry.secret_ref);
            for (key, value) in &entry.overrides {
                if MonitorOptions::is_known_option(key) || key.starts_with("initial") {
                    payload.insert(key.clone(), value.clone());
                } else {
                    warn!(
                        context.logger, "Ignoring unknown fleet entry option";
                        "cluster" => entry.host.clone(), "option" => key.clone(),
                    );
                }
            }
            let context = context
                .derive()
                .log_values(slog::o!("cluster" => entry.host.clone()))
                .build();
            MONITOR_INVOCATIONS.inc();
            match self.conf.invocation {
                InvocationType::FireAndForget => {
                    let invoker = Arc::clone(&self.invoker);
                    tokio::spawn(async move {
                        if let Err(error) = invoker.invoke(&context, payload).await {
                            MONITOR_FAILURES.inc();
                            error!(
                                context.logger, "Monitor task failed";
                                "error" => format!("{:#}", error),
                            );
                        }
                    });
                }
                InvocationType::Synchronous => {
                    match self.invoker.invoke(&context, payload).await {
                        Ok(()) => match status.get_mut(&entry.host) {
                            None => {
                                status.insert(entry.host.clone(), Default::default());
                                changed = true;
                            }
                            Some(counter) if counter.failed_invokes != 0 => {
                                counter.failed_invokes = 0;
                                changed = true;
                            }
                            Some(_) => (),
                        },
                        Err(error) => {
                            MONITOR_FAILURES.inc();
                            error!(
                                context.logger, "Monitor task failed";
                                "error" => format!("{:#}", error),
                            );
                            let counter = status.entry(entry.host.clone()).or_default();
                            counter.failed_invokes += 1;
                            changed = true;
                            if counter.failed_invokes == MAX_ALLOWED_FAILURES {
                                let message = format!(
                                    "The monitoring function failed while processing {}: {:#}",
                                    entry.host, error,
                                );
                                self.meta_alert(&context, &message).await;
                            }
                        }
                    }
                }
            }
        }

        if changed {
            self.blobs
                .put_json(context, &self.conf.fleet_status_key, &status)
                .await?;
        }
        Ok(())
    }

    /// Publish a meta-alert, best-effort.
    async fn meta_alert(&self, context: &Context, message: &str) {
        let publish = self.pubsub.publish(context, META_SUBJECT, message).await;
        if let Err(error) = publish {
            error!(
                context.logger, "Unable to publish a dispatcher meta-alert";
                "error" => %error,
            );
        }
    }

    /// Log, publish and record a fatal dispatcher condition.
    async fn fatal(&self, context: &Context, message: &str) {
        error!(context.logger, "{}", message);
        self.meta_alert(context, message).await;
    }
}
