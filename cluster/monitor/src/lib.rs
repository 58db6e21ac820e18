//! Condition evaluator for a single ONTAP cluster.
//!
//! One [`Monitor::run`] is one polling pass: load (or bootstrap) the
//! match-conditions document, probe cluster availability, then dispatch one
//! evaluator per configured service block. Evaluators are plain async
//! functions over a [`ClusterRun`] context; each owns its domain's event
//! history for the duration of the run.
//!
//! # Errors
//!
//! Evaluators can fail in two ways:
//!
//!   * Remote errors: the cluster API timed out, refused the connection or
//!     answered a non-200 status. The domain is aborted for this run and
//!     its persisted event history is left untouched, so a later healthy
//!     run sees the records with their refresh counters intact.
//!   * Core errors: the state store failed or a state blob no longer
//!     decodes. These abort the whole run and surface to the dispatcher.
use anyhow::Result;
use chrono_tz::Tz;
use serde_json::Value;
use slog::warn;

use mos_client_ontap::Api;
use mos_client_ontap::ApiStatus;
use mos_client_ontap::Transport;
use mos_conf::MonitorConf;
use mos_context::Context;
use mos_store::StateStore;
use mos_stream_alerts::AlertSinks;

mod bootstrap;
mod ems;
mod history;
mod lag;
mod metrics;
mod quota;
mod rules;
mod schedule;
mod snapmirror;
mod storage;
mod system;
mod vserver;

#[cfg(test)]
pub(crate) mod testutil;

pub use self::lag::lag_time_str;
pub use self::lag::parse_lag_time;
pub use self::metrics::register_metrics;

use self::metrics::MONITOR_DURATION;
use self::metrics::MONITOR_ERRORS;

/// Cluster identity established by the availability probe.
pub struct ClusterProbe {
    /// Display name, disambiguated by account where configured.
    pub name: String,

    /// Software version currently running on the cluster.
    pub version: String,

    /// The cluster's timezone, for schedule and snapshot-age math.
    pub timezone: Option<Tz>,
}

/// Per-run context threaded through the domain evaluators.
pub struct ClusterRun<'a> {
    pub api: &'a Api,
    pub state: &'a StateStore,
    pub alerts: &'a AlertSinks,
    pub cluster: &'a ClusterProbe,
}

/// Evaluate every configured service domain for one cluster.
pub struct Monitor {
    api: Api,
    state: StateStore,
    alerts: AlertSinks,
    conf: MonitorConf,
}

impl Monitor {
    pub fn new(api: Api, state: StateStore, alerts: AlertSinks, conf: MonitorConf) -> Monitor {
        Monitor {
            api,
            state,
            alerts,
            conf,
        }
    }

    /// Run one polling pass over the cluster.
    pub async fn run(&self, context: &Context) -> Result<()> {
        let _timer = MONITOR_DURATION.start_timer();
        self.run_checked(context).await.map_err(|error| {
            MONITOR_ERRORS.inc();
            error
        })
    }

    async fn run_checked(&self, context: &Context) -> Result<()> {
        let conditions = match self.state.conditions(context).await? {
            Some(conditions) => conditions,
            None => {
                let conditions = bootstrap::default_conditions(context, &self.conf.initials);
                self.state.save_conditions(context, &conditions).await?;
                conditions
            }
        };

        let probe =
            system::check_system(context, &self.api, &self.state, &self.alerts, &self.conf).await?;
        let cluster = match probe {
            Some(cluster) => cluster,
            None => return Ok(()),
        };

        let run = ClusterRun {
            api: &self.api,
            state: &self.state,
            alerts: &self.alerts,
            cluster: &cluster,
        };
        for service in &conditions.services {
            let result = match service.name.to_lowercase().as_str() {
                "systemhealth" => system::check_system_health(context, &run, service).await,
                "ems" => ems::check(context, &run, service).await,
                "snapmirror" => snapmirror::check(context, &run, service).await,
                "storage" => storage::check(context, &run, service).await,
                "quota" => quota::check(context, &run, service).await,
                "vserver" => vserver::check(context, &run, service).await,
                _ => {
                    warn!(
                        context.logger, "Unknown service in the match-conditions document";
                        "service" => service.name.clone(),
                    );
                    Ok(())
                }
            };
            match result {
                Ok(()) => (),
                Err(error) if is_remote_error(&error) => {
                    warn!(
                        context.logger, "Service evaluation aborted, state left untouched";
                        "service" => service.name.clone(), "error" => %error,
                    );
                }
                Err(error) => return Err(error),
            }
        }
        Ok(())
    }
}

/// Whether an evaluator error came from the cluster side of the fetch.
fn is_remote_error(error: &anyhow::Error) -> bool {
    error.is::<ApiStatus>() || error.is::<Transport>()
}

/// Render an identifier value that may be a string or a number.
pub(crate) fn json_id(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

/// Render a JSON number for an alert body, keeping its source notation.
pub(crate) fn num_display(value: &Value) -> String {
    match value {
        Value::String(value) => value.clone(),
        other => other.to_string(),
    }
}

/// Render a threshold for an alert body without a trailing `.0`.
pub(crate) fn fmt_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use mos_context::Context;

    use crate::testutil::Harness;
    use crate::Monitor;

    const CLUSTER_PATH: &str = "/api/cluster?fields=version,name,timezone";
    const EMS_PATH: &str = "/api/support/ems/events?return_timeout=15";
    const RELATIONSHIPS_PATH: &str = "/api/snapmirror/relationships?fields=*&return_timeout=15";

    fn probe_body() -> serde_json::Value {
        serde_json::json!({
            "name": "fsx-test",
            "version": {"full": "NetApp Release 9.13.1P6: Tue Dec 05 16:06:25 UTC 2023"},
            "timezone": {"name": "UTC"},
        })
    }

    fn monitor(harness: &Harness) -> Monitor {
        Monitor::new(
            harness.api.clone(),
            harness.state.clone(),
            harness.alerts.clone(),
            harness.conf.clone(),
        )
    }

    /// Seed empty replies for every domain fetch except the EMS stream,
    /// which each test controls.
    fn seed_empty_domains(harness: &Harness) {
        let empty = serde_json::json!([]);
        harness
            .transport
            .reply_records(RELATIONSHIPS_PATH, empty.clone());
        harness.transport.reply_records(
            "/api/storage/aggregates?fields=space&return_timeout=15",
            empty.clone(),
        );
        harness.transport.reply_records(
            "/api/storage/volumes?fields=style,flexcache_endpoint_type,space,files,svm,state&return_timeout=15",
            empty.clone(),
        );
        harness.transport.reply_records(
            "/api/storage/volumes?is_constituent=true&fields=style,flexcache_endpoint_type,space,files,svm,state&return_timeout=15",
            empty.clone(),
        );
        harness.transport.reply_records(
            "/api/private/cli/volume/quota/report?fields=vserver,volume,index,tree,quota-type,\
             quota-target,disk-used,disk-limit,files-used,file-limit,soft-disk-limit,\
             soft-file-limit,quota-specifier,disk-used-pct-soft-disk-limit,\
             disk-used-pct-disk-limit,files-used-pct-soft-file-limit,\
             files-used-pct-file-limit&return_timeout=15",
            empty,
        );
    }

    #[tokio::test]
    async fn first_run_persists_a_bootstrap_conditions_document() {
        let context = Context::fixture();
        let harness = Harness::new();
        harness.transport.reply(CLUSTER_PATH, 200, probe_body());
        seed_empty_domains(&harness);
        harness
            .transport
            .reply_records(EMS_PATH, serde_json::json!([]));
        monitor(&harness).run(&context).await.unwrap();
        let conditions = harness.blobs.json("fsx.example-conditions").unwrap();
        assert_eq!(conditions["services"][0]["name"], "systemHealth");
        assert_eq!(conditions["services"][5]["name"], "vserver");
    }

    #[tokio::test]
    async fn unreachable_cluster_ends_the_run_cleanly() {
        let context = Context::fixture();
        let harness = Harness::new();
        harness.transport.fail(CLUSTER_PATH);
        monitor(&harness).run(&context).await.unwrap();
        // Only the probe was attempted.
        assert_eq!(harness.transport.requests(), vec![CLUSTER_PATH.to_string()]);
    }

    #[tokio::test]
    async fn one_failing_domain_does_not_stop_the_others() {
        let context = Context::fixture();
        let harness = Harness::new();
        harness.transport.reply(CLUSTER_PATH, 200, probe_body());
        seed_empty_domains(&harness);
        // The EMS stream answers with an error status.
        harness.transport.reply(EMS_PATH, 503, serde_json::Value::Null);
        monitor(&harness).run(&context).await.unwrap();
        let requests = harness.transport.requests();
        assert!(requests.iter().any(|path| path == RELATIONSHIPS_PATH));
    }

    #[tokio::test]
    async fn corrupt_conditions_abort_the_run() {
        let context = Context::fixture();
        let harness = Harness::new();
        harness
            .blobs
            .insert("fsx.example-conditions", b"{not json".to_vec());
        let result = monitor(&harness).run(&context).await;
        assert!(result.is_err());
    }
}
