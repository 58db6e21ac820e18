//! Cluster availability probe and system-health rules.
use anyhow::Result;
use serde_json::Value;
use slog::debug;
use slog::warn;

use mos_client_ontap::Api;
use mos_conf::MonitorConf;
use mos_context::Context;
use mos_models::EventRecord;
use mos_models::ServiceBlock;
use mos_models::Severity;
use mos_models::SystemStatus;
use mos_store::StateStore;
use mos_stream_alerts::AlertSinks;

use crate::history::EventHistory;
use crate::rules::SystemHealthRules;
use crate::ClusterProbe;
use crate::ClusterRun;

/// Root resource probed to establish cluster identity and availability.
const CLUSTER_PATH: &str = "/api/cluster?fields=version,name,timezone";

/// Node count comes from the CLI passthrough; there is no equivalent
/// structured endpoint for the managed node instances.
const NODES_PATH: &str = "/api/private/cli/system/node/virtual-machine/instance/show-settings";

const INTERFACES_PATH: &str = "/api/network/ip/interfaces?fields=state";

/// Probe the cluster root resource. Runs first, always.
///
/// On success the unhealthy counter is cleared and the cluster identity
/// (name, version, timezone) is returned for the domain evaluators. On
/// failure the counter is incremented and, exactly on the transition to 2,
/// a CRITICAL "cluster unreachable" alert is published. [`None`] is
/// returned while the cluster is considered unreachable so the run ends
/// cleanly.
///
/// This is the one availability signal tracked with a plain counter rather
/// than the refresh-counter scheme: the root resource is a single
/// observable, not a set of records.
pub async fn check_system(
    context: &Context,
    api: &Api,
    state: &StateStore,
    alerts: &AlertSinks,
    conf: &MonitorConf,
) -> Result<Option<ClusterProbe>> {
    let (mut status, mut changed) = match state.system_status(context).await? {
        Some(status) => (status, false),
        None => (SystemStatus::initial(), true),
    };

    let mut probe = None;
    match api.probe(context, CLUSTER_PATH).await {
        Ok(response) if response.status == 200 => {
            if status.system_health != 0 {
                status.system_health = 0;
                changed = true;
            }
            probe = Some(identify(context, conf, &mut status, &response.body));
        }
        outcome => {
            let detail = match outcome {
                Ok(response) => Some(response.status),
                Err(error) => {
                    debug!(
                        context.logger, "Failed to issue API against the cluster";
                        "cluster" => conf.admin_server.clone(), "error" => %error,
                    );
                    None
                }
            };
            if status.system_health == 1 {
                let name = conf.fallback_cluster_name();
                let message = match detail {
                    Some(code) => format!(
                        "CRITICAL: Received a non 200 HTTP status code ({}) when trying to access {}.",
                        code, name,
                    ),
                    None => format!(
                        "CRITICAL: Failed to issue API against {}. Cluster could be down.",
                        name,
                    ),
                };
                alerts.emit(context, &name, &message, Severity::Critical).await;
                status.system_health += 1;
                changed = true;
            } else if status.system_health == 0 {
                status.system_health += 1;
                changed = true;
            }
        }
    }

    if changed {
        state.save_system_status(context, &status).await?;
    }
    Ok(probe)
}

/// Build the cluster identity from a successful probe response.
fn identify(
    context: &Context,
    conf: &MonitorConf,
    status: &mut SystemStatus,
    body: &Value,
) -> ClusterProbe {
    let cluster_name = body
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(&conf.admin_server);
    let name = match &conf.account_id {
        Some(account) => format!("{}({})", cluster_name, account),
        None => cluster_name.to_string(),
    };

    let version = extract_version(body.pointer("/version/full").and_then(Value::as_str));
    if status.version == SystemStatus::INITIAL_VERSION {
        status.version = version.clone();
    }

    let timezone = body
        .pointer("/timezone/name")
        .and_then(Value::as_str)
        .and_then(|zone| match zone.parse() {
            Ok(timezone) => Some(timezone),
            Err(_) => {
                warn!(
                    context.logger, "Unknown cluster timezone";
                    "cluster" => name.clone(), "timezone" => zone.to_string(),
                );
                None
            }
        });
    ClusterProbe {
        name,
        version,
        timezone,
    }
}

/// Extract the running version from the cluster's full version string.
///
/// The full string looks like `NetApp Release 9.13.1P6: Tue Dec 05 ...`;
/// the third token carries the patch level, which the structured version
/// fields do not.
fn extract_version(full: Option<&str>) -> String {
    full.and_then(|full| full.split_whitespace().nth(2))
        .map(|token| token.replace(':', ""))
        .unwrap_or_default()
}

/// Evaluate the systemHealth service block.
///
/// Assumes [`check_system`] ran first in the same pass.
pub async fn check_system_health(
    context: &Context,
    run: &ClusterRun<'_>,
    service: &ServiceBlock,
) -> Result<()> {
    let rules = SystemHealthRules::parse(context, &service.rules);
    let mut status = run
        .state
        .system_status(context)
        .await?
        .unwrap_or_else(SystemStatus::initial);
    let mut changed = false;

    if rules.version_change && run.cluster.version != status.version {
        let message = format!(
            "NOTICE: The ONTAP version changed on cluster {} from {} to {}.",
            run.cluster.name, status.version, run.cluster.version,
        );
        run.alerts
            .emit(context, &run.cluster.name, &message, Severity::Info)
            .await;
        status.version = run.cluster.version.clone();
        changed = true;
    }

    if rules.failover {
        match run.api.object(context, NODES_PATH).await {
            Ok(body) => {
                let nodes = body.get("num_records").and_then(Value::as_u64).unwrap_or(0);
                if nodes != status.number_nodes {
                    let message = format!(
                        "Alert: The number of nodes in cluster {} went from {} to {}.\n\
                         Note, this is likely a planned failover event to upgrade the O/S, \
                         or to change the throughput capacity.",
                        run.cluster.name, status.number_nodes, nodes,
                    );
                    run.alerts
                        .emit(context, &run.cluster.name, &message, Severity::Info)
                        .await;
                    status.number_nodes = nodes;
                    changed = true;
                }
            }
            Err(error) => {
                warn!(
                    context.logger, "Unable to fetch the cluster node count";
                    "cluster" => run.cluster.name.clone(), "error" => %error,
                );
            }
        }
    }

    if rules.network_interfaces {
        match run.api.records(context, INTERFACES_PATH).await {
            Ok(interfaces) => {
                let mut history = EventHistory::load(std::mem::take(&mut status.down_interfaces));
                history.age();
                for interface in &interfaces {
                    let state = match interface.get("state").and_then(Value::as_str) {
                        Some(state) => state,
                        None => continue,
                    };
                    if state == "up" {
                        continue;
                    }
                    let name = interface.get("name").and_then(Value::as_str).unwrap_or("");
                    if history.observe(name) {
                        let message = format!(
                            "Alert: Network interface {} on cluster {} is down.",
                            name, run.cluster.name,
                        );
                        run.alerts
                            .emit(context, &run.cluster.name, &message, Severity::Warning)
                            .await;
                        history.insert(EventRecord::new(name));
                    }
                }
                history.sweep(context);
                if history.changed() {
                    changed = true;
                }
                status.down_interfaces = history.into_records();
            }
            Err(error) => {
                warn!(
                    context.logger, "Unable to fetch interface states";
                    "cluster" => run.cluster.name.clone(), "error" => %error,
                );
            }
        }
    }

    if changed {
        run.state.save_system_status(context, &status).await?;
    }
    Ok(())
}
