//! First-run synthesis of the match-conditions document.
//!
//! When a cluster has no conditions document in the blob store the monitor
//! builds one from the `initial*` invocation options and persists it, so
//! operators can then tune the document in place.
use std::collections::BTreeMap;

use slog::warn;

use mos_context::Context;
use mos_models::MatchConditions;

/// Build the default match-conditions document from `initial*` options.
pub fn default_conditions(
    context: &Context,
    initials: &BTreeMap<String, String>,
) -> MatchConditions {
    let mut conditions = MatchConditions::empty();
    for (name, value) in initials {
        match name.as_str() {
            "initialVersionChangeAlert" => flag(&mut conditions, "systemHealth", "versionChange", value),
            "initialFailoverAlert" => flag(&mut conditions, "systemHealth", "failover", value),
            "initialNetworkInterfacesAlert" => flag(&mut conditions, "systemHealth", "networkInterfaces", value),
            "initialEmsEventsAlert" => {
                if value == "true" {
                    if let Some(block) = conditions.service_mut("ems") {
                        let mut rule = mos_models::RuleObject::new();
                        rule.insert("name".to_string(), "".into());
                        rule.insert("severity".to_string(), "error|alert|emergency".into());
                        rule.insert("message".to_string(), "".into());
                        rule.insert("filter".to_string(), "".into());
                        block.rules.push(rule);
                    }
                }
            }
            "initialSnapMirrorHealthAlert" => {
                // The rule names the state to match on, so alerting on
                // unhealthy relationships stores `Healthy: false`.
                flag(&mut conditions, "snapmirror", "Healthy", if value == "true" { "false" } else { "true" })
            }
            "initialSnapMirrorLagTimeAlert" => threshold(context, &mut conditions, "snapmirror", "maxLagTime", value),
            "initialSnapMirrorLagTimePercentAlert" => {
                threshold(context, &mut conditions, "snapmirror", "maxLagTimePercent", value)
            }
            "initialSnapMirrorStalledAlert" => {
                threshold(context, &mut conditions, "snapmirror", "stalledTransferSeconds", value)
            }
            "initialFileSystemUtilizationWarnAlert" => {
                threshold(context, &mut conditions, "storage", "aggrWarnPercentUsed", value)
            }
            "initialFileSystemUtilizationCriticalAlert" => {
                threshold(context, &mut conditions, "storage", "aggrCriticalPercentUsed", value)
            }
            "initialVolumeUtilizationWarnAlert" => {
                threshold(context, &mut conditions, "storage", "volumeWarnPercentUsed", value)
            }
            "initialVolumeUtilizationCriticalAlert" => {
                threshold(context, &mut conditions, "storage", "volumeCriticalPercentUsed", value)
            }
            "initialVolumeFileUtilizationWarnAlert" => {
                threshold(context, &mut conditions, "storage", "volumeWarnFilesPercentUsed", value)
            }
            "initialVolumeFileUtilizationCriticalAlert" => {
                threshold(context, &mut conditions, "storage", "volumeCriticalFilesPercentUsed", value)
            }
            "initialVolumeOfflineAlert" => flag(&mut conditions, "storage", "offline", value),
            "initialOldSnapshot" => threshold(context, &mut conditions, "storage", "oldSnapshot", value),
            "initialSoftQuotaUtilizationAlert" => {
                threshold(context, &mut conditions, "quota", "maxSoftQuotaSpacePercentUsed", value)
            }
            "initialHardQuotaUtilizationAlert" => {
                threshold(context, &mut conditions, "quota", "maxHardQuotaSpacePercentUsed", value)
            }
            "initialInodesSoftQuotaUtilizationAlert" => {
                threshold(context, &mut conditions, "quota", "maxSoftQuotaInodesPercentUsed", value)
            }
            "initialInodesQuotaUtilizationAlert" => {
                threshold(context, &mut conditions, "quota", "maxHardQuotaInodesPercentUsed", value)
            }
            "initialVserverStateAlert" => flag(&mut conditions, "vserver", "vserverState", value),
            "initialVserverNFSProtocolStateAlert" => flag(&mut conditions, "vserver", "nfsProtocolState", value),
            "initialVserverCIFSProtocolStateAlert" => flag(&mut conditions, "vserver", "cifsProtocolState", value),
            _ => {
                warn!(
                    context.logger, "Ignoring unknown initial option";
                    "option" => name.to_string(),
                );
            }
        }
    }
    conditions
}

/// Configure a boolean rule from an `initial*` flag.
fn flag(conditions: &mut MatchConditions, service: &str, rule: &str, value: &str) {
    if let Some(block) = conditions.service_mut(service) {
        block.push_rule(rule, value == "true");
    }
}

/// Configure a numeric rule from an `initial*` threshold; zero disables it.
fn threshold(
    context: &Context,
    conditions: &mut MatchConditions,
    service: &str,
    rule: &str,
    value: &str,
) {
    match value.parse::<i64>() {
        Ok(parsed) if parsed > 0 => {
            if let Some(block) = conditions.service_mut(service) {
                block.push_rule(rule, parsed);
            }
        }
        Ok(_) => (),
        Err(_) => {
            warn!(
                context.logger, "Ignoring non-numeric initial option";
                "rule" => rule.to_string(), "value" => value.to_string(),
            );
        }
    }
}
