//! EMS event stream rules.
use anyhow::Result;
use serde_json::Value;
use slog::info;

use mos_context::Context;
use mos_models::EventRecord;
use mos_models::ServiceBlock;
use mos_models::Severity;
use mos_store::Domain;

use crate::history::EventHistory;
use crate::json_id;
use crate::rules::EmsRule;
use crate::ClusterRun;

const EMS_PATH: &str = "/api/support/ems/events?return_timeout=15";

/// Evaluate the ems service block.
pub async fn check(context: &Context, run: &ClusterRun<'_>, service: &ServiceBlock) -> Result<()> {
    let rules = EmsRule::parse_all(context, &service.rules);
    let mut history = EventHistory::load(run.state.events(context, Domain::Ems).await?);
    history.age();

    let records = run.api.records(context, EMS_PATH).await?;
    info!(
        context.logger, "Received EMS records";
        "cluster" => run.cluster.name.clone(), "count" => records.len(),
    );
    for record in &records {
        let index = match record.get("index") {
            Some(index) => json_id(index),
            None => continue,
        };
        let name = record
            .pointer("/message/name")
            .and_then(Value::as_str)
            .unwrap_or("");
        let severity = record
            .pointer("/message/severity")
            .and_then(Value::as_str)
            .unwrap_or("");
        let log_message = record
            .get("log_message")
            .and_then(Value::as_str)
            .unwrap_or("");
        let time = record.get("time").and_then(Value::as_str).unwrap_or("");

        for rule in &rules {
            if !rule.matches(name, severity, log_message) {
                continue;
            }
            if history.observe(&index) {
                let message = format!(
                    "{} : {} {}({}) - {}",
                    time, run.cluster.name, name, severity, log_message,
                );
                let (alert_severity, unknown) = map_severity(severity);
                if unknown {
                    let note = format!(
                        "Received unknown severity from ONTAP \"{}\". The message received is next.",
                        severity,
                    );
                    run.alerts
                        .emit(context, &run.cluster.name, &note, Severity::Info)
                        .await;
                }
                run.alerts
                    .emit(context, &run.cluster.name, &message, alert_severity)
                    .await;
                let mut entry = EventRecord::new(index.clone());
                entry.time = Some(time.to_string());
                entry.message_name = Some(name.to_string());
                entry.message = Some(log_message.to_string());
                history.insert(entry);
            }
        }
    }

    history.sweep(context);
    if history.changed() {
        run.state
            .save_events(context, Domain::Ems, history.records())
            .await?;
    }
    Ok(())
}

/// Map an EMS severity onto an alert severity.
///
/// The boolean is set for severities the mapping does not know, which emit
/// a secondary note so the operator learns about the new name.
fn map_severity(severity: &str) -> (Severity, bool) {
    match severity.to_uppercase().as_str() {
        "EMERGENCY" => (Severity::Critical, false),
        "ALERT" => (Severity::Error, false),
        "ERROR" => (Severity::Warning, false),
        "NOTICE" | "INFORMATIONAL" => (Severity::Info, false),
        "DEBUG" => (Severity::Debug, false),
        _ => (Severity::Info, true),
    }
}
