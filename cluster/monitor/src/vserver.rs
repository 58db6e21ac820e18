//! Logical server (vserver) rules.
use anyhow::Result;
use serde_json::Value;
use slog::info;

use mos_context::Context;
use mos_models::EventRecord;
use mos_models::ServiceBlock;
use mos_models::Severity;
use mos_store::Domain;

use crate::history::EventHistory;
use crate::rules::VserverRules;
use crate::ClusterRun;

const SVMS_PATH: &str = "/api/svm/svms?fields=state&return_timeout=15";
const NFS_PATH: &str = "/api/protocols/nfs/services?fields=state&return_timeout=15";
const CIFS_PATH: &str = "/api/protocols/cifs/services?fields=enabled&return_timeout=15";

/// Evaluate the vserver service block.
pub async fn check(context: &Context, run: &ClusterRun<'_>, service: &ServiceBlock) -> Result<()> {
    let rules = VserverRules::parse(context, &service.rules);
    let mut history = EventHistory::load(run.state.events(context, Domain::Vserver).await?);
    history.age();

    if let Some((key, true)) = &rules.vserver_state {
        let records = run.api.records(context, SVMS_PATH).await?;
        info!(
            context.logger, "Found vservers to check";
            "cluster" => run.cluster.name.clone(), "count" => records.len(),
        );
        for record in &records {
            let state = record.get("state").and_then(Value::as_str).unwrap_or("");
            if state.eq_ignore_ascii_case("running") {
                continue;
            }
            let uuid = record.get("uuid").and_then(Value::as_str).unwrap_or("");
            let id = format!("{}_{}", uuid, key);
            if history.observe(&id) {
                let message = format!(
                    "SVM State Alert: SVM {} on {} is not online.",
                    record.get("name").and_then(Value::as_str).unwrap_or(""),
                    run.cluster.name,
                );
                run.alerts
                    .emit(context, &run.cluster.name, &message, Severity::Warning)
                    .await;
                let mut entry = EventRecord::new(id);
                entry.message = Some(message);
                history.insert(entry);
            }
        }
    }

    if let Some((key, true)) = &rules.nfs_protocol_state {
        let records = run.api.records(context, NFS_PATH).await?;
        for record in &records {
            let state = record.get("state").and_then(Value::as_str).unwrap_or("");
            if state.eq_ignore_ascii_case("online") {
                continue;
            }
            let svm_uuid = record
                .pointer("/svm/uuid")
                .and_then(Value::as_str)
                .unwrap_or("");
            let id = format!("{}_{}", svm_uuid, key);
            if history.observe(&id) {
                let message = format!(
                    "NFS Protocol State Alert: NFS protocol on {} on {} is not online.",
                    record
                        .pointer("/svm/name")
                        .and_then(Value::as_str)
                        .unwrap_or(""),
                    run.cluster.name,
                );
                run.alerts
                    .emit(context, &run.cluster.name, &message, Severity::Warning)
                    .await;
                let mut entry = EventRecord::new(id);
                entry.message = Some(message);
                history.insert(entry);
            }
        }
    }

    if let Some((key, true)) = &rules.cifs_protocol_state {
        let records = run.api.records(context, CIFS_PATH).await?;
        for record in &records {
            if record.get("enabled").and_then(Value::as_bool).unwrap_or(true) {
                continue;
            }
            let svm_uuid = record
                .pointer("/svm/uuid")
                .and_then(Value::as_str)
                .unwrap_or("");
            let id = format!("{}_{}", svm_uuid, key);
            if history.observe(&id) {
                let message = format!(
                    "CIFS Protocol State Alert: CIFS protocol on {} on {} is not online.",
                    record
                        .pointer("/svm/name")
                        .and_then(Value::as_str)
                        .unwrap_or(""),
                    run.cluster.name,
                );
                run.alerts
                    .emit(context, &run.cluster.name, &message, Severity::Warning)
                    .await;
                let mut entry = EventRecord::new(id);
                entry.message = Some(message);
                history.insert(entry);
            }
        }
    }

    history.sweep(context);
    if history.changed() {
        run.state
            .save_events(context, Domain::Vserver, history.records())
            .await?;
    }
    Ok(())
}
