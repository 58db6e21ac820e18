//! Replication relationship rules.
use anyhow::Result;
use serde_json::Value;
use slog::debug;
use slog::info;

use mos_context::Context;
use mos_models::EventRecord;
use mos_models::ServiceBlock;
use mos_models::Severity;
use mos_models::TransferWatch;
use mos_store::Domain;

use crate::history::EventHistory;
use crate::lag::lag_time_str;
use crate::lag::parse_lag_time;
use crate::rules::SnapmirrorRules;
use crate::schedule;
use crate::ClusterRun;

const RELATIONSHIPS_PATH: &str = "/api/snapmirror/relationships?fields=*&return_timeout=15";

/// Transfer states during which a lag-percent alert would double-report a
/// transfer the stall rule already watches.
const ACTIVE_TRANSFER_STATES: [&str; 4] =
    ["transferring", "finalizing", "preparing", "fasttransferring"];

/// Evaluate the snapmirror service block.
pub async fn check(context: &Context, run: &ClusterRun<'_>, service: &ServiceBlock) -> Result<()> {
    let rules = SnapmirrorRules::parse(context, &service.rules);
    let mut history = EventHistory::load(run.state.events(context, Domain::Snapmirror).await?);
    history.age();
    let mut watchlist = Watchlist::load(run.state.watchlist(context).await?);

    let records = run.api.records(context, RELATIONSHIPS_PATH).await?;
    info!(
        context.logger, "Found SnapMirror relationships";
        "cluster" => run.cluster.name.clone(), "count" => records.len(),
    );
    let now_seconds = context.now().timestamp();

    for record in &records {
        let uuid = record.get("uuid").and_then(Value::as_str).unwrap_or("");
        // A relationship without a source cluster is local to this one.
        let source_cluster = record
            .pointer("/source/cluster/name")
            .and_then(Value::as_str)
            .unwrap_or(&run.cluster.name);
        let source_path = record
            .pointer("/source/path")
            .and_then(Value::as_str)
            .unwrap_or("");
        let destination_path = record
            .pointer("/destination/path")
            .and_then(Value::as_str)
            .unwrap_or("");
        let state = record.get("state").and_then(Value::as_str).unwrap_or("");

        // The lag of an uninitialized relationship reflects the age of an
        // unrelated snapshot on the source volume; evaluating it would be a
        // false positive.
        let mut processed_lag = false;
        let lag = record.get("lag_time").and_then(Value::as_str);
        if let (Some(lag), false) = (lag, state.eq_ignore_ascii_case("uninitialized")) {
            let lag_seconds = parse_lag_time(lag);

            if let Some((key, percent)) = &rules.max_lag_time_percent {
                if let Some(last_update) =
                    schedule::last_scheduled_update(context, run, record).await
                {
                    processed_lag = true;
                    let allowed = ((now_seconds - last_update) as f64) * (*percent as f64) / 100.0;
                    if (lag_seconds as f64) > allowed && !stall_supersedes(record, &rules) {
                        let id = format!("{}_{}", uuid, key);
                        if history.observe(&id) {
                            let message = format!(
                                "Snapmirror Lag Alert: {}::{} -> {}::{} has a lag time of {} \
                                 seconds ({}) which is more than {}% of its last scheduled \
                                 update at {}.",
                                source_cluster,
                                source_path,
                                run.cluster.name,
                                destination_path,
                                lag_seconds,
                                lag_time_str(lag_seconds),
                                percent,
                                schedule::render_local(last_update, run.cluster.timezone),
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
            }

            if let Some((key, max_lag)) = &rules.max_lag_time {
                if !processed_lag && lag_seconds > *max_lag {
                    let id = format!("{}_{}", uuid, key);
                    if history.observe(&id) {
                        let message = format!(
                            "Snapmirror Lag Alert: {}::{} -> {}::{} has a lag time of {} \
                             seconds, or {} which is more than {}.",
                            source_cluster,
                            source_path,
                            run.cluster.name,
                            destination_path,
                            lag_seconds,
                            lag_time_str(lag_seconds),
                            max_lag,
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
        }

        if let Some((key, configured)) = &rules.healthy {
            let healthy = record.get("healthy").and_then(Value::as_bool).unwrap_or(true);
            if !configured && !healthy {
                let id = format!("{}_{}", uuid, key);
                if history.observe(&id) {
                    let mut message = format!(
                        "Snapmirror Health Alert: {}::{} {}::{} has a status of {}.",
                        source_cluster, source_path, run.cluster.name, destination_path, healthy,
                    );
                    if let Some(reasons) = record.get("unhealthy_reason").and_then(Value::as_array)
                    {
                        for reason in reasons {
                            if let Some(text) = reason.get("message").and_then(Value::as_str) {
                                message.push('\n');
                                message.push_str(text);
                            }
                        }
                    }
                    run.alerts
                        .emit(context, &run.cluster.name, &message, Severity::Warning)
                        .await;
                    let mut entry = EventRecord::new(id);
                    entry.message = Some(message);
                    history.insert(entry);
                }
            }
        }

        if let Some((_, stall_seconds)) = &rules.stalled_transfer_seconds {
            let transfer_state = record
                .pointer("/transfer/state")
                .and_then(Value::as_str)
                .unwrap_or("");
            if transfer_state.eq_ignore_ascii_case("transferring") {
                let transfer_uuid = record
                    .pointer("/transfer/uuid")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let bytes = record
                    .pointer("/transfer/bytes_transferred")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                match watchlist.observe(transfer_uuid) {
                    Some(position) => {
                        let watched = watchlist.entry(position);
                        if watched.bytes_transferred == bytes {
                            if now_seconds - watched.time > *stall_seconds {
                                let id = format!("{}_transfer", uuid);
                                if history.observe(&id) {
                                    let message = format!(
                                        "Snapmirror transfer has stalled: {}::{} -> {}::{}.",
                                        source_cluster,
                                        source_path,
                                        run.cluster.name,
                                        destination_path,
                                    );
                                    run.alerts
                                        .emit(
                                            context,
                                            &run.cluster.name,
                                            &message,
                                            Severity::Warning,
                                        )
                                        .await;
                                    let mut entry = EventRecord::new(id);
                                    entry.message = Some(message);
                                    history.insert(entry);
                                }
                            }
                        } else {
                            watchlist.progress(position, now_seconds, bytes);
                        }
                    }
                    None => {
                        watchlist.insert(TransferWatch {
                            uuid: transfer_uuid.to_string(),
                            time: now_seconds,
                            bytes_transferred: bytes,
                            refresh: true,
                        });
                    }
                }
            }
        }
    }

    watchlist.sweep(context);
    if watchlist.changed() {
        run.state
            .save_watchlist(context, watchlist.entries())
            .await?;
    }
    history.sweep(context);
    if history.changed() {
        run.state
            .save_events(context, Domain::Snapmirror, history.records())
            .await?;
    }
    Ok(())
}

/// A lag-percent alert is suppressed while the relationship is actively
/// transferring and the stall rule is enabled; stall detection supersedes
/// lag reporting for in-flight transfers.
fn stall_supersedes(record: &Value, rules: &SnapmirrorRules) -> bool {
    if rules.stalled_transfer_seconds.is_none() {
        return false;
    }
    let transfer_state = record
        .pointer("/transfer/state")
        .and_then(Value::as_str)
        .unwrap_or("");
    ACTIVE_TRANSFER_STATES.contains(&transfer_state.to_lowercase().as_str())
}

/// The active-transfer watchlist for the duration of one run.
///
/// Entries not observed again by the end of the run are dropped: the
/// transfer completed, failed or was aborted, and stall tracking for it is
/// over.
struct Watchlist {
    entries: Vec<TransferWatch>,
    changed: bool,
}

impl Watchlist {
    fn load(mut entries: Vec<TransferWatch>) -> Watchlist {
        for entry in &mut entries {
            entry.refresh = false;
        }
        Watchlist {
            entries,
            changed: false,
        }
    }

    /// Mark a transfer as seen and return its position, if watched.
    fn observe(&mut self, uuid: &str) -> Option<usize> {
        let position = self.entries.iter().position(|entry| entry.uuid == uuid)?;
        self.entries[position].refresh = true;
        Some(position)
    }

    fn entry(&self, position: usize) -> &TransferWatch {
        &self.entries[position]
    }

    /// Record byte-count progress for a watched transfer.
    fn progress(&mut self, position: usize, time: i64, bytes: u64) {
        let entry = &mut self.entries[position];
        entry.time = time;
        entry.bytes_transferred = bytes;
        self.changed = true;
    }

    fn insert(&mut self, watch: TransferWatch) {
        self.changed = true;
        self.entries.push(watch);
    }

    /// Drop entries whose transfer was not observed this run.
    fn sweep(&mut self, context: &Context) {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            if !entry.refresh {
                debug!(
                    context.logger, "Dropping completed transfer from the watchlist";
                    "transfer" => entry.uuid.clone(),
                );
            }
            entry.refresh
        });
        if self.entries.len() != before {
            self.changed = true;
        }
    }

    fn entries(&self) -> &[TransferWatch] {
        &self.entries
    }

    fn changed(&self) -> bool {
        self.changed
    }
}

#[cfg(test)]
mod tests {
    use mos_context::Context;

    use super::check;
    use super::RELATIONSHIPS_PATH;
    use crate::testutil::service;
    use crate::testutil::Harness;

    fn relationship(lag: &str, state: &str) -> serde_json::Value {
        serde_json::json!({
            "uuid": "rel-1",
            "state": state,
            "healthy": true,
            "lag_time": lag,
            "source": {"path": "svm1:vol1", "cluster": {"name": "src-cluster"}},
            "destination": {"path": "svm2:vol1_dst"},
            "policy": {"uuid": "policy-1"},
        })
    }

    #[tokio::test]
    async fn lag_over_threshold_alerts_once() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service("snapmirror", serde_json::json!([{"maxLagTime": 3600}]));
        harness.transport.reply_records(
            RELATIONSHIPS_PATH,
            serde_json::json!([relationship("PT2H30M", "snapmirrored")]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("src-cluster::svm1:vol1"));
        assert!(messages[0].1.contains("fsx-test::svm2:vol1_dst"));
        assert!(messages[0].1.contains("9000 seconds"));
        let events = harness.blobs.json("fsx.example-smEvents").unwrap();
        assert_eq!(events[0]["index"], "rel-1_maxLagTime");

        // Second run: same lag, no second alert.
        harness.transport.reply_records(
            RELATIONSHIPS_PATH,
            serde_json::json!([relationship("PT2H30M", "snapmirrored")]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        assert_eq!(harness.published.messages().len(), 1);
    }

    #[tokio::test]
    async fn uninitialized_relationships_skip_lag_rules() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service("snapmirror", serde_json::json!([{"maxLagTime": 60}]));
        harness.transport.reply_records(
            RELATIONSHIPS_PATH,
            serde_json::json!([relationship("P30DT0H0M0S", "uninitialized")]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        assert!(harness.published.messages().is_empty());
    }

    #[tokio::test]
    async fn lag_percent_uses_the_schedule_and_is_superseded_by_stall_watching() {
        let now = chrono::DateTime::parse_from_rfc3339("2024-03-05T10:47:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let context = Context::fixture_at(now);
        let harness = Harness::new();
        let block = service(
            "snapmirror",
            serde_json::json!([
                {"maxLagTimePercent": 50},
                {"stalledTransferSeconds": 600},
            ]),
        );

        // Hourly schedule: last fire 10:00, 2820 s before now. A 2 h lag is
        // far over 50% of that, but the transfer is in flight and stall
        // detection supersedes the lag alert.
        let mut record = relationship("PT2H", "snapmirrored");
        record["transfer_schedule"] = serde_json::json!({"uuid": "sched-1"});
        record["transfer"] = serde_json::json!({
            "uuid": "xfer-1",
            "state": "transferring",
            "bytes_transferred": 10,
        });
        harness.transport.reply(
            "/api/cluster/schedules/sched-1?fields=*&return_timeout=15",
            200,
            serde_json::json!({"cron": {"minutes": [0]}}),
        );
        harness
            .transport
            .reply_records(RELATIONSHIPS_PATH, serde_json::json!([record.clone()]));
        check(&context, &harness.run(), &block).await.unwrap();
        assert!(harness.published.messages().is_empty());

        // Without an active transfer the same lag does alert.
        record["transfer"] = serde_json::json!({"state": "success"});
        harness.transport.reply(
            "/api/cluster/schedules/sched-1?fields=*&return_timeout=15",
            200,
            serde_json::json!({"cron": {"minutes": [0]}}),
        );
        harness
            .transport
            .reply_records(RELATIONSHIPS_PATH, serde_json::json!([record]));
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("more than 50% of its last scheduled update"));
        let events = harness.blobs.json("fsx.example-smEvents").unwrap();
        assert_eq!(events[0]["index"], "rel-1_maxLagTimePercent");
    }

    #[tokio::test]
    async fn unhealthy_relationship_concatenates_reasons() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service("snapmirror", serde_json::json!([{"Healthy": false}]));
        let mut record = relationship("PT1M", "snapmirrored");
        record["healthy"] = serde_json::json!(false);
        record["unhealthy_reason"] = serde_json::json!([
            {"message": "Transfer failed."},
            {"message": "Destination volume is full."},
        ]);
        harness
            .transport
            .reply_records(RELATIONSHIPS_PATH, serde_json::json!([record]));
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("has a status of false."));
        assert!(messages[0].1.contains("\nTransfer failed."));
        assert!(messages[0].1.contains("\nDestination volume is full."));
    }

    fn transferring(bytes: u64) -> serde_json::Value {
        let mut record = relationship("PT1M", "snapmirrored");
        record["transfer"] = serde_json::json!({
            "uuid": "xfer-1",
            "state": "transferring",
            "bytes_transferred": bytes,
        });
        record
    }

    #[tokio::test]
    async fn stalled_transfer_alerts_after_the_threshold() {
        let harness = Harness::new();
        let block = service(
            "snapmirror",
            serde_json::json!([{"stalledTransferSeconds": 600}]),
        );

        // First observation registers the transfer on the watchlist.
        let start = chrono::DateTime::parse_from_rfc3339("2024-03-05T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let context = Context::fixture_at(start);
        harness
            .transport
            .reply_records(RELATIONSHIPS_PATH, serde_json::json!([transferring(1000)]));
        check(&context, &harness.run(), &block).await.unwrap();
        assert!(harness.published.messages().is_empty());
        let watchlist = harness.blobs.json("fsx.example-smRelationships").unwrap();
        assert_eq!(watchlist[0]["uuid"], "xfer-1");
        assert_eq!(watchlist[0]["bytesTransferred"], 1000);

        // Eleven minutes later the byte count has not moved: one alert.
        let later = start + chrono::Duration::seconds(660);
        let context = Context::fixture_at(later);
        harness
            .transport
            .reply_records(RELATIONSHIPS_PATH, serde_json::json!([transferring(1000)]));
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.starts_with("Snapmirror transfer has stalled"));
    }

    #[tokio::test]
    async fn progressing_transfer_updates_the_watchlist() {
        let harness = Harness::new();
        let block = service(
            "snapmirror",
            serde_json::json!([{"stalledTransferSeconds": 600}]),
        );
        let start = chrono::DateTime::parse_from_rfc3339("2024-03-05T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let context = Context::fixture_at(start);
        harness
            .transport
            .reply_records(RELATIONSHIPS_PATH, serde_json::json!([transferring(1000)]));
        check(&context, &harness.run(), &block).await.unwrap();

        let later = start + chrono::Duration::seconds(900);
        let context = Context::fixture_at(later);
        harness
            .transport
            .reply_records(RELATIONSHIPS_PATH, serde_json::json!([transferring(2000)]));
        check(&context, &harness.run(), &block).await.unwrap();
        assert!(harness.published.messages().is_empty());
        let watchlist = harness.blobs.json("fsx.example-smRelationships").unwrap();
        assert_eq!(watchlist[0]["bytesTransferred"], 2000);
        assert_eq!(watchlist[0]["time"], later.timestamp());
    }

    #[tokio::test]
    async fn finished_transfers_leave_the_watchlist() {
        let harness = Harness::new();
        let block = service(
            "snapmirror",
            serde_json::json!([{"stalledTransferSeconds": 600}]),
        );
        let start = chrono::DateTime::parse_from_rfc3339("2024-03-05T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let context = Context::fixture_at(start);
        harness
            .transport
            .reply_records(RELATIONSHIPS_PATH, serde_json::json!([transferring(1000)]));
        check(&context, &harness.run(), &block).await.unwrap();

        harness.transport.reply_records(
            RELATIONSHIPS_PATH,
            serde_json::json!([relationship("PT1M", "snapmirrored")]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        let watchlist = harness.blobs.json("fsx.example-smRelationships").unwrap();
        assert_eq!(watchlist, serde_json::json!([]));
    }
}
