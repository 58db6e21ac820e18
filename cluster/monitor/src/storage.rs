//! Storage utilization rules.
use anyhow::Result;
use chrono::DateTime;
use serde_json::Value;
use slog::info;
use slog::warn;

use mos_context::Context;
use mos_models::EventRecord;
use mos_models::ServiceBlock;
use mos_models::Severity;
use mos_store::Domain;

use crate::fmt_number;
use crate::history::EventHistory;
use crate::lag::lag_time_str;
use crate::num_display;
use crate::rules::StorageRule;
use crate::rules::StorageRuleKind;
use crate::ClusterRun;

const AGGREGATES_PATH: &str = "/api/storage/aggregates?fields=space&return_timeout=15";

const VOLUME_FIELDS: &str = "style,flexcache_endpoint_type,space,files,svm,state";

/// Evaluate the storage service block.
pub async fn check(context: &Context, run: &ClusterRun<'_>, service: &ServiceBlock) -> Result<()> {
    let rules = StorageRule::parse_all(context, &service.rules);
    let mut history = EventHistory::load(run.state.events(context, Domain::Storage).await?);
    history.age();

    let aggregates = run.api.records(context, AGGREGATES_PATH).await?;
    // Constituent volumes inside a scaled-out namespace are excluded from
    // the default enumeration and need their own query.
    let volumes_path = format!(
        "/api/storage/volumes?fields={}&return_timeout=15",
        VOLUME_FIELDS,
    );
    let constituents_path = format!(
        "/api/storage/volumes?is_constituent=true&fields={}&return_timeout=15",
        VOLUME_FIELDS,
    );
    let mut volumes = run.api.records(context, &volumes_path).await?;
    volumes.extend(run.api.records(context, &constituents_path).await?);
    info!(
        context.logger, "Found volumes and aggregates to check";
        "cluster" => run.cluster.name.clone(),
        "volumes" => volumes.len(),
        "aggregates" => aggregates.len(),
    );
    // Nothing to evaluate; the aged counters are deliberately not persisted
    // so an empty enumeration does not advance the history towards expiry.
    if volumes.is_empty() && aggregates.is_empty() {
        return Ok(());
    }

    for rule in &rules {
        match &rule.kind {
            StorageRuleKind::AggrPercentUsed {
                critical,
                threshold,
            } => {
                for aggregate in &aggregates {
                    let used = aggregate.pointer("/space/block_storage/used_percent");
                    let used = match used {
                        Some(used) if used.as_f64().unwrap_or(0.0) >= *threshold => used,
                        _ => continue,
                    };
                    let uuid = aggregate.get("uuid").and_then(Value::as_str).unwrap_or("");
                    let id = format!("{}_{}", uuid, rule.key);
                    if history.observe(&id) {
                        let label = if *critical { "Critical" } else { "Warning" };
                        let name = aggregate.get("name").and_then(Value::as_str).unwrap_or("");
                        let message = format!(
                            "Aggregate {} Alert: Aggregate {} on {} is {}% full, which is \
                             more or equal to {}% full.",
                            label,
                            name,
                            run.cluster.name,
                            num_display(used),
                            fmt_number(*threshold),
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
            StorageRuleKind::VolumePercentUsed {
                critical,
                threshold,
            } => {
                for volume in &volumes {
                    let used = volume.pointer("/space/percent_used");
                    // A missing or zero percentage means the volume has no
                    // usable space report.
                    let used = match used {
                        Some(used) if used.as_f64().unwrap_or(0.0) != 0.0 => used,
                        _ => continue,
                    };
                    if used.as_f64().unwrap_or(0.0) < *threshold {
                        continue;
                    }
                    let uuid = volume.get("uuid").and_then(Value::as_str).unwrap_or("");
                    let id = format!("{}_{}", uuid, rule.key);
                    if history.observe(&id) {
                        let label = if *critical { "Critical" } else { "Warning" };
                        let message = format!(
                            "Volume Usage {} Alert: volume {}:{} on {} is {}% full, which is \
                             more or equal to {}% full.",
                            label,
                            volume_svm(volume),
                            volume_name(volume),
                            run.cluster.name,
                            num_display(used),
                            fmt_number(*threshold),
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
            StorageRuleKind::VolumeFilesPercentUsed {
                critical,
                threshold,
            } => {
                for volume in &volumes {
                    // Offline volumes carry no files report.
                    let maximum = volume.pointer("/files/maximum").and_then(Value::as_f64);
                    let used = volume.pointer("/files/used").and_then(Value::as_f64);
                    let (maximum, used) = match (maximum, used) {
                        (Some(maximum), Some(used)) if maximum > 0.0 => (maximum, used),
                        _ => continue,
                    };
                    let percent = used / maximum * 100.0;
                    if percent < *threshold {
                        continue;
                    }
                    let uuid = volume.get("uuid").and_then(Value::as_str).unwrap_or("");
                    let id = format!("{}_{}", uuid, rule.key);
                    if history.observe(&id) {
                        let label = if *critical { "Critical" } else { "Warning" };
                        let message = format!(
                            "Volume File (inode) Usage {} Alert: volume {}:{} on {} is using \
                             {:.0}% of it's inodes, which is more or equal to {}% utilization.",
                            label,
                            volume_svm(volume),
                            volume_name(volume),
                            run.cluster.name,
                            percent,
                            fmt_number(*threshold),
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
            StorageRuleKind::Offline { enabled } => {
                if !enabled {
                    continue;
                }
                for volume in &volumes {
                    let state = volume.get("state").and_then(Value::as_str).unwrap_or("");
                    if !state.eq_ignore_ascii_case("offline") {
                        continue;
                    }
                    let uuid = volume.get("uuid").and_then(Value::as_str).unwrap_or("");
                    let id = format!("{}_{}", uuid, rule.key);
                    if history.observe(&id) {
                        let message = format!(
                            "Volume Offline Alert: volume {}:{} on {} is offline.",
                            volume_svm(volume),
                            volume_name(volume),
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
            StorageRuleKind::OldSnapshot { days } => {
                check_old_snapshots(context, run, &mut history, &volumes, &rule.key, *days)
                    .await?;
            }
        }
    }

    history.sweep(context);
    if history.changed() {
        run.state
            .save_events(context, Domain::Storage, history.records())
            .await?;
    }
    Ok(())
}

/// Alert on snapshots older than the configured number of days.
///
/// Cache volumes and scaled-out constituents are excluded: their snapshots
/// belong to the origin volume.
async fn check_old_snapshots(
    context: &Context,
    run: &ClusterRun<'_>,
    history: &mut EventHistory,
    volumes: &[Value],
    rule_key: &str,
    days: i64,
) -> Result<()> {
    let now = context.now().timestamp();
    let mut snapshots = Vec::new();
    for volume in volumes {
        let cache = volume
            .get("flexcache_endpoint_type")
            .and_then(Value::as_str)
            .unwrap_or("")
            .eq_ignore_ascii_case("cache");
        let constituent = volume
            .get("style")
            .and_then(Value::as_str)
            .unwrap_or("")
            .eq_ignore_ascii_case("flexgroup_constituent");
        if cache || constituent {
            continue;
        }
        let uuid = volume.get("uuid").and_then(Value::as_str).unwrap_or("");
        let path = format!(
            "/api/storage/volumes/{}/snapshots?fields=create_time,volume,svm&return_timeout=15",
            uuid,
        );
        snapshots.extend(run.api.records(context, &path).await?);
    }
    info!(
        context.logger, "Found snapshots to check";
        "cluster" => run.cluster.name.clone(), "count" => snapshots.len(),
    );

    for snapshot in &snapshots {
        let created = match snapshot.get("create_time").and_then(Value::as_str) {
            Some(created) => created,
            None => continue,
        };
        let created = match DateTime::parse_from_rfc3339(created) {
            Ok(created) => created,
            Err(error) => {
                warn!(
                    context.logger, "Unparsable snapshot creation time";
                    "cluster" => run.cluster.name.clone(),
                    "create_time" => created.to_string(),
                    "error" => %error,
                );
                continue;
            }
        };
        let age = now - created.timestamp();
        if age < days * 60 * 60 * 24 {
            continue;
        }
        let uuid = snapshot.get("uuid").and_then(Value::as_str).unwrap_or("");
        let id = format!("{}_{}", uuid, rule_key);
        if history.observe(&id) {
            let message = format!(
                "Old Snapshot Alert: snapshot {} on volume {} in SVM {} is {} seconds old \
                 ({}), which is more than {} days.",
                snapshot.get("name").and_then(Value::as_str).unwrap_or(""),
                snapshot
                    .pointer("/volume/name")
                    .and_then(Value::as_str)
                    .unwrap_or(""),
                snapshot
                    .pointer("/svm/name")
                    .and_then(Value::as_str)
                    .unwrap_or(""),
                age,
                lag_time_str(age),
                days,
            );
            run.alerts
                .emit(context, &run.cluster.name, &message, Severity::Warning)
                .await;
            let mut entry = EventRecord::new(id);
            entry.message = Some(message);
            history.insert(entry);
        }
    }
    Ok(())
}

fn volume_svm(volume: &Value) -> &str {
    volume
        .pointer("/svm/name")
        .and_then(Value::as_str)
        .unwrap_or("")
}

fn volume_name(volume: &Value) -> &str {
    volume.get("name").and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use mos_context::Context;

    use super::check;
    use super::AGGREGATES_PATH;
    use crate::testutil::service;
    use crate::testutil::Harness;

    const VOLUMES_PATH: &str = "/api/storage/volumes?fields=style,flexcache_endpoint_type,space,files,svm,state&return_timeout=15";
    const CONSTITUENTS_PATH: &str = "/api/storage/volumes?is_constituent=true&fields=style,flexcache_endpoint_type,space,files,svm,state&return_timeout=15";

    fn volume(uuid: &str, percent: i64) -> serde_json::Value {
        serde_json::json!({
            "uuid": uuid,
            "name": format!("vol_{}", uuid),
            "state": "online",
            "style": "flexvol",
            "flexcache_endpoint_type": "none",
            "svm": {"name": "svm1"},
            "space": {"percent_used": percent},
            "files": {"maximum": 1000, "used": 100},
        })
    }

    fn seed(harness: &Harness, aggregates: serde_json::Value, volumes: serde_json::Value) {
        harness.transport.reply_records(AGGREGATES_PATH, aggregates);
        harness.transport.reply_records(VOLUMES_PATH, volumes);
        harness
            .transport
            .reply_records(CONSTITUENTS_PATH, serde_json::json!([]));
    }

    #[tokio::test]
    async fn aggregate_threshold_fires_at_or_above() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service("storage", serde_json::json!([{"aggrWarnPercentUsed": 80}]));
        seed(
            &harness,
            serde_json::json!([{
                "uuid": "aggr-1",
                "name": "aggr1",
                "space": {"block_storage": {"used_percent": 85}},
            }]),
            serde_json::json!([]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0]
            .1
            .contains("Aggregate Warning Alert: Aggregate aggr1"));
        assert!(messages[0].1.contains("is 85% full"));
        let events = harness.blobs.json("fsx.example-storageEvents").unwrap();
        assert_eq!(events[0]["index"], "aggr-1_aggrWarnPercentUsed");
    }

    #[tokio::test]
    async fn warn_and_critical_rules_alert_independently() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service(
            "storage",
            serde_json::json!([
                {"volumeWarnPercentUsed": 80},
                {"volumeCriticalPercentUsed": 95},
            ]),
        );
        seed(
            &harness,
            serde_json::json!([]),
            serde_json::json!([volume("vol-1", 97)]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].1.contains("Volume Usage Warning Alert"));
        assert!(messages[1].1.contains("Volume Usage Critical Alert"));
    }

    #[tokio::test]
    async fn volumes_without_space_reports_are_skipped() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service("storage", serde_json::json!([{"volumeWarnPercentUsed": 0}]));
        let mut offline = volume("vol-1", 0);
        offline["space"] = serde_json::json!({});
        seed(&harness, serde_json::json!([]), serde_json::json!([offline]));
        check(&context, &harness.run(), &block).await.unwrap();
        assert!(harness.published.messages().is_empty());
    }

    #[tokio::test]
    async fn inode_percentage_is_computed_from_the_files_block() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service(
            "storage",
            serde_json::json!([{"volumeWarnFilesPercentUsed": 9}]),
        );
        seed(
            &harness,
            serde_json::json!([]),
            serde_json::json!([volume("vol-1", 10)]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("using 10% of it's inodes"));
    }

    #[tokio::test]
    async fn offline_volumes_alert_when_enabled() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service("storage", serde_json::json!([{"offline": true}]));
        let mut offline = volume("vol-1", 10);
        offline["state"] = serde_json::json!("offline");
        seed(&harness, serde_json::json!([]), serde_json::json!([offline]));
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].1,
            "Volume Offline Alert: volume svm1:vol_vol-1 on fsx-test is offline."
        );
    }

    #[tokio::test]
    async fn old_snapshots_alert_with_their_age() {
        let now = chrono::DateTime::parse_from_rfc3339("2024-03-05T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let context = Context::fixture_at(now);
        let harness = Harness::new();
        let block = service("storage", serde_json::json!([{"oldSnapshot": 30}]));
        seed(
            &harness,
            serde_json::json!([]),
            serde_json::json!([volume("vol-1", 10)]),
        );
        harness.transport.reply_records(
            "/api/storage/volumes/vol-1/snapshots?fields=create_time,volume,svm&return_timeout=15",
            serde_json::json!([
                {
                    "uuid": "snap-1",
                    "name": "weekly.0",
                    "create_time": "2024-01-05T00:00:00+00:00",
                    "volume": {"name": "vol_vol-1"},
                    "svm": {"name": "svm1"},
                },
                {
                    "uuid": "snap-2",
                    "name": "daily.0",
                    "create_time": "2024-03-04T00:00:00+00:00",
                    "volume": {"name": "vol_vol-1"},
                    "svm": {"name": "svm1"},
                },
            ]),
        );
        check(&context, &harness.run(), &block).await.unwrap();
        let messages = harness.published.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("snapshot weekly.0"));
        assert!(messages[0].1.contains("more than 30 days"));
        let events = harness.blobs.json("fsx.example-storageEvents").unwrap();
        assert_eq!(events[0]["index"], "snap-1_oldSnapshot");
    }

    #[tokio::test]
    async fn empty_enumerations_do_not_age_history() {
        let context = Context::fixture();
        let harness = Harness::new();
        let block = service("storage", serde_json::json!([{"volumeWarnPercentUsed": 80}]));
        harness.seed_events(
            mos_store::Domain::Storage,
            &[mos_models::EventRecord::new("vol-9_volumeWarnPercentUsed")],
        );
        seed(&harness, serde_json::json!([]), serde_json::json!([]));
        check(&context, &harness.run(), &block).await.unwrap();
        let events = harness.blobs.json("fsx.example-storageEvents").unwrap();
        assert_eq!(events[0]["refresh"], 4);
    }
}
